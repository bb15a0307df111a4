//! Infos, the basic unit of information traded over the gossip network.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Identifier of the node that originated an info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random `NodeId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload carried by an [`Info`].
///
/// The only capability a value needs is ordering against another value of
/// the same concrete type, which groups use to rank their members. Any
/// `PartialOrd` type qualifies. Comparing values of different concrete types
/// is a caller error and yields `None`; a group mixing value types has no
/// meaningful ranking.
pub trait Value: fmt::Debug + Send + Sync {
    /// Compares against another value of the same concrete type.
    fn compare(&self, other: &dyn Value) -> Option<Ordering>;

    /// Upcast used to recover the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T> Value for T
where
    T: PartialOrd + fmt::Debug + Send + Sync + 'static,
{
    fn compare(&self, other: &dyn Value) -> Option<Ordering> {
        other
            .as_any()
            .downcast_ref::<T>()
            .and_then(|other| self.partial_cmp(other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns the text preceding the last period within the given key, or
/// an empty string if the key has no period.
#[must_use]
pub fn info_prefix(key: &str) -> &str {
    key.rfind('.').map_or("", |index| &key[..index])
}

/// A single gossiped fact.
///
/// Key, value, timestamps and origin never change after creation. Hops and
/// sequence number are rewritten by the store holding the info.
#[derive(Debug, Clone)]
pub struct Info {
    pub(crate) key: String,
    pub(crate) value: Arc<dyn Value>,
    /// Wall time at origination (Unix nanos).
    pub(crate) timestamp: i64,
    /// Wall time after which the info is discarded (Unix nanos).
    pub(crate) ttl_stamp: i64,
    /// Number of store boundaries crossed since origination.
    pub(crate) hops: u32,
    /// Sequence number assigned by the holding store.
    pub(crate) seq: i64,
    pub(crate) origin: NodeId,
}

impl Info {
    pub(crate) fn new(
        key: impl Into<String>,
        value: Arc<dyn Value>,
        timestamp: i64,
        ttl: Duration,
        seq: i64,
        origin: NodeId,
    ) -> Self {
        let ttl_nanos = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
        Self {
            key: key.into(),
            value,
            timestamp,
            ttl_stamp: timestamp.saturating_add(ttl_nanos),
            hops: 0,
            seq,
            origin,
        }
    }

    /// Returns the info key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the key prefix used for group membership.
    #[must_use]
    pub fn prefix(&self) -> &str {
        info_prefix(&self.key)
    }

    /// Returns the value.
    #[must_use]
    pub fn value(&self) -> &dyn Value {
        self.value.as_ref()
    }

    /// Returns the value as its concrete type, if it is a `T`.
    #[must_use]
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        self.value.as_any().downcast_ref::<T>()
    }

    /// Returns the origination timestamp in Unix nanoseconds.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the expiry timestamp in Unix nanoseconds.
    #[must_use]
    pub const fn ttl_stamp(&self) -> i64 {
        self.ttl_stamp
    }

    /// Returns the number of hops from the originator.
    #[must_use]
    pub const fn hops(&self) -> u32 {
        self.hops
    }

    /// Returns the sequence number assigned by the holding store.
    #[must_use]
    pub const fn seq(&self) -> i64 {
        self.seq
    }

    /// Returns the originating node.
    #[must_use]
    pub const fn origin(&self) -> NodeId {
        self.origin
    }

    /// Checks whether the info has expired at the given Unix-nanos time.
    #[must_use]
    pub const fn is_expired_at(&self, now: i64) -> bool {
        self.ttl_stamp <= now
    }

    /// Compares two infos by value.
    #[must_use]
    pub fn cmp_value(&self, other: &Self) -> Option<Ordering> {
        self.value.compare(other.value.as_ref())
    }

    /// Returns true if this info's value sorts before `other`'s.
    #[must_use]
    pub fn less(&self, other: &Self) -> bool {
        self.cmp_value(other) == Some(Ordering::Less)
    }

    /// Returns true if the value compares with itself. False for NaN.
    #[must_use]
    pub fn is_orderable(&self) -> bool {
        self.cmp_value(self).is_some()
    }
}

/// Total order used to sort group contents. Incomparable values sort as
/// equal.
pub(crate) fn sort_order(a: &Info, b: &Info) -> Ordering {
    a.cmp_value(b).unwrap_or_else(|| {
        warn!(left = %a.key, right = %b.key, "info values are not comparable");
        Ordering::Equal
    })
}
