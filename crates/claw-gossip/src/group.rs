//! Capacity-bounded, ranked groups of infos sharing a key prefix.
//!
//! A group keeps at most `limit` infos. A [`GroupType::MinGroup`] keeps the
//! smallest values seen, a [`GroupType::MaxGroup`] the largest. The member
//! that would be evicted next is tracked as the group's *gatekeeper*: a
//! newcomer to a full group is admitted only if it beats the gatekeeper.

use crate::clock;
use crate::error::{GossipError, Result};
use crate::info::{sort_order, Info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Ranking mode of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// Keep the infos with the smallest values.
    MinGroup,
    /// Keep the infos with the largest values.
    MaxGroup,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinGroup => write!(f, "min_group"),
            Self::MaxGroup => write!(f, "max_group"),
        }
    }
}

impl FromStr for GroupType {
    type Err = GossipError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min" | "min_group" => Ok(Self::MinGroup),
            "max" | "max_group" => Ok(Self::MaxGroup),
            other => Err(GossipError::InvalidGroupParameters {
                reason: format!("unknown group type \"{other}\""),
            }),
        }
    }
}

/// A fixed-capacity collection of infos keyed by a common prefix.
#[derive(Debug, Clone)]
pub struct Group {
    prefix: String,
    limit: usize,
    group_type: GroupType,
    infos: HashMap<String, Info>,
    /// Key of the member evicted next when a better info arrives.
    gatekeeper: Option<String>,
}

impl Group {
    /// Creates an empty group.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::InvalidGroupParameters`] if `limit` is zero.
    pub fn new(prefix: impl Into<String>, limit: usize, group_type: GroupType) -> Result<Self> {
        if limit == 0 {
            return Err(GossipError::InvalidGroupParameters {
                reason: "group size limit must be a positive number".to_string(),
            });
        }
        Ok(Self {
            prefix: prefix.into(),
            limit,
            group_type,
            infos: HashMap::new(),
            gatekeeper: None,
        })
    }

    /// Creates an empty group with the same prefix, limit and type.
    ///
    /// # Errors
    ///
    /// Propagates construction errors from [`Group::new`].
    pub fn empty_copy(&self) -> Result<Self> {
        Self::new(self.prefix.clone(), self.limit, self.group_type)
    }

    /// Returns the key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the maximum number of infos kept.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the ranking mode.
    #[must_use]
    pub const fn group_type(&self) -> GroupType {
        self.group_type
    }

    /// Returns the number of infos held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns true if the group holds no infos.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Returns the member that would be evicted next.
    #[must_use]
    pub fn gatekeeper(&self) -> Option<&Info> {
        self.gatekeeper.as_ref().and_then(|key| self.infos.get(key))
    }

    /// Adds or updates an info according to the group's admission policy.
    ///
    /// An info for a key already in the group replaces it only if its
    /// timestamp is newer; the lower of the two hop counts is kept. A new key
    /// is admitted while the group has room, or if it beats the gatekeeper,
    /// which is then evicted.
    ///
    /// Returns true if the info was added.
    pub fn add_info(&mut self, mut info: Info) -> bool {
        if let Some(existing) = self.infos.get(&info.key) {
            if info.timestamp <= existing.timestamp {
                return false;
            }
            info.hops = info.hops.min(existing.hops);
            self.infos.insert(info.key.clone(), info);
            self.update_gatekeeper();
            return true;
        }

        if self.infos.len() >= self.limit {
            self.compact(clock::current_unix_nano());
        }

        if self.infos.len() >= self.limit {
            if !self.beats_gatekeeper(&info) {
                return false;
            }
            if let Some(evicted) = self.gatekeeper.take() {
                self.infos.remove(&evicted);
                debug!(
                    prefix = %self.prefix,
                    evicted = %evicted,
                    admitted = %info.key,
                    "evicted group gatekeeper"
                );
            }
        }

        self.infos.insert(info.key.clone(), info);
        self.update_gatekeeper();
        true
    }

    /// Returns the info for `key`, discarding it if it has expired.
    pub fn get_info(&mut self, key: &str) -> Option<&Info> {
        let now = clock::current_unix_nano();
        if self.infos.get(key)?.is_expired_at(now) {
            self.infos.remove(key);
            self.update_gatekeeper();
            return None;
        }
        self.infos.get(key)
    }

    /// Returns the unexpired infos in no particular order.
    #[must_use]
    pub fn infos_as_vec(&self) -> Vec<Info> {
        let now = clock::current_unix_nano();
        self.infos
            .values()
            .filter(|info| !info.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Iterates over every held info, including expired ones.
    pub(crate) fn infos(&self) -> impl Iterator<Item = &Info> {
        self.infos.values()
    }

    fn beats_gatekeeper(&self, info: &Info) -> bool {
        let Some(gatekeeper) = self.gatekeeper() else {
            return true;
        };
        match self.group_type {
            GroupType::MinGroup => info.less(gatekeeper),
            GroupType::MaxGroup => gatekeeper.less(info),
        }
    }

    /// Drops expired infos.
    fn compact(&mut self, now: i64) {
        let before = self.infos.len();
        self.infos.retain(|_, info| !info.is_expired_at(now));
        if self.infos.len() != before {
            debug!(
                prefix = %self.prefix,
                removed = before - self.infos.len(),
                "compacted expired group infos"
            );
            self.update_gatekeeper();
        }
    }

    fn update_gatekeeper(&mut self) {
        let values = self.infos.values();
        let gatekeeper = match self.group_type {
            GroupType::MinGroup => values.max_by(|a, b| sort_order(a, b)),
            GroupType::MaxGroup => values.min_by(|a, b| sort_order(a, b)),
        };
        self.gatekeeper = gatekeeper.map(|info| info.key.clone());
    }
}
