//! The info store: a node's local view of gossiped facts.
//!
//! An [`InfoStore`] holds ungrouped infos keyed by name plus any number of
//! registered [`Group`]s. It assigns sequence numbers to everything it
//! accepts so a peer can ask for only what changed since a watermark
//! ([`InfoStore::delta`]), and it merges such deltas back in with
//! [`InfoStore::combine`]. Filters summarize the keys a store knows about so
//! two nodes can estimate how far apart they are before exchanging deltas.

use crate::clock;
use crate::config::StoreConfig;
use crate::error::{GossipError, Result};
use crate::filter::Filter;
use crate::group::{Group, GroupType};
use crate::info::{info_prefix, sort_order, Info, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One step of a store traversal.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Visit<'a> {
    /// A registered group, yielded before its infos.
    Group(&'a Group),
    /// An info, grouped or not.
    Info(&'a Info),
}

/// Outcome of merging a delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CombineStats {
    /// Infos found in the delta.
    pub infos_seen: usize,
    /// Infos that replaced or extended local state.
    pub infos_added: usize,
    /// Groups registered because the delta carried them.
    pub groups_registered: usize,
}

/// Point-in-time counters describing a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Ungrouped infos, expired or not.
    pub ungrouped_infos: usize,
    /// Infos held across all groups.
    pub grouped_infos: usize,
    /// Registered groups.
    pub groups: usize,
    /// Highest sequence number held.
    pub max_seq: i64,
    /// Last sequence number handed out.
    pub seq_gen: i64,
}

/// Maps of infos and info groups with a sequence number generator.
#[derive(Debug, Clone)]
pub struct InfoStore {
    /// Ungrouped infos by key.
    infos: HashMap<String, Info>,
    /// Groups by key prefix.
    groups: BTreeMap<String, Group>,
    /// Highest sequence number held.
    max_seq: i64,
    /// Incremented for every info created or absorbed.
    seq_gen: i64,
    config: StoreConfig,
}

impl Default for InfoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InfoStore {
    /// Creates an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::empty(StoreConfig::default())
    }

    /// Creates a store from a configuration, registering its groups.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::InvalidConfig`] if the configuration fails
    /// validation, or a group error if a declared group cannot be created.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let groups = config.groups.clone();
        let mut store = Self::empty(config);
        for group in groups {
            store.register_group(Group::new(group.prefix, group.limit, group.group_type)?)?;
        }
        Ok(store)
    }

    fn empty(config: StoreConfig) -> Self {
        Self {
            infos: HashMap::new(),
            groups: BTreeMap::new(),
            max_seq: 0,
            seq_gen: 0,
            config,
        }
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the highest sequence number held.
    #[must_use]
    pub const fn max_seq(&self) -> i64 {
        self.max_seq
    }

    /// Returns the last sequence number handed out.
    #[must_use]
    pub const fn seq_gen(&self) -> i64 {
        self.seq_gen
    }

    /// Returns the number of infos in groups and in the ungrouped map.
    ///
    /// This is an approximation: expired infos that have not been discarded
    /// yet are counted.
    #[must_use]
    pub fn info_count(&self) -> usize {
        self.infos.len() + self.groups.values().map(Group::len).sum::<usize>()
    }

    /// Returns the group registered under `prefix`.
    #[must_use]
    pub fn group(&self, prefix: &str) -> Option<&Group> {
        self.groups.get(prefix)
    }

    /// Returns the number of registered groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Returns the store's counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            ungrouped_infos: self.infos.len(),
            grouped_infos: self.groups.values().map(Group::len).sum(),
            groups: self.groups.len(),
            max_seq: self.max_seq,
            seq_gen: self.seq_gen,
        }
    }

    fn next_seq(&mut self) -> i64 {
        self.seq_gen += 1;
        self.seq_gen
    }

    fn group_for_key_mut(&mut self, key: &str) -> Option<&mut Group> {
        self.groups.get_mut(info_prefix(key))
    }

    /// Creates an info originating at this node with a fresh timestamp and
    /// sequence number. The info is not added to the store.
    pub fn new_info<V: Value + 'static>(
        &mut self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
    ) -> Info {
        let seq = self.next_seq();
        Info::new(
            key,
            Arc::new(value),
            clock::monotonic_unix_nano(),
            ttl,
            seq,
            self.config.node_id,
        )
    }

    /// Returns the info for `key`, or `None` if it is unknown or expired.
    ///
    /// An expired ungrouped info is discarded as a side effect.
    pub fn get_info(&mut self, key: &str) -> Option<&Info> {
        if self.groups.contains_key(info_prefix(key)) {
            return self.group_for_key_mut(key)?.get_info(key);
        }
        let now = clock::current_unix_nano();
        if self.infos.get(key)?.is_expired_at(now) {
            self.infos.remove(key);
            debug!(key = %key, "discarded expired info");
            return None;
        }
        self.infos.get(key)
    }

    /// Returns the infos of the group registered under `prefix`, sorted
    /// ascending by value for a min group and descending for a max group.
    /// Values that do not compare equal to themselves, such as NaN, come
    /// last in no particular order.
    #[must_use]
    pub fn get_group_infos(&self, prefix: &str) -> Option<Vec<Info>> {
        let group = self.groups.get(prefix)?;
        let (mut infos, unordered): (Vec<Info>, Vec<Info>) = group
            .infos_as_vec()
            .into_iter()
            .partition(Info::is_orderable);
        match group.group_type() {
            GroupType::MinGroup => infos.sort_by(sort_order),
            GroupType::MaxGroup => infos.sort_by(|a, b| sort_order(b, a)),
        }
        infos.extend(unordered);
        Some(infos)
    }

    /// Registers a group. Infos added afterwards whose prefix matches the
    /// group's go to the group instead of the ungrouped map.
    ///
    /// Ungrouped infos already held under the prefix are moved into the
    /// group through its admission policy; those it rejects are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::DuplicateGroup`] if the prefix is already
    /// registered; the store is left unchanged.
    pub fn register_group(&mut self, mut group: Group) -> Result<()> {
        if self.groups.contains_key(group.prefix()) {
            return Err(GossipError::DuplicateGroup {
                prefix: group.prefix().to_string(),
            });
        }

        let adopted: Vec<String> = self
            .infos
            .keys()
            .filter(|key| info_prefix(key) == group.prefix())
            .cloned()
            .collect();
        let mut moved = 0;
        for key in &adopted {
            if let Some(info) = self.infos.remove(key) {
                if group.add_info(info) {
                    moved += 1;
                }
            }
        }

        debug!(
            prefix = %group.prefix(),
            limit = group.limit(),
            group_type = %group.group_type(),
            adopted = adopted.len(),
            moved,
            "registered group"
        );
        self.groups.insert(group.prefix().to_string(), group);
        Ok(())
    }

    /// Adds or updates an info.
    ///
    /// Infos whose prefix names a registered group are handed to that group.
    /// Otherwise an existing info for the key is replaced only by a strictly
    /// newer timestamp, and the replacement keeps the lower hop count of the
    /// two.
    ///
    /// Returns true if the info was stored.
    pub fn add_info(&mut self, mut info: Info) -> bool {
        let seq = info.seq;
        if let Some(group) = self.group_for_key_mut(&info.key) {
            if !group.add_info(info) {
                return false;
            }
            self.max_seq = self.max_seq.max(seq);
            return true;
        }

        if let Some(existing) = self.infos.get(&info.key) {
            if info.timestamp <= existing.timestamp {
                return false;
            }
            info.hops = info.hops.min(existing.hops);
        }
        self.infos.insert(info.key.clone(), info);
        self.max_seq = self.max_seq.max(seq);
        true
    }

    /// Visits every group followed by its infos, then every ungrouped info.
    pub(crate) fn visits(&self) -> impl Iterator<Item = Visit<'_>> {
        self.groups
            .values()
            .flat_map(|group| {
                std::iter::once(Visit::Group(group)).chain(group.infos().map(Visit::Info))
            })
            .chain(self.infos.values().map(Visit::Info))
    }

    /// Iterates over every info reachable from the store.
    fn reachable_infos(&self) -> impl Iterator<Item = &Info> {
        self.visits().filter_map(|visit| match visit {
            Visit::Info(info) => Some(info),
            Visit::Group(_) => None,
        })
    }

    /// Merges a delta from a peer into this store.
    ///
    /// Groups the delta carries that are unknown here are registered empty
    /// with the same policy; their contents arrive through the per-info pass.
    /// Every info is given a fresh local sequence number and one more hop,
    /// then added with [`InfoStore::add_info`].
    ///
    /// Merging is not transactional: if a group cannot be registered, infos
    /// and groups merged before the failure stay in place.
    ///
    /// # Errors
    ///
    /// Propagates group construction and registration errors.
    #[allow(clippy::needless_pass_by_value)] // the delta is absorbed
    pub fn combine(&mut self, delta: InfoStore) -> Result<CombineStats> {
        let mut stats = CombineStats::default();
        for visit in delta.visits() {
            match visit {
                Visit::Group(group) => {
                    if !self.groups.contains_key(group.prefix()) {
                        self.register_group(group.empty_copy()?)?;
                        stats.groups_registered += 1;
                    }
                }
                Visit::Info(info) => {
                    let mut info = info.clone();
                    info.seq = self.next_seq();
                    info.hops = info.hops.saturating_add(1);
                    stats.infos_seen += 1;
                    if self.add_info(info) {
                        stats.infos_added += 1;
                    }
                }
            }
        }
        debug!(
            seen = stats.infos_seen,
            added = stats.infos_added,
            groups = stats.groups_registered,
            max_seq = self.max_seq,
            "combined delta"
        );
        Ok(stats)
    }

    /// Returns a store holding the infos added since (not including) `seq`.
    ///
    /// The delta carries empty copies of every group, and its sequence
    /// generator starts from this store's. Infos keep their sequence numbers
    /// and hop counts. The delta shares nothing with this store.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::NoDeltaAvailable`] if nothing is newer than
    /// `seq`, or propagates group construction errors.
    pub fn delta(&self, seq: i64) -> Result<InfoStore> {
        if seq >= self.max_seq {
            return Err(GossipError::NoDeltaAvailable {
                seq,
                max_seq: self.max_seq,
            });
        }

        let mut delta = Self::empty(self.config.clone());
        delta.seq_gen = self.seq_gen;

        for visit in self.visits() {
            match visit {
                Visit::Group(group) => delta.register_group(group.empty_copy()?)?,
                Visit::Info(info) => {
                    if info.seq > seq {
                        delta.add_info(info.clone());
                    }
                }
            }
        }
        debug!(
            since = seq,
            max_seq = self.max_seq,
            infos = delta.info_count(),
            "extracted delta"
        );
        Ok(delta)
    }

    /// Builds a filter of the keys held whose hop count is at most
    /// `max_hops`, for a peer to diff against.
    ///
    /// # Errors
    ///
    /// Propagates [`GossipError::InvalidFilterParameters`] from filter
    /// construction.
    pub fn build_filter(&self, max_hops: u32) -> Result<Filter> {
        let expected = u32::try_from(self.info_count()).unwrap_or(u32::MAX).max(1);
        let mut filter = Filter::new(expected, self.config.filter_bits, self.config.filter_max_fp)?;
        for info in self.reachable_infos().filter(|info| info.hops <= max_hops) {
            filter.add_key(&info.key);
        }
        Ok(filter)
    }

    /// Removes every key held within `max_hops` from a peer's filter and
    /// returns the filter's remaining estimated insertions, roughly the
    /// number of keys the peer has that this store lacks.
    pub fn diff_filter(&self, filter: &mut Filter, max_hops: u32) -> u32 {
        for info in self.reachable_infos().filter(|info| info.hops <= max_hops) {
            filter.remove_key(&info.key);
        }
        filter.approximate_insertions()
    }
}
