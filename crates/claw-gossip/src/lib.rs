//! # claw-gossip
//!
//! Information store for cluster gossip.
//!
//! Nodes spread small, frequently changing facts (liveness, capacity,
//! topology hints) by periodically exchanging deltas of what they know.
//! This crate holds one node's view of those facts and implements the
//! merge rules:
//!
//! - Last writer wins by origination timestamp, ties favor what is held
//! - Hop counts record the shortest path a fact has travelled
//! - Sequence numbers let a peer ask only for what changed
//! - Ranked groups cap fact families to their N smallest or largest values
//! - Counting bloom filters estimate how far two stores have drifted apart
//!
//! ## Core Types
//!
//! - [`Info`]: A single gossiped fact
//! - [`InfoStore`]: A node's infos, groups and sequence generator
//! - [`Group`]: A capacity-bounded, ranked set of infos sharing a prefix
//! - [`Filter`]: A counting bloom filter over info keys
//! - [`StoreConfig`]: Origin identity, filter sizing and initial groups
//!
//! ## Example
//!
//! ```
//! use claw_gossip::InfoStore;
//! use std::time::Duration;
//!
//! let mut local = InfoStore::new();
//! let info = local.new_info("node.1.capacity", 0.75_f64, Duration::from_secs(30));
//! assert!(local.add_info(info));
//!
//! // A peer pulls everything we have and merges it.
//! let mut peer = InfoStore::new();
//! peer.combine(local.delta(0)?)?;
//! assert_eq!(peer.get_info("node.1.capacity").map(|i| i.hops()), Some(1));
//! # Ok::<(), claw_gossip::GossipError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod group;
pub mod info;
pub mod store;

pub use clock::{monotonic_unix_nano, MonotonicClock};
pub use config::{GroupConfig, StoreConfig};
pub use error::{GossipError, Result};
pub use filter::Filter;
pub use group::{Group, GroupType};
pub use info::{info_prefix, Info, NodeId, Value};
pub use store::{CombineStats, InfoStore, StoreStats};
