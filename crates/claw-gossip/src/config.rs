//! Info store configuration.

use crate::error::{GossipError, Result};
use crate::group::GroupType;
use crate::info::NodeId;
use serde::{Deserialize, Serialize};

/// Default counter width for filters built by the store.
pub const DEFAULT_FILTER_BITS: u32 = 4;

/// Default maximum false-positive rate for filters built by the store.
pub const DEFAULT_FILTER_MAX_FP: f64 = 0.025;

/// A group to register when the store is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Key prefix the group collects.
    pub prefix: String,
    /// Maximum number of infos kept.
    pub limit: usize,
    /// Ranking mode.
    pub group_type: GroupType,
}

/// Configuration for an [`InfoStore`](crate::InfoStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Identifier stamped on infos created by this store.
    pub node_id: NodeId,
    /// Counter width of filters built by the store.
    pub filter_bits: u32,
    /// Maximum false-positive rate of filters built by the store.
    pub filter_max_fp: f64,
    /// Groups registered at construction.
    pub groups: Vec<GroupConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(),
            filter_bits: DEFAULT_FILTER_BITS,
            filter_max_fp: DEFAULT_FILTER_MAX_FP,
            groups: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::InvalidConfig`] if the JSON is malformed or
    /// the result fails [`StoreConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| GossipError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks filter parameters and group declarations.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.filter_bits == 0 || self.filter_bits > 8 {
            return Err(GossipError::InvalidConfig {
                reason: format!("filter_bits ({}) must be >= 1 and <= 8", self.filter_bits),
            });
        }
        if !(self.filter_max_fp > 0.0 && self.filter_max_fp < 1.0) {
            return Err(GossipError::InvalidConfig {
                reason: format!(
                    "filter_max_fp ({}) must be in (0, 1)",
                    self.filter_max_fp
                ),
            });
        }
        for (i, group) in self.groups.iter().enumerate() {
            if group.limit == 0 {
                return Err(GossipError::InvalidConfig {
                    reason: format!("group \"{}\" has a zero limit", group.prefix),
                });
            }
            if self.groups[..i].iter().any(|g| g.prefix == group.prefix) {
                return Err(GossipError::InvalidConfig {
                    reason: format!("group \"{}\" declared twice", group.prefix),
                });
            }
        }
        Ok(())
    }

    /// Sets the node identifier.
    #[must_use]
    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = node_id;
        self
    }

    /// Sets the filter counter width.
    #[must_use]
    pub fn with_filter_bits(mut self, bits: u32) -> Self {
        self.filter_bits = bits;
        self
    }

    /// Sets the filter false-positive rate.
    #[must_use]
    pub fn with_filter_max_fp(mut self, max_fp: f64) -> Self {
        self.filter_max_fp = max_fp;
        self
    }

    /// Adds a group to register at construction.
    #[must_use]
    pub fn with_group(mut self, prefix: impl Into<String>, limit: usize, group_type: GroupType) -> Self {
        self.groups.push(GroupConfig {
            prefix: prefix.into(),
            limit,
            group_type,
        });
        self
    }
}
