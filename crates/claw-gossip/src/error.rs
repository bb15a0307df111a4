//! Error types for claw-gossip.

use thiserror::Error;

/// Errors that can occur in info store operations.
#[derive(Debug, Error)]
pub enum GossipError {
    /// A group is already registered under this prefix.
    #[error("group \"{prefix}\" already in group map")]
    DuplicateGroup {
        /// The prefix that was registered twice.
        prefix: String,
    },

    /// No info in the store is newer than the requested watermark.
    #[error("no deltas to info store since sequence number {seq} (max {max_seq})")]
    NoDeltaAvailable {
        /// The requested watermark.
        seq: i64,
        /// The store's highest sequence number.
        max_seq: i64,
    },

    /// Group construction parameters were rejected.
    #[error("invalid group parameters: {reason}")]
    InvalidGroupParameters {
        /// Why the parameters are invalid.
        reason: String,
    },

    /// Filter sizing parameters were rejected.
    #[error("invalid filter parameters: {reason}")]
    InvalidFilterParameters {
        /// Why the parameters are invalid.
        reason: String,
    },

    /// Store configuration could not be parsed or failed validation.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// Why the configuration is invalid.
        reason: String,
    },
}

/// Result type for gossip operations.
pub type Result<T> = std::result::Result<T, GossipError>;
