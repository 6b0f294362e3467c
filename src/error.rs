//! Error taxonomy for the partitioning worker.
//!
//! Contract violations on in-memory structures (double removal from a cost tracker,
//! out-of-range indices) are programming errors and panic. Everything that can be caused by
//! upstream data or by the synchronization transport is reported through [`PartitionError`].

use thiserror::Error;

use crate::sync::ChannelId;

/// Errors surfaced by the partitioning core.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The configuration cannot drive a run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A block is internally inconsistent (size mismatch between views, pulled values
    /// not aligned with keys, assignment length not matching the examples).
    #[error("malformed block {block_id}: {reason}")]
    MalformedBlock {
        /// Block the inconsistency was detected in.
        block_id: u64,
        /// What was inconsistent.
        reason: String,
    },

    /// A pull or push failed in the synchronization transport.
    #[error("synchronization failure on channel {channel}: {reason}")]
    Sync {
        /// Channel (block id) of the failed request.
        channel: ChannelId,
        /// Transport-provided description.
        reason: String,
    },

    /// The other side of a pipeline or completion handle went away without answering.
    #[error("{0} disconnected")]
    Disconnected(&'static str),

    /// The pipeline was torn down because another stage failed.
    #[error("pipeline aborted")]
    Aborted,

    /// Filesystem failure while reading configuration or writing partitions.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be (de)serialized.
    #[error("configuration (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl PartitionError {
    /// Builds a [`PartitionError::MalformedBlock`].
    pub fn malformed(block_id: u64, reason: impl Into<String>) -> Self {
        PartitionError::MalformedBlock {
            block_id,
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures a retry at the transport boundary may cure.
    pub fn is_transient(&self) -> bool {
        matches!(self, PartitionError::Sync { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = PartitionError> = std::result::Result<T, E>;
