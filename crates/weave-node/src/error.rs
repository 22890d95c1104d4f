//! Error types for a mesh node.

use thiserror::Error;
use weave_sync::SyncError;

/// Error type for node operations.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Replication error: {0}")]
    Sync(#[from] SyncError),

    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Node already started")]
    AlreadyStarted,
}

/// Result type for node operations.
pub type NodeResult<T> = std::result::Result<T, NodeError>;
