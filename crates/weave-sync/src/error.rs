//! Error types for the replication layer.

use thiserror::Error;
use weave_core::{CrdtKind, KindMismatch};

/// Errors that can occur while producing or applying replication state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("CRDT not registered: {0}")]
    UnknownKey(String),

    #[error("Operation {operation} does not apply to a {kind}")]
    OperationMismatch { operation: String, kind: CrdtKind },

    #[error(transparent)]
    KindMismatch(#[from] KindMismatch),

    #[error("Serialization error for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
