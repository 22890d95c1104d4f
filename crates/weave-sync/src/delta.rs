//! Replication deltas and content hashing.

use crate::error::{SyncError, SyncResult};
use crate::vector_clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use weave_core::{Crdt, CrdtValue};

/// Length of the hex checksum carried by a delta.
pub const CHECKSUM_LEN: usize = 16;

/// The change a delta carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum DeltaOp {
    /// Write a register value at the delta's timestamp.
    Set(String),
    /// Add to the origin's counter entry.
    Increment(u64),
    /// Add an element to a set under a fresh tag.
    Add(String),
    /// Remove every observed tag of an element.
    Remove(String),
    /// Join a full state snapshot.
    Merge(Crdt),
}

impl DeltaOp {
    pub fn name(&self) -> &'static str {
        match self {
            DeltaOp::Set(_) => "set",
            DeltaOp::Increment(_) => "increment",
            DeltaOp::Add(_) => "add",
            DeltaOp::Remove(_) => "remove",
            DeltaOp::Merge(_) => "merge",
        }
    }
}

impl fmt::Display for DeltaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A change to one registered CRDT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrdtDelta {
    pub key: String,
    pub operation: DeltaOp,
    pub timestamp: DateTime<Utc>,
    pub origin: String,
    /// Content hash of the value after the change
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_clock: Option<VectorClock>,
}

impl CrdtDelta {
    /// A standalone operation delta, checksum left empty.
    pub fn op(key: impl Into<String>, origin: impl Into<String>, operation: DeltaOp) -> Self {
        Self {
            key: key.into(),
            operation,
            timestamp: Utc::now(),
            origin: origin.into(),
            checksum: String::new(),
            vector_clock: None,
        }
    }

    /// Age of the delta relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

/// Content hash of a CRDT's observable value.
///
/// SHA-256 over the canonical JSON of the value, truncated to
/// [`CHECKSUM_LEN`] hex characters.
pub fn content_hash(key: &str, crdt: &Crdt) -> SyncResult<String> {
    let value: CrdtValue = crdt.value();
    let bytes = serde_json::to_vec(&value).map_err(|e| SyncError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    let digest = Sha256::digest(&bytes);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(hex[..CHECKSUM_LEN].to_string())
}
