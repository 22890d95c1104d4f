//! # weave-sync
//!
//! Delta-based replication for the Meshweave node.
//!
//! This crate provides:
//! - Change detection: content hashes decide which keys produce deltas
//! - Causal metadata: a per-node [`VectorClock`] stamped onto every delta
//! - Reconciliation: peer snapshots merged under a [`ConflictStrategy`]
//! - Retention: deltas kept for a bounded time and swept by garbage collection
//!
//! ## Example
//!
//! ```rust
//! use weave_core::Crdt;
//! use weave_sync::CrdtSyncOptimizer;
//!
//! let mut x = CrdtSyncOptimizer::new("x");
//! x.register("hits", Crdt::counter()).unwrap();
//! x.get_mut("hits").and_then(Crdt::as_counter_mut).unwrap().increment("x", 5);
//!
//! let mut y = CrdtSyncOptimizer::new("y");
//! y.register("hits", Crdt::counter()).unwrap();
//! y.get_mut("hits").and_then(Crdt::as_counter_mut).unwrap().increment("y", 3);
//!
//! let back = x.sync_with_peer("y", &y.snapshot());
//! y.batch_apply_deltas(&back);
//!
//! assert_eq!(x.get("hits"), y.get("hits"));
//! ```

pub mod config;
pub mod delta;
pub mod error;
pub mod gc;
pub mod metrics;
pub mod optimizer;
pub mod strategy;
pub mod vector_clock;

pub use config::{SyncConfig, SyncConfigBuilder};
pub use delta::{content_hash, CrdtDelta, DeltaOp, CHECKSUM_LEN};
pub use error::{SyncError, SyncResult};
pub use gc::{spawn_gc, GcHandle};
pub use metrics::{SyncMetrics, SyncReport};
pub use optimizer::{ConflictRecord, CrdtSyncOptimizer, SyncEntry};
pub use strategy::{ConflictStrategy, MergeOutcome};
pub use vector_clock::VectorClock;
