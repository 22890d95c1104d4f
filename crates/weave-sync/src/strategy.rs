//! Conflict-resolution strategies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a peer's value is folded into the local one during a sync.
///
/// Every strategy ends in the value's own merge rule; they differ in whether
/// the merge runs at all and in what gets recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Always merge and rely on the value's tie-breaking.
    #[default]
    LastWriterWins,
    /// Skip peer state whose clock happens-before the local key clock.
    VectorClock,
    /// Always merge; meant for pure join-semilattice values.
    MergeAll,
    /// Always merge, and queue the event for external review.
    Manual,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictStrategy::LastWriterWins => "last_writer_wins",
            ConflictStrategy::VectorClock => "vector_clock",
            ConflictStrategy::MergeAll => "merge_all",
            ConflictStrategy::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Outcome of folding one peer value into the local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged without causal information.
    Merged,
    /// Peer state was causally newer than ours.
    Advanced,
    /// Peer state was concurrent with ours; joined.
    ConcurrentJoin,
    /// Peer state was causally older; nothing to do.
    SkippedStale,
    /// Merged and flagged for review.
    Flagged,
}
