//! Grow-only Counter CRDT
//!
//! Each node owns one monotonically growing entry. The join takes the
//! component-wise max, so re-merging the same update is a no-op, and the
//! observable value is the sum over all entries.

use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A grow-only counter keyed by node id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    /// Per-node increment totals
    counts: BTreeMap<String, u64>,
}

impl GCounter {
    /// Create a new counter
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Increment the entry owned by `node_id`
    pub fn increment(&mut self, node_id: impl Into<String>, amount: u64) {
        let entry = self.counts.entry(node_id.into()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Current value (sum over all nodes)
    pub fn value(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Get the total contributed by one node
    pub fn get(&self, node_id: &str) -> u64 {
        self.counts.get(node_id).copied().unwrap_or(0)
    }

    /// Get a reference to all per-node totals
    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

impl Lattice for GCounter {
    fn bottom() -> Self {
        Self::new()
    }

    /// Component-wise max across all nodes
    fn join(&self, other: &Self) -> Self {
        let mut counts = self.counts.clone();
        for (k, v) in &other.counts {
            counts
                .entry(k.clone())
                .and_modify(|e| *e = (*e).max(*v))
                .or_insert(*v);
        }
        Self { counts }
    }
}
