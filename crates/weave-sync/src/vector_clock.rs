//! Vector clock for causal ordering of replicated updates.
//!
//! Each node owns one logical counter. Clocks are compared component-wise to
//! decide whether one update causally precedes another or whether the two are
//! concurrent. They never pick a winner between concurrent updates; that is
//! left to the value's own merge rule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A vector clock mapping node id to logical time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    clocks: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        VectorClock {
            clocks: BTreeMap::new(),
        }
    }

    /// Create a clock from entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, u64)>) -> Self {
        VectorClock {
            clocks: entries.into_iter().filter(|(_, t)| *t > 0).collect(),
        }
    }

    /// Logical time recorded for a node (0 if unknown).
    pub fn get(&self, node_id: &str) -> u64 {
        self.clocks.get(node_id).copied().unwrap_or(0)
    }

    /// Increment the counter owned by `node_id`, returning the new value.
    pub fn tick(&mut self, node_id: impl Into<String>) -> u64 {
        let entry = self.clocks.entry(node_id.into()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Raise `node_id`'s entry to at least `time`.
    pub fn observe(&mut self, node_id: impl Into<String>, time: u64) {
        if time == 0 {
            return;
        }
        let entry = self.clocks.entry(node_id.into()).or_insert(0);
        *entry = (*entry).max(time);
    }

    /// Take the component-wise max with another clock.
    pub fn update(&mut self, other: &VectorClock) {
        for (node_id, &time) in &other.clocks {
            let current = self.clocks.entry(node_id.clone()).or_insert(0);
            *current = (*current).max(time);
        }
    }

    /// True iff every component of self is <= other's and at least one is
    /// strictly less.
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        let mut at_least_one_less = false;
        for node_id in self.clocks.keys().chain(other.clocks.keys()) {
            let mine = self.get(node_id);
            let theirs = other.get(node_id);
            if mine > theirs {
                return false;
            }
            if mine < theirs {
                at_least_one_less = true;
            }
        }
        at_least_one_less
    }

    /// True iff neither clock happens-before the other.
    ///
    /// Equal clocks are reported as concurrent.
    pub fn concurrent(&self, other: &VectorClock) -> bool {
        !self.happens_before(other) && !other.happens_before(self)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.clocks.iter()
    }

    /// Get the number of nodes tracked.
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Check if the clock is empty.
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}
