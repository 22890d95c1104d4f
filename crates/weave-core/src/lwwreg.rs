//! Last-Writer-Wins (LWW) Register CRDT
//!
//! The register always retains the write with the highest timestamp. When two
//! writes carry the same timestamp the lexicographically greater writer id
//! wins, so every replica picks the same survivor without coordination.

use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A Last-Writer-Wins Register.
///
/// Stores a value along with the timestamp of the write and the id of the
/// node that performed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister<T: Ord + Clone> {
    /// The current value
    value: Option<T>,
    /// The timestamp of the last write
    timestamp: u64,
    /// The node that wrote this value (for tie-breaking)
    writer_id: String,
}

impl<T: Ord + Clone> LwwRegister<T> {
    /// Create an empty register
    pub fn new() -> Self {
        Self {
            value: None,
            timestamp: 0,
            writer_id: String::new(),
        }
    }

    /// Write a value. Writes that lose against the current one are ignored.
    pub fn set(&mut self, value: T, timestamp: u64, writer_id: impl Into<String>) {
        let writer_id = writer_id.into();
        if timestamp > self.timestamp
            || (timestamp == self.timestamp && writer_id >= self.writer_id)
        {
            self.value = Some(value);
            self.timestamp = timestamp;
            self.writer_id = writer_id;
        }
    }

    /// Get the current value if it exists
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Project the register to its observable value
    pub fn value(&self) -> Option<T> {
        self.value.clone()
    }

    /// Get the timestamp of the current value
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Get the id of the node that wrote the current value
    pub fn writer_id(&self) -> &str {
        &self.writer_id
    }

    /// Check if the register is empty (no value set)
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    fn wins_over(&self, other: &Self) -> bool {
        match self.timestamp.cmp(&other.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match self.writer_id.cmp(&other.writer_id) {
                Ordering::Greater => true,
                Ordering::Less => false,
                // Same write seen twice, or a writer that reused a timestamp:
                // fall back to the value so the join stays commutative.
                Ordering::Equal => self.value >= other.value,
            },
        }
    }
}

impl<T: Ord + Clone> Default for LwwRegister<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> Lattice for LwwRegister<T> {
    fn bottom() -> Self {
        Self::new()
    }

    /// Keep the write with the later timestamp; tie-break on writer id.
    fn join(&self, other: &Self) -> Self {
        if self.wins_over(other) {
            self.clone()
        } else {
            other.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lwwreg_basic_operations() {
        let mut reg: LwwRegister<i32> = LwwRegister::new();

        assert!(reg.is_empty());
        assert_eq!(reg.get(), None);

        reg.set(42, 100, "node-a");
        assert_eq!(reg.get(), Some(&42));
        assert_eq!(reg.timestamp(), 100);
        assert_eq!(reg.writer_id(), "node-a");
    }

    #[test]
    fn test_lwwreg_higher_timestamp_wins() {
        let mut reg: LwwRegister<i32> = LwwRegister::new();

        reg.set(10, 100, "node-a");
        reg.set(20, 200, "node-b");
        assert_eq!(reg.get(), Some(&20));

        // Old timestamp doesn't overwrite
        reg.set(30, 150, "node-c");
        assert_eq!(reg.get(), Some(&20));
    }

    #[test]
    fn test_lwwreg_tie_break_writer_id() {
        let mut reg: LwwRegister<i32> = LwwRegister::new();

        reg.set(10, 100, "node-a");
        reg.set(20, 100, "node-b");
        assert_eq!(reg.get(), Some(&20));

        reg.set(30, 100, "node-a");
        assert_eq!(reg.get(), Some(&20));
    }

    #[test]
    fn test_lwwreg_merge_picks_later_operand() {
        let mut a: LwwRegister<String> = LwwRegister::new();
        a.set("old".to_string(), 5, "z-node");

        let mut b: LwwRegister<String> = LwwRegister::new();
        b.set("new".to_string(), 6, "a-node");

        let mut merged = a.clone();
        merged.merge(&b);
        assert_eq!(merged, b);

        let mut merged = b.clone();
        merged.merge(&a);
        assert_eq!(merged, b);
    }

    #[test]
    fn test_lwwreg_merge_equal_timestamps_greater_writer() {
        let mut a: LwwRegister<String> = LwwRegister::new();
        a.set("from-x".to_string(), 7, "x");

        let mut b: LwwRegister<String> = LwwRegister::new();
        b.set("from-y".to_string(), 7, "y");

        assert_eq!(a.join(&b), b);
        assert_eq!(b.join(&a), b);
    }

    #[test]
    fn test_lwwreg_bottom_is_identity() {
        let mut reg: LwwRegister<i32> = LwwRegister::new();
        reg.set(42, 100, "node-a");

        assert_eq!(reg.join(&LwwRegister::bottom()), reg);
        assert_eq!(LwwRegister::bottom().join(&reg), reg);
    }

    #[test]
    fn test_lwwreg_serialization() {
        let mut reg: LwwRegister<i32> = LwwRegister::new();
        reg.set(42, 100, "node-a");

        let serialized = serde_json::to_string(&reg).unwrap();
        let deserialized: LwwRegister<i32> = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, reg);
    }
}
