//! Bounded set of recently seen packet ids.

use std::collections::{HashSet, VecDeque};

/// FIFO-evicting set used to suppress flood duplicates.
#[derive(Debug)]
pub struct SeenSet {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Record `id`; returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_rejected() {
        let mut seen = SeenSet::new(4);
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let mut seen = SeenSet::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("c");

        assert!(!seen.contains("a"));
        assert!(seen.contains("b"));
        assert!(seen.contains("c"));
        assert!(seen.insert("a"));
    }

    #[test]
    fn test_clear() {
        let mut seen = SeenSet::new(8);
        seen.insert("a");
        seen.clear();
        assert!(seen.is_empty());
        assert!(seen.insert("a"));
    }
}
