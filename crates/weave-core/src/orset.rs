//! Observed-Remove Set (OR-Set)
//!
//! Each add generates a unique tag. A remove tombstones only the tags the
//! removing replica has observed, so an add that the remover never saw
//! survives the merge, while a stale add (one whose tag was observed and
//! tombstoned) never resurrects the element.

use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use ulid::Ulid;

/// A unique tag for each add operation
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// The node that created this tag
    pub replica_id: String,
    /// Unique identifier for this specific add
    pub unique_id: Ulid,
}

impl Tag {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            unique_id: Ulid::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrSet<T: Ord + Clone> {
    /// Maps elements to their live tags
    entries: BTreeMap<T, BTreeSet<Tag>>,
    /// Tags that have been removed anywhere in the network
    tombstones: BTreeSet<Tag>,
}

impl<T: Ord + Clone> OrSet<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    /// Add an element under a freshly generated tag, returning the tag
    pub fn add(&mut self, replica_id: &str, value: T) -> Tag {
        let tag = Tag::new(replica_id);
        self.add_with_tag(value, tag.clone());
        tag
    }

    /// Add an element under a caller-supplied tag.
    ///
    /// A tag that is already tombstoned is ignored.
    pub fn add_with_tag(&mut self, value: T, tag: Tag) {
        if self.tombstones.contains(&tag) {
            return;
        }
        self.entries.entry(value).or_default().insert(tag);
    }

    /// Remove all observed instances of an element
    pub fn remove(&mut self, value: &T) {
        if let Some(tags) = self.entries.remove(value) {
            self.tombstones.extend(tags);
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.entries
            .get(value)
            .is_some_and(|tags| !tags.is_empty())
    }

    /// The live tags of an element
    pub fn tags(&self, value: &T) -> Option<&BTreeSet<Tag>> {
        self.entries.get(value)
    }

    pub fn tombstones(&self) -> &BTreeSet<Tag> {
        &self.tombstones
    }

    /// Project the set to its current members
    pub fn value(&self) -> BTreeSet<T> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Ord + Clone> Default for OrSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> Lattice for OrSet<T> {
    fn bottom() -> Self {
        Self::new()
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = Self::new();

        // Merge tombstones first
        result.tombstones = self.tombstones.union(&other.tombstones).cloned().collect();

        // Merge entries, filtering out tombstoned tags
        let all_keys: BTreeSet<_> = self
            .entries
            .keys()
            .chain(other.entries.keys())
            .cloned()
            .collect();

        for key in all_keys {
            let self_tags = self.entries.get(&key).cloned().unwrap_or_default();
            let other_tags = other.entries.get(&key).cloned().unwrap_or_default();

            let merged_tags: BTreeSet<Tag> = self_tags
                .union(&other_tags)
                .filter(|tag| !result.tombstones.contains(tag))
                .cloned()
                .collect();

            if !merged_tags.is_empty() {
                result.entries.insert(key, merged_tags);
            }
        }

        result
    }
}
