use crate::core::Timestamp;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Key of the recency order: newest first, then name ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecencyKey {
    pub last_modified: Timestamp,
    pub name: String,
}

impl RecencyKey {
    pub fn new(last_modified: Timestamp, name: impl Into<String>) -> Self {
        Self {
            last_modified,
            name: name.into(),
        }
    }
}

impl Ord for RecencyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .last_modified
            .cmp(&self.last_modified)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for RecencyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Presentation order of the live records.
///
/// Keys carry names rather than slots, so deleting a record never forces a
/// rebuild here; slots are resolved through the name index.
#[derive(Debug, Default, Clone)]
pub struct RecencyIndex {
    keys: BTreeSet<RecencyKey>,
}

impl RecencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, last_modified: Timestamp, name: &str) -> bool {
        self.keys.insert(RecencyKey::new(last_modified, name))
    }

    pub fn remove(&mut self, last_modified: Timestamp, name: &str) -> bool {
        self.keys.remove(&RecencyKey::new(last_modified, name))
    }

    pub fn contains(&self, last_modified: Timestamp, name: &str) -> bool {
        self.keys.contains(&RecencyKey::new(last_modified, name))
    }

    pub fn first(&self) -> Option<&RecencyKey> {
        self.keys.first()
    }

    /// Zero-based position of `name` in recency order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|key| key.name == name)
    }

    /// Alphabetically first record modified exactly at `at`.
    pub fn find_at(&self, at: Timestamp) -> Option<&RecencyKey> {
        self.keys
            .range(RecencyKey::new(at, String::new())..)
            .next()
            .filter(|key| key.last_modified == at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecencyKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(index: &RecencyIndex) -> Vec<&str> {
        index.iter().map(|key| key.name.as_str()).collect()
    }

    #[test]
    fn test_newest_first_with_name_tie_break() {
        let mut index = RecencyIndex::new();
        index.insert(100, "Chat B");
        index.insert(100, "Chat A");
        index.insert(200, "Zed");
        index.insert(50, "Old");

        assert_eq!(names(&index), vec!["Zed", "Chat A", "Chat B", "Old"]);
        assert_eq!(index.first().unwrap().name, "Zed");
        assert_eq!(index.position("Chat B"), Some(2));
        assert_eq!(index.position("missing"), None);
    }

    #[test]
    fn test_remove_requires_exact_key() {
        let mut index = RecencyIndex::new();
        index.insert(100, "a");

        assert!(!index.remove(101, "a"));
        assert!(index.remove(100, "a"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_find_at() {
        let mut index = RecencyIndex::new();
        index.insert(300, "c");
        index.insert(200, "b");
        index.insert(200, "a");

        assert_eq!(index.find_at(200).unwrap().name, "a");
        assert_eq!(index.find_at(300).unwrap().name, "c");
        assert!(index.find_at(250).is_none());
        assert!(index.find_at(100).is_none());
    }
}
