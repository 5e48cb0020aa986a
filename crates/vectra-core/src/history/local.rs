//! Uncompressed snapshot store.

use super::{HistoryConfig, HistoryResult, HistoryStore, Timeline};

/// Plain in-memory history with no size ceiling.
///
/// Used when a snapshot is too large for [`CompressedStore`](super::CompressedStore)
/// and by the host while an isolated history worker is not ready yet.
#[derive(Debug, Clone)]
pub struct LocalStore {
    timeline: Timeline<String>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(HistoryConfig::default().max_entries)
    }
}

impl LocalStore {
    /// Create an empty store holding at most `max_entries` snapshots.
    pub fn new(max_entries: usize) -> Self {
        Self {
            timeline: Timeline::new(max_entries),
        }
    }

    /// Create a store seeded with one snapshot.
    pub fn with_seed(max_entries: usize, seed: &str) -> Self {
        let mut store = Self::new(max_entries);
        store.timeline.reset(seed.to_string());
        store
    }

    /// Take over entries from another store, keeping its cursor.
    pub fn from_entries(entries: Vec<String>, cursor: usize, max_entries: usize) -> Self {
        Self {
            timeline: Timeline::from_entries(entries, cursor, max_entries),
        }
    }

    /// Entries from the oldest up to and including the cursor.
    pub fn reachable(&self) -> impl Iterator<Item = &str> {
        let end = self.timeline.cursor().map_or(0, |c| c + 1);
        self.timeline.iter().take(end).map(String::as_str)
    }
}

impl HistoryStore for LocalStore {
    fn push(&mut self, snapshot: &str) -> HistoryResult<()> {
        self.timeline.push(snapshot.to_string());
        Ok(())
    }

    fn undo(&mut self) -> HistoryResult<Option<String>> {
        let snapshot = self.timeline.behind().cloned();
        self.timeline.step_back();
        Ok(snapshot)
    }

    fn redo(&mut self) -> HistoryResult<Option<String>> {
        let snapshot = self.timeline.ahead().cloned();
        self.timeline.step_forward();
        Ok(snapshot)
    }

    fn can_undo(&self) -> bool {
        self.timeline.can_undo()
    }

    fn can_redo(&self) -> bool {
        self.timeline.can_redo()
    }

    fn len(&self) -> usize {
        self.timeline.len()
    }

    fn cursor(&self) -> Option<usize> {
        self.timeline.cursor()
    }

    fn current(&self) -> HistoryResult<Option<String>> {
        Ok(self.timeline.current().cloned())
    }

    fn clear_to(&mut self, seed: &str) -> HistoryResult<()> {
        self.timeline.reset(seed.to_string());
        Ok(())
    }

    fn entries(&self) -> HistoryResult<Vec<String>> {
        Ok(self.timeline.iter().cloned().collect())
    }

    fn compressed_bytes(&self) -> usize {
        self.timeline.iter().map(String::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_large_snapshots() {
        let mut store = LocalStore::with_seed(50, "seed");
        let large = "x".repeat(2 << 20);
        store.push(&large).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.undo().unwrap().as_deref(), Some("seed"));
        assert_eq!(store.redo().unwrap(), Some(large));
    }

    #[test]
    fn test_same_rules_as_compressed() {
        let mut store = LocalStore::with_seed(3, "a");
        for s in ["b", "c", "d"] {
            store.push(s).unwrap();
        }
        assert_eq!(store.entries().unwrap(), ["b", "c", "d"]);

        store.undo().unwrap();
        store.push("e").unwrap();
        assert_eq!(store.entries().unwrap(), ["b", "c", "e"]);
        assert_eq!(store.redo().unwrap(), None);
    }

    #[test]
    fn test_reachable_stops_at_cursor() {
        let mut store = LocalStore::with_seed(10, "a");
        store.push("b").unwrap();
        store.push("c").unwrap();
        store.undo().unwrap();

        assert_eq!(store.reachable().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_empty_store() {
        let mut store = LocalStore::new(10);
        assert!(store.is_empty());
        assert_eq!(store.cursor(), None);
        assert_eq!(store.undo().unwrap(), None);
        assert_eq!(store.current().unwrap(), None);
        assert_eq!(store.reachable().count(), 0);
    }
}
