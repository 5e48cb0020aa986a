//! History manager: the engine-side owner of a [`HistoryStore`].

use serde::{Deserialize, Serialize};

use super::{CompressedStore, HistoryConfig, HistoryError, HistoryStore, LocalStore};

/// Which backend currently holds the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Compressed,
    Local,
}

/// Undo/redo history for one editing session.
///
/// Failures never reach the caller. A snapshot too large for the compressed
/// backend moves the whole history to a [`LocalStore`] for the rest of the
/// session, and codec errors are logged and reported as no-ops.
pub struct HistoryManager {
    config: HistoryConfig,
    store: Box<dyn HistoryStore>,
    backend: BackendKind,
    initialized: bool,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("len", &self.store.len())
            .field("cursor", &self.store.cursor())
            .finish()
    }
}

impl HistoryManager {
    /// Create an empty manager. The first `init` or `push` seeds it.
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            store: Box::new(CompressedStore::new(config)),
            backend: BackendKind::Compressed,
            initialized: false,
        }
    }

    /// Create a manager seeded with `initial`.
    pub fn with_initial(config: HistoryConfig, initial: &str) -> Self {
        let mut manager = Self::new(config);
        manager.init(initial);
        manager
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Reset the history to a single entry.
    pub fn init(&mut self, initial: &str) {
        match self.store.clear_to(initial) {
            Ok(()) => {}
            Err(HistoryError::SizeExceeded { size, limit }) => {
                log::warn!(
                    "Initial snapshot of {} bytes exceeds {} bytes, using uncompressed history",
                    size,
                    limit
                );
                self.store = Box::new(LocalStore::with_seed(self.config.max_entries, initial));
                self.backend = BackendKind::Local;
            }
            Err(e) => {
                log::error!("Failed to seed history: {}", e);
                self.store = Box::new(LocalStore::with_seed(self.config.max_entries, initial));
                self.backend = BackendKind::Local;
            }
        }
        self.initialized = true;
        log::debug!("History initialised ({:?})", self.backend);
    }

    /// Record a new snapshot at the end of a gesture.
    pub fn push(&mut self, snapshot: &str) {
        if !self.initialized {
            self.init(snapshot);
            return;
        }
        match self.store.push(snapshot) {
            Ok(()) => {}
            Err(HistoryError::SizeExceeded { size, limit }) => {
                log::warn!(
                    "Snapshot of {} bytes exceeds {} bytes, switching to uncompressed history",
                    size,
                    limit
                );
                let mut local = self.migrate();
                // LocalStore::push cannot fail.
                let _ = local.push(snapshot);
                self.store = Box::new(local);
                self.backend = BackendKind::Local;
            }
            Err(e) => log::error!("Failed to record history entry: {}", e),
        }
    }

    /// Copy the current history into an uncompressed store.
    fn migrate(&self) -> LocalStore {
        let cursor = self.store.cursor().unwrap_or(0);
        match self.store.entries() {
            Ok(entries) => LocalStore::from_entries(entries, cursor, self.config.max_entries),
            Err(e) => {
                log::error!("Failed to migrate history, earlier entries dropped: {}", e);
                LocalStore::new(self.config.max_entries)
            }
        }
    }

    /// Step back. `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<String> {
        self.store.undo().unwrap_or_else(|e| {
            log::error!("Undo failed: {}", e);
            None
        })
    }

    /// Step forward. `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<String> {
        self.store.redo().unwrap_or_else(|e| {
            log::error!("Redo failed: {}", e);
            None
        })
    }

    pub fn can_undo(&self) -> bool {
        self.store.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.store.can_redo()
    }

    /// Snapshot under the cursor.
    pub fn current(&self) -> Option<String> {
        self.store.current().ok().flatten()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.store.cursor()
    }

    /// Bytes held by the active backend.
    pub fn memory_usage(&self) -> usize {
        self.store.compressed_bytes()
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> HistoryConfig {
        HistoryConfig {
            max_snapshot_bytes: 32,
            ..HistoryConfig::default()
        }
    }

    #[test]
    fn test_uninitialised_manager() {
        let mut manager = HistoryManager::default();
        assert_eq!(manager.undo(), None);
        assert_eq!(manager.redo(), None);
        assert!(!manager.can_undo());

        manager.push("first");
        assert!(manager.is_initialized());
        assert_eq!(manager.len(), 1);
        assert!(!manager.can_undo());
    }

    #[test]
    fn test_push_undo_redo() {
        let mut manager = HistoryManager::with_initial(HistoryConfig::default(), "s0");
        manager.push("s1");
        manager.push("s2");

        assert_eq!(manager.undo().as_deref(), Some("s1"));
        assert_eq!(manager.undo().as_deref(), Some("s0"));
        assert_eq!(manager.undo(), None);
        assert_eq!(manager.redo().as_deref(), Some("s1"));
        assert!(manager.can_redo());
        assert_eq!(manager.backend(), BackendKind::Compressed);
    }

    #[test]
    fn test_oversized_push_migrates_to_local() {
        let mut manager = HistoryManager::with_initial(small_config(), "s0");
        manager.push("s1");
        manager.undo();
        manager.redo();

        let large = "x".repeat(64);
        manager.push(&large);

        assert_eq!(manager.backend(), BackendKind::Local);
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.current().as_deref(), Some(large.as_str()));
        assert_eq!(manager.undo().as_deref(), Some("s1"));
        assert_eq!(manager.undo().as_deref(), Some("s0"));
    }

    #[test]
    fn test_migration_keeps_cursor_and_prunes_branch() {
        let mut manager = HistoryManager::with_initial(small_config(), "s0");
        manager.push("s1");
        manager.push("s2");
        manager.undo();

        manager.push(&"y".repeat(64));
        assert_eq!(manager.backend(), BackendKind::Local);
        assert_eq!(manager.len(), 3);
        assert!(!manager.can_redo());
        assert_eq!(manager.undo().as_deref(), Some("s1"));
    }

    #[test]
    fn test_local_mode_is_sticky() {
        let mut manager = HistoryManager::with_initial(small_config(), "s0");
        manager.push(&"x".repeat(64));
        manager.init("fresh");

        assert_eq!(manager.backend(), BackendKind::Local);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.current().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_oversized_seed_starts_local() {
        let manager = HistoryManager::with_initial(small_config(), &"z".repeat(64));
        assert_eq!(manager.backend(), BackendKind::Local);
        assert_eq!(manager.len(), 1);
    }
}
