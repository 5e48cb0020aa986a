//! Undo/redo history of whole-document snapshots.
//!
//! A [`HistoryStore`] is a linear stack with a cursor. Two backends implement
//! it: [`CompressedStore`] keeps zlib-compressed entries under a size ceiling,
//! and [`LocalStore`] keeps plain strings and accepts anything. The
//! [`HistoryManager`] starts on the compressed backend and falls back to the
//! local one when a snapshot is too large.

mod compressed;
mod document;
mod local;
mod manager;

pub use compressed::CompressedStore;
pub use document::{DocumentSnapshot, VectraNode};
pub use local::LocalStore;
pub use manager::{BackendKind, HistoryManager};

use std::collections::VecDeque;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of entries kept before the oldest is evicted.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Default ceiling on the uncompressed size of one snapshot.
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 1 << 20;

/// History errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Snapshot of {size} bytes exceeds the {limit} byte limit")]
    SizeExceeded { size: usize, limit: usize },
    #[error("Codec error: {0}")]
    Codec(#[from] io::Error),
    #[error("History engine unavailable")]
    EngineUnavailable,
}

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// History configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of entries, the current one included.
    pub max_entries: usize,
    /// Largest snapshot the compressed backend accepts, in bytes.
    pub max_snapshot_bytes: usize,
    /// zlib level, 0 (store) to 9 (smallest).
    pub compression_level: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_HISTORY,
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
            compression_level: 1,
        }
    }
}

/// A linear undo stack of document snapshots.
///
/// `undo` and `redo` return `Ok(None)` at the ends of the stack.
pub trait HistoryStore: Send {
    /// Append a snapshot after the cursor, discarding any redo branch.
    fn push(&mut self, snapshot: &str) -> HistoryResult<()>;

    /// Step back and return the snapshot now under the cursor.
    fn undo(&mut self) -> HistoryResult<Option<String>>;

    /// Step forward and return the snapshot now under the cursor.
    fn redo(&mut self) -> HistoryResult<Option<String>>;

    fn can_undo(&self) -> bool;

    fn can_redo(&self) -> bool;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor position, `None` when empty.
    fn cursor(&self) -> Option<usize>;

    /// Snapshot under the cursor.
    fn current(&self) -> HistoryResult<Option<String>>;

    /// Drop everything and start again from a single entry.
    fn clear_to(&mut self, seed: &str) -> HistoryResult<()>;

    /// Every entry, oldest first.
    fn entries(&self) -> HistoryResult<Vec<String>>;

    /// Bytes held by the stored entries.
    fn compressed_bytes(&self) -> usize;
}

/// Cursor bookkeeping shared by both backends.
#[derive(Debug, Clone)]
struct Timeline<T> {
    entries: VecDeque<T>,
    cursor: usize,
    capacity: usize,
}

impl<T> Timeline<T> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from existing entries, keeping the newest `capacity` of them.
    fn from_entries(entries: impl IntoIterator<Item = T>, cursor: usize, capacity: usize) -> Self {
        let mut timeline = Self::new(capacity);
        timeline.entries.extend(entries);
        let mut cursor = cursor.min(timeline.entries.len().saturating_sub(1));
        while timeline.entries.len() > timeline.capacity {
            timeline.entries.pop_front();
            cursor = cursor.saturating_sub(1);
        }
        timeline.cursor = cursor;
        timeline
    }

    fn push(&mut self, entry: T) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    fn reset(&mut self, entry: T) {
        self.entries.clear();
        self.entries.push_back(entry);
        self.cursor = 0;
    }

    fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Entry an undo would land on.
    fn behind(&self) -> Option<&T> {
        if self.can_undo() {
            self.entries.get(self.cursor - 1)
        } else {
            None
        }
    }

    /// Entry a redo would land on.
    fn ahead(&self) -> Option<&T> {
        if self.can_redo() {
            self.entries.get(self.cursor + 1)
        } else {
            None
        }
    }

    fn step_back(&mut self) {
        if self.can_undo() {
            self.cursor -= 1;
        }
    }

    fn step_forward(&mut self) {
        if self.can_redo() {
            self.cursor += 1;
        }
    }

    fn current(&self) -> Option<&T> {
        self.entries.get(self.cursor)
    }

    fn cursor(&self) -> Option<usize> {
        (!self.entries.is_empty()).then_some(self.cursor)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}
