//! zlib-compressed snapshot store.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::{HistoryConfig, HistoryError, HistoryResult, HistoryStore, Timeline};

/// One compressed snapshot.
#[derive(Debug, Clone)]
struct Entry {
    bytes: Box<[u8]>,
    /// Uncompressed length, used to size the output buffer.
    len: usize,
}

/// History backend holding zlib-compressed snapshots under a size ceiling.
#[derive(Debug, Clone)]
pub struct CompressedStore {
    timeline: Timeline<Entry>,
    max_snapshot_bytes: usize,
    level: Compression,
}

impl Default for CompressedStore {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl CompressedStore {
    /// Create an empty store.
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            timeline: Timeline::new(config.max_entries),
            max_snapshot_bytes: config.max_snapshot_bytes,
            level: Compression::new(config.compression_level.min(9)),
        }
    }

    /// Create a store seeded with one snapshot.
    pub fn with_seed(config: HistoryConfig, seed: &str) -> HistoryResult<Self> {
        let mut store = Self::new(config);
        store.clear_to(seed)?;
        Ok(store)
    }

    fn encode(&self, snapshot: &str) -> HistoryResult<Entry> {
        if snapshot.len() > self.max_snapshot_bytes {
            return Err(HistoryError::SizeExceeded {
                size: snapshot.len(),
                limit: self.max_snapshot_bytes,
            });
        }
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(snapshot.len() / 4), self.level);
        encoder.write_all(snapshot.as_bytes())?;
        let bytes = encoder.finish()?;
        Ok(Entry {
            bytes: bytes.into_boxed_slice(),
            len: snapshot.len(),
        })
    }

    fn decode(entry: &Entry) -> HistoryResult<String> {
        let mut out = String::with_capacity(entry.len);
        ZlibDecoder::new(&entry.bytes[..])
            .read_to_string(&mut out)
            .inspect_err(|e| log::error!("Failed to decompress history entry: {}", e))?;
        Ok(out)
    }
}

impl HistoryStore for CompressedStore {
    fn push(&mut self, snapshot: &str) -> HistoryResult<()> {
        let entry = self.encode(snapshot)?;
        log::debug!(
            "History push: {} bytes compressed to {}",
            entry.len,
            entry.bytes.len()
        );
        self.timeline.push(entry);
        Ok(())
    }

    fn undo(&mut self) -> HistoryResult<Option<String>> {
        let Some(entry) = self.timeline.behind() else {
            return Ok(None);
        };
        let snapshot = Self::decode(entry)?;
        self.timeline.step_back();
        Ok(Some(snapshot))
    }

    fn redo(&mut self) -> HistoryResult<Option<String>> {
        let Some(entry) = self.timeline.ahead() else {
            return Ok(None);
        };
        let snapshot = Self::decode(entry)?;
        self.timeline.step_forward();
        Ok(Some(snapshot))
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
        self.timeline.current().map(Self::decode).transpose()
    }

    fn clear_to(&mut self, seed: &str) -> HistoryResult<()> {
        let entry = self.encode(seed)?;
        self.timeline.reset(entry);
        Ok(())
    }

    fn entries(&self) -> HistoryResult<Vec<String>> {
        self.timeline.iter().map(Self::decode).collect()
    }

    fn compressed_bytes(&self) -> usize {
        self.timeline.iter().map(|e| e.bytes.len()).sum()
    }
}
