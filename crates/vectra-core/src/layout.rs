//! Layout engine: the host-facing wrapper around [`SnapIndex`].
//!
//! A drag gesture syncs the sibling bounds once and then queries every frame.

use crate::snap::{DEFAULT_SNAP_THRESHOLD, Rect, SnapIndex, SnapResult};
use serde::{Deserialize, Serialize};

/// Snapping configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Threshold used when the host does not pass one.
    pub default_threshold: f64,
    /// Snap to the spacing of neighbouring siblings as well as their edges.
    pub gap_snapping: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_SNAP_THRESHOLD,
            gap_snapping: false,
        }
    }
}

/// Retained-mode snapping for one document view.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    index: SnapIndex,
    config: SnapConfig,
}

impl LayoutEngine {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with the given configuration.
    pub fn with_config(config: SnapConfig) -> Self {
        Self {
            index: SnapIndex::with_gap_snapping(config.gap_snapping),
            config,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    /// Replace the configuration. Synced candidates are kept.
    pub fn set_config(&mut self, config: SnapConfig) {
        self.index.set_gap_snapping(config.gap_snapping);
        self.config = config;
    }

    /// Replace the candidate rects at the start of a gesture.
    pub fn sync(&mut self, rects: &[Rect]) {
        self.index.replace_rects(rects);
        log::debug!("Synced {} snap candidates", rects.len());
    }

    /// Drop all candidates at the end of a gesture.
    pub fn clear(&mut self) {
        self.index.replace_rects(&[]);
    }

    /// Number of synced candidates.
    pub fn candidate_count(&self) -> usize {
        self.index.len()
    }

    /// Snap the dragged rect at its current (already displaced) position.
    ///
    /// `threshold` falls back to [`SnapConfig::default_threshold`].
    pub fn query(&self, x: f64, y: f64, w: f64, h: f64, threshold: Option<f64>) -> SnapResult {
        let threshold = threshold.unwrap_or(self.config.default_threshold);
        self.index.query(Rect::new(x, y, w, h), 0.0, 0.0, threshold)
    }
}
