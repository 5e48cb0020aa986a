//! Snap functionality for aligning a dragged rectangle to its siblings.
//!
//! [`SnapIndex`] holds the candidate rectangles for the current drag gesture
//! and answers nearest-edge queries. Each axis is resolved independently:
//! the moving rectangle's start, center and end edges are compared against
//! every candidate's start, center and end edges and the single closest pair
//! strictly closer than the threshold wins.

use serde::{Deserialize, Serialize};

/// Distance threshold for snapping (in document units).
pub const DEFAULT_SNAP_THRESHOLD: f64 = 5.0;

/// Axis-aligned bounds of an element in document coordinates.
///
/// This is the form the host sends over the boundary. Extra fields such as a
/// node id are ignored on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    /// Create a rect from its origin and size.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Translate the rect by a delta.
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

impl From<Rect> for kurbo::Rect {
    fn from(r: Rect) -> Self {
        kurbo::Rect::new(r.x, r.y, r.x + r.w, r.y + r.h)
    }
}

impl From<kurbo::Rect> for Rect {
    fn from(r: kurbo::Rect) -> Self {
        Rect::new(r.x0, r.y0, r.width(), r.height())
    }
}

/// Direction of an alignment line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// A line of constant y.
    Horizontal,
    /// A line of constant x.
    Vertical,
}

/// What a guide line represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideType {
    /// Edges or centerlines share a coordinate.
    Align,
    /// The dragged rect repeats the spacing of its neighbours.
    Gap,
}

/// An alignment line for the host to draw while dragging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub orientation: Orientation,
    /// Constant coordinate of the line (x for vertical, y for horizontal).
    pub pos: f64,
    /// Start of the covered span along the line.
    pub start: f64,
    /// End of the covered span along the line.
    pub end: f64,
    pub guide_type: GuideType,
}

/// Result of a snap query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapResult {
    /// X origin of the dragged rect, snapped if an x guide is present.
    pub x: f64,
    /// Y origin of the dragged rect, snapped if a y guide is present.
    pub y: f64,
    pub guides: Vec<Guide>,
}

impl SnapResult {
    /// Create a result with no snapping.
    pub fn none(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            guides: Vec::new(),
        }
    }

    /// Check if any snapping occurred.
    pub fn is_snapped(&self) -> bool {
        !self.guides.is_empty()
    }

    /// The guide with the given orientation, if that axis snapped.
    pub fn guide(&self, orientation: Orientation) -> Option<&Guide> {
        self.guides.iter().find(|g| g.orientation == orientation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn span(self, r: &kurbo::Rect) -> (f64, f64) {
        match self {
            Axis::X => (r.x0, r.x1),
            Axis::Y => (r.y0, r.y1),
        }
    }

    fn cross(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }

    /// Orientation of a line marking a coordinate on this axis.
    fn align_orientation(self) -> Orientation {
        match self {
            Axis::X => Orientation::Vertical,
            Axis::Y => Orientation::Horizontal,
        }
    }
}

/// Start, center and end of a span.
fn edges(lo: f64, hi: f64) -> [f64; 3] {
    [lo, (lo + hi) / 2.0, hi]
}

#[derive(Debug, Clone, Copy)]
enum MatchKind {
    Align { candidate: usize, pos: f64 },
    Gap { start: f64, end: f64 },
}

#[derive(Debug, Clone, Copy)]
struct AxisMatch {
    offset: f64,
    distance: f64,
    kind: MatchKind,
}

impl AxisMatch {
    fn improves(distance: f64, threshold: f64, best: &Option<AxisMatch>) -> bool {
        distance < threshold && best.is_none_or(|b| distance < b.distance)
    }
}

/// Retained set of candidate rectangles for one drag gesture.
#[derive(Debug, Clone, Default)]
pub struct SnapIndex {
    rects: Vec<kurbo::Rect>,
    x_edges: Vec<[f64; 3]>,
    y_edges: Vec<[f64; 3]>,
    gap_snapping: bool,
}

impl SnapIndex {
    /// Create an empty index. Queries pass through until rects are synced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with equal-gap snapping enabled or disabled.
    pub fn with_gap_snapping(enabled: bool) -> Self {
        Self {
            gap_snapping: enabled,
            ..Self::default()
        }
    }

    /// Whether equal-gap snapping is enabled.
    pub fn gap_snapping(&self) -> bool {
        self.gap_snapping
    }

    /// Enable or disable equal-gap snapping.
    pub fn set_gap_snapping(&mut self, enabled: bool) {
        self.gap_snapping = enabled;
    }

    /// Replace all candidates. An empty list disables snapping.
    pub fn replace_rects(&mut self, rects: &[Rect]) {
        self.rects.clear();
        self.x_edges.clear();
        self.y_edges.clear();
        self.rects.reserve(rects.len());
        self.x_edges.reserve(rects.len());
        self.y_edges.reserve(rects.len());

        for rect in rects {
            let r: kurbo::Rect = (*rect).into();
            self.x_edges.push(edges(r.x0, r.x1));
            self.y_edges.push(edges(r.y0, r.y1));
            self.rects.push(r);
        }
    }

    /// Number of candidate rects.
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// Check if there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Candidate rects in insertion order.
    pub fn rects(&self) -> impl Iterator<Item = Rect> + '_ {
        self.rects.iter().map(|r| Rect::from(*r))
    }

    /// Snap `target` moved by `(delta_x, delta_y)` against the candidates.
    ///
    /// `target` is the dragged rect before the delta is applied. Callers that
    /// already hold the displaced rect pass a zero delta. Returns the moved
    /// origin unchanged on any axis without a candidate edge within
    /// `threshold`.
    pub fn query(&self, target: Rect, delta_x: f64, delta_y: f64, threshold: f64) -> SnapResult {
        let moved = target.translate(delta_x, delta_y);

        if self.rects.is_empty()
            || !moved.is_finite()
            || !threshold.is_finite()
            || threshold < 0.0
        {
            return SnapResult::none(moved.x, moved.y);
        }

        let bounds: kurbo::Rect = moved.into();
        let x_match = self.best_match(Axis::X, &bounds, threshold);
        let y_match = self.best_match(Axis::Y, &bounds, threshold);

        let dx = x_match.map_or(0.0, |m| m.offset);
        let dy = y_match.map_or(0.0, |m| m.offset);
        let placed = bounds + kurbo::Vec2::new(dx, dy);

        let mut result = SnapResult::none(placed.x0, placed.y0);
        if let Some(m) = x_match {
            result.guides.push(self.guide(Axis::X, m, &placed));
        }
        if let Some(m) = y_match {
            result.guides.push(self.guide(Axis::Y, m, &placed));
        }

        log::trace!(
            "snap query ({}, {}) -> ({}, {}) with {} guides",
            moved.x,
            moved.y,
            result.x,
            result.y,
            result.guides.len()
        );
        result
    }

    fn best_match(&self, axis: Axis, moving: &kurbo::Rect, threshold: f64) -> Option<AxisMatch> {
        let align = self.align_match(axis, moving, threshold);
        if !self.gap_snapping {
            return align;
        }
        match (align, self.gap_match(axis, moving, threshold)) {
            (Some(a), Some(g)) if g.distance < a.distance => Some(g),
            (None, gap) => gap,
            (align, _) => align,
        }
    }

    fn align_match(&self, axis: Axis, moving: &kurbo::Rect, threshold: f64) -> Option<AxisMatch> {
        let (lo, hi) = axis.span(moving);
        let moving_edges = edges(lo, hi);
        let candidates = match axis {
            Axis::X => &self.x_edges,
            Axis::Y => &self.y_edges,
        };

        let mut best: Option<AxisMatch> = None;
        for (candidate, candidate_edges) in candidates.iter().enumerate() {
            for t in moving_edges {
                for s in *candidate_edges {
                    let distance = (s - t).abs();
                    if AxisMatch::improves(distance, threshold, &best) {
                        best = Some(AxisMatch {
                            offset: s - t,
                            distance,
                            kind: MatchKind::Align { candidate, pos: s },
                        });
                    }
                }
            }
        }
        best
    }

    /// Positions that repeat the spacing of neighbouring candidates.
    ///
    /// Only candidates overlapping the moving rect on the cross axis form a
    /// row. The first pair's gap may be repeated before the row, the last
    /// pair's gap after it, and the moving rect may be centred inside any gap
    /// wide enough to hold it.
    fn gap_match(&self, axis: Axis, moving: &kurbo::Rect, threshold: f64) -> Option<AxisMatch> {
        let cross = axis.cross();
        let (cross_lo, cross_hi) = cross.span(moving);
        let mut row: Vec<(f64, f64)> = self
            .rects
            .iter()
            .filter(|r| {
                let (lo, hi) = cross.span(r);
                lo < cross_hi && hi > cross_lo
            })
            .map(|r| axis.span(r))
            .collect();
        if row.len() < 2 {
            return None;
        }
        row.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (lo, hi) = axis.span(moving);
        let size = hi - lo;
        let mut best: Option<AxisMatch> = None;
        let mut consider = |new_lo: f64, start: f64, end: f64| {
            let distance = (new_lo - lo).abs();
            if AxisMatch::improves(distance, threshold, &best) {
                best = Some(AxisMatch {
                    offset: new_lo - lo,
                    distance,
                    kind: MatchKind::Gap { start, end },
                });
            }
        };

        let last = row.len() - 2;
        for (i, pair) in row.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let gap = b.0 - a.1;
            if gap <= 0.0 {
                continue;
            }
            if i == 0 {
                consider(a.0 - gap - size, a.0 - gap, a.0);
            }
            if i == last {
                consider(b.1 + gap, b.1, b.1 + gap);
            }
            let inner = gap - size;
            if inner > 0.0 {
                let half = inner / 2.0;
                consider(a.1 + half, a.1, a.1 + half);
            }
        }
        best
    }

    fn guide(&self, axis: Axis, m: AxisMatch, placed: &kurbo::Rect) -> Guide {
        let cross = axis.cross();
        let (cross_lo, cross_hi) = cross.span(placed);
        match m.kind {
            MatchKind::Align { candidate, pos } => {
                let (other_lo, other_hi) = cross.span(&self.rects[candidate]);
                Guide {
                    orientation: axis.align_orientation(),
                    pos,
                    start: cross_lo.min(other_lo),
                    end: cross_hi.max(other_hi),
                    guide_type: GuideType::Align,
                }
            }
            MatchKind::Gap { start, end } => Guide {
                orientation: cross.align_orientation(),
                pos: (cross_lo + cross_hi) / 2.0,
                start,
                end,
                guide_type: GuideType::Gap,
            },
        }
    }
}
