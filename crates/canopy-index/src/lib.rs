//! Spatial indexing abstractions for tree neighborhood queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

/// Neighbor handle paired with its squared distance from the query point.
pub type Neighbor = (usize, OrderedFloat<f32>);

/// Inline storage for small K-nearest result sets.
pub type NearestSet = SmallVec<[Neighbor; 4]>;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from point positions.
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError>;

    /// Visit neighbors of `idx` within the provided squared radius (excluding `idx` itself).
    fn neighbors_within(
        &self,
        idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );

    /// Up to `k` nearest neighbors of `idx` closer than `max_distance`, nearest first.
    fn nearest(&self, idx: usize, k: usize, max_distance: f32) -> NearestSet {
        let mut found = NearestSet::new();
        if k == 0 || max_distance <= 0.0 {
            return found;
        }
        let radius_sq = max_distance * max_distance;
        self.neighbors_within(idx, radius_sq, &mut |other, dist_sq| {
            if dist_sq.0 < radius_sq {
                found.push((other, dist_sq));
            }
        });
        found.sort_unstable_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        found.truncate(k);
        found
    }
}

/// Uniform bucket grid over a rectangular plot.
///
/// Points outside the plot are clamped into the border cells so they remain
/// queryable until the caller prunes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing points.
    pub cell_size: f32,
    /// Plot width covered by the grid.
    pub width: f32,
    /// Plot height covered by the grid.
    pub height: f32,
    #[serde(skip)]
    cols: usize,
    #[serde(skip)]
    rows: usize,
    #[serde(skip)]
    cell_starts: Vec<usize>,
    #[serde(skip)]
    entries: Vec<usize>,
    #[serde(skip)]
    positions: Vec<(f32, f32)>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size and plot extent.
    #[must_use]
    pub fn new(cell_size: f32, width: f32, height: f32) -> Self {
        Self {
            cell_size,
            width,
            height,
            cols: 0,
            rows: 0,
            cell_starts: Vec::new(),
            entries: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` when no points are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position recorded for `idx` at the last rebuild.
    #[must_use]
    pub fn position(&self, idx: usize) -> Option<(f32, f32)> {
        self.positions.get(idx).copied()
    }

    fn col_of(&self, x: f32) -> usize {
        let col = (x / self.cell_size).floor();
        if col.is_nan() || col < 0.0 {
            0
        } else {
            (col as usize).min(self.cols.saturating_sub(1))
        }
    }

    fn row_of(&self, y: f32) -> usize {
        let row = (y / self.cell_size).floor();
        if row.is_nan() || row < 0.0 {
            0
        } else {
            (row as usize).min(self.rows.saturating_sub(1))
        }
    }

    fn bucket(&self, col: usize, row: usize) -> &[usize] {
        let cell = row * self.cols + col;
        &self.entries[self.cell_starts[cell]..self.cell_starts[cell + 1]]
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(50.0, 612.0, 176.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        if !(self.width.is_finite() && self.width > 0.0)
            || !(self.height.is_finite() && self.height > 0.0)
        {
            return Err(IndexError::InvalidConfig("grid extent must be positive"));
        }
        self.cols = ((self.width / self.cell_size).ceil() as usize).max(1);
        self.rows = ((self.height / self.cell_size).ceil() as usize).max(1);
        self.positions.clear();
        self.positions.extend_from_slice(positions);

        // Counting sort into a compressed bucket layout.
        let cell_count = self.cols * self.rows;
        self.cell_starts.clear();
        self.cell_starts.resize(cell_count + 1, 0);
        let cells: Vec<usize> = positions
            .iter()
            .map(|&(x, y)| self.row_of(y) * self.cols + self.col_of(x))
            .collect();
        for &cell in &cells {
            self.cell_starts[cell + 1] += 1;
        }
        for cell in 0..cell_count {
            self.cell_starts[cell + 1] += self.cell_starts[cell];
        }
        let mut cursor = self.cell_starts.clone();
        self.entries.clear();
        self.entries.resize(positions.len(), 0);
        for (idx, &cell) in cells.iter().enumerate() {
            self.entries[cursor[cell]] = idx;
            cursor[cell] += 1;
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        let Some((x, y)) = self.position(idx) else {
            return;
        };
        if !(radius_sq > 0.0) || self.cols == 0 || self.rows == 0 {
            return;
        }
        let radius = radius_sq.sqrt();
        let (col_lo, col_hi) = (self.col_of(x - radius), self.col_of(x + radius));
        let (row_lo, row_hi) = (self.row_of(y - radius), self.row_of(y + radius));
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                for &other in self.bucket(col, row) {
                    if other == idx {
                        continue;
                    }
                    let (ox, oy) = self.positions[other];
                    let dx = ox - x;
                    let dy = oy - y;
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq <= radius_sq {
                        visitor(other, OrderedFloat(dist_sq));
                    }
                }
            }
        }
    }
}
