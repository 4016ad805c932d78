//! Uniform noise aggregation grid over the map rectangle.

use crate::baseline::BaselineCell;
use crate::error::{Result, SimError};
use crate::models::{Coordinate, MapBoundaries};
use crate::spatial::{polygon_intersects_rect, Rect};
use serde::{Deserialize, Serialize};

/// Row/column address of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: u32,
    pub col: u32,
}

/// The aggregation grid: dimensions, valid-cell mask and baseline levels.
///
/// Per-cell values are stored densely at `row * cols + col`.
#[derive(Debug, Clone)]
pub struct NoiseGrid {
    boundaries: MapBoundaries,
    cell_size_m: f64,
    rows: u32,
    cols: u32,
    valid: Vec<bool>,
    valid_indices: Vec<u32>,
    baseline_db: Vec<f64>,
}

impl NoiseGrid {
    /// Grid of `floor(height / size)` rows by `floor(width / size)` columns,
    /// every cell valid and at 0 dB baseline.
    pub fn new(boundaries: MapBoundaries, cell_size_m: f64) -> Result<Self> {
        let errors = boundaries.validate();
        if !errors.is_empty() {
            return Err(SimError::invalid_config(errors.join("; ")));
        }
        if !(cell_size_m > 0.0) {
            return Err(SimError::invalid_config(format!(
                "noise cell size must be positive, got {cell_size_m}"
            )));
        }

        let rows = (boundaries.height_m() / cell_size_m).floor() as u32;
        let cols = (boundaries.width_m() / cell_size_m).floor() as u32;
        let total = rows as usize * cols as usize;

        Ok(Self {
            boundaries,
            cell_size_m,
            rows,
            cols,
            valid: vec![true; total],
            valid_indices: (0..total as u32).collect(),
            baseline_db: vec![0.0; total],
        })
    }

    /// Restrict the valid cells to those whose square intersects `polygon`.
    pub fn with_boundary_polygon(mut self, polygon: &[Coordinate]) -> Self {
        let ring: Vec<(f64, f64)> = polygon.iter().map(|p| (p.easting, p.northing)).collect();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let idx = self.index(row, col);
                self.valid[idx] = polygon_intersects_rect(&ring, &self.cell_rect(row, col));
            }
        }
        self.rebuild_valid_indices();
        tracing::debug!(
            valid = self.valid_indices.len(),
            total = self.valid.len(),
            "applied boundary polygon to noise grid"
        );
        self
    }

    /// Load baseline levels. Only cells the baseline covers stay valid, so
    /// every aggregated cell has a real baseline to join against. Entries
    /// outside the grid or with a non-finite level are skipped.
    pub fn with_baseline(mut self, cells: &[BaselineCell]) -> Self {
        let mut covered = vec![false; self.valid.len()];
        let mut outside = 0usize;
        let mut non_finite = 0usize;
        for cell in cells {
            if cell.row >= self.rows || cell.col >= self.cols {
                outside += 1;
                continue;
            }
            if !cell.noise_level.is_finite() {
                non_finite += 1;
                continue;
            }
            let idx = self.index(cell.row, cell.col);
            self.baseline_db[idx] = cell.noise_level;
            covered[idx] = true;
        }
        if outside > 0 {
            tracing::warn!(skipped = outside, "baseline cells outside the noise grid were skipped");
        }
        if non_finite > 0 {
            tracing::warn!(skipped = non_finite, "baseline cells with a non-finite noise level were skipped");
        }

        for (valid, covered) in self.valid.iter_mut().zip(&covered) {
            *valid &= *covered;
        }
        self.rebuild_valid_indices();
        tracing::debug!(
            valid = self.valid_indices.len(),
            total = self.valid.len(),
            "applied baseline to noise grid"
        );
        self
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    pub fn boundaries(&self) -> &MapBoundaries {
        &self.boundaries
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    #[inline(always)]
    pub fn index(&self, row: u32, col: u32) -> usize {
        row as usize * self.cols as usize + col as usize
    }

    pub fn cell_at(&self, idx: usize) -> CellIndex {
        CellIndex {
            row: (idx / self.cols as usize) as u32,
            col: (idx % self.cols as usize) as u32,
        }
    }

    /// Centroid of cell `(row, col)`.
    pub fn centroid(&self, row: u32, col: u32) -> Coordinate {
        Coordinate::new(
            self.boundaries.bottom + (row as f64 + 0.5) * self.cell_size_m,
            self.boundaries.left + (col as f64 + 0.5) * self.cell_size_m,
        )
    }

    /// Cell containing `point`, if it lies on the grid.
    pub fn locate(&self, point: &Coordinate) -> Option<CellIndex> {
        let row = ((point.northing - self.boundaries.bottom) / self.cell_size_m).floor();
        let col = ((point.easting - self.boundaries.left) / self.cell_size_m).floor();
        if row < 0.0 || col < 0.0 || row >= self.rows as f64 || col >= self.cols as f64 {
            return None;
        }
        Some(CellIndex {
            row: row as u32,
            col: col as u32,
        })
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid.get(idx).copied().unwrap_or(false)
    }

    /// Dense indices of the cells that take part in aggregation.
    pub fn valid_indices(&self) -> &[u32] {
        &self.valid_indices
    }

    pub fn baseline_db(&self, idx: usize) -> f64 {
        self.baseline_db[idx]
    }

    fn rebuild_valid_indices(&mut self) {
        self.valid_indices = self
            .valid
            .iter()
            .enumerate()
            .filter(|(_, valid)| **valid)
            .map(|(idx, _)| idx as u32)
            .collect();
    }

    fn cell_rect(&self, row: u32, col: u32) -> Rect {
        let min_x = self.boundaries.left + col as f64 * self.cell_size_m;
        let min_y = self.boundaries.bottom + row as f64 * self.cell_size_m;
        Rect {
            min_x,
            min_y,
            max_x: min_x + self.cell_size_m,
            max_y: min_y + self.cell_size_m,
        }
    }
}
