//! Per-tick capture of airborne drones and the end-of-run noise field.
//!
//! During the run only positions and altitudes are recorded. [`NoiseMonitor::finish`]
//! then replays every snapshot against every valid grid cell in parallel:
//! each cell accumulates the decibel sum of all drones in each snapshot into
//! a running total and maximum.

use crate::acoustics::{db_add, db_to_intensity, intensity_to_db, received_level};
use crate::drone::Drone;
use crate::error::Result;
use crate::grid::NoiseGrid;
use crate::models::Coordinate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct NoiseMonitor {
    drone_noise_db: f64,
    positions: Vec<Vec<Coordinate>>,
    altitudes: Vec<Vec<f64>>,
}

impl NoiseMonitor {
    pub fn new(drone_noise_db: f64) -> Self {
        Self {
            drone_noise_db,
            positions: Vec::new(),
            altitudes: Vec::new(),
        }
    }

    /// Record the position and altitude of every drone in `drones`.
    pub fn capture<'a>(&mut self, drones: impl IntoIterator<Item = &'a Drone>) {
        let (positions, altitudes): (Vec<_>, Vec<_>) = drones
            .into_iter()
            .map(|drone| (drone.location(), drone.altitude()))
            .unzip();
        self.capture_points(positions, altitudes);
    }

    /// Record one snapshot from parallel position and altitude lists.
    pub fn capture_points(&mut self, positions: Vec<Coordinate>, altitudes: Vec<f64>) {
        debug_assert_eq!(positions.len(), altitudes.len());
        self.positions.push(positions);
        self.altitudes.push(altitudes);
    }

    pub fn snapshots(&self) -> usize {
        self.positions.len()
    }

    /// Airborne drone count of snapshot `iteration`.
    pub fn snapshot_len(&self, iteration: usize) -> usize {
        self.positions.get(iteration).map_or(0, Vec::len)
    }

    /// Aggregate all snapshots over the valid cells of `grid`. Averages are
    /// taken over `iterations` ticks; zero ticks yield zero averages.
    pub fn finish(&self, grid: &NoiseGrid, iterations: u64) -> NoiseField {
        let source_db = self.drone_noise_db;
        let per_cell: Vec<(f64, f64)> = grid
            .valid_indices()
            .par_iter()
            .map(|&idx| {
                let cell = grid.cell_at(idx as usize);
                let centroid = grid.centroid(cell.row, cell.col);
                let mut total = 0.0;
                let mut max = 0.0f64;
                for (positions, altitudes) in self.positions.iter().zip(&self.altitudes) {
                    let level = snapshot_level(source_db, &centroid, positions, altitudes);
                    total += level;
                    max = max.max(level);
                }
                (total, max)
            })
            .collect();

        let mut total_noise = vec![0.0; grid.len()];
        let mut max_noise = vec![0.0; grid.len()];
        for (&idx, (total, max)) in grid.valid_indices().iter().zip(per_cell) {
            total_noise[idx as usize] = total;
            max_noise[idx as usize] = max;
        }
        NoiseField {
            total_noise,
            max_noise,
            iterations,
        }
    }
}

/// Decibel sum at `receiver` of every drone in one snapshot; 0 when empty.
#[inline]
pub fn snapshot_level(source_db: f64, receiver: &Coordinate, positions: &[Coordinate], altitudes: &[f64]) -> f64 {
    if positions.is_empty() {
        return 0.0;
    }
    let intensity: f64 = positions
        .iter()
        .zip(altitudes)
        .map(|(position, altitude)| {
            db_to_intensity(received_level(source_db, receiver.distance_sq(position), *altitude))
        })
        .sum();
    intensity_to_db(intensity)
}

/// Dense per-cell drone noise totals and maxima, indexed `row * cols + col`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseField {
    pub total_noise: Vec<f64>,
    pub max_noise: Vec<f64>,
    pub iterations: u64,
}

impl NoiseField {
    pub fn average(&self, idx: usize) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        self.total_noise[idx] / self.iterations as f64
    }

    /// Join with the baseline: one row per valid cell.
    pub fn impact(&self, grid: &NoiseGrid) -> NoiseImpact {
        let rows = grid
            .valid_indices()
            .iter()
            .map(|&idx| {
                let idx = idx as usize;
                let cell = grid.cell_at(idx);
                let noise_level = grid.baseline_db(idx);
                let average_noise = self.average(idx);
                let combined_noise = db_add(noise_level, average_noise);
                NoiseImpactRow {
                    row: cell.row,
                    col: cell.col,
                    centroid: grid.centroid(cell.row, cell.col),
                    noise_level,
                    average_noise,
                    max_noise: self.max_noise[idx],
                    combined_noise,
                    noise_difference: combined_noise - noise_level,
                }
            })
            .collect();
        NoiseImpact { rows }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseImpactRow {
    pub row: u32,
    pub col: u32,
    pub centroid: Coordinate,
    /// Baseline, dB
    pub noise_level: f64,
    pub average_noise: f64,
    pub max_noise: f64,
    pub combined_noise: f64,
    /// `combined_noise - noise_level`
    pub noise_difference: f64,
}

/// Final per-cell table of baseline, drone and combined levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoiseImpact {
    pub rows: Vec<NoiseImpactRow>,
}

impl NoiseImpact {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&NoiseImpactRow> {
        self.rows.iter().find(|r| r.row == row && r.col == col)
    }

    /// Mean `noise_difference` over all rows; 0 for an empty table.
    pub fn avg_noise_diff(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r.noise_difference).sum::<f64>() / self.rows.len() as f64
    }

    /// Write the table as CSV, with cell centroids when `with_centroids`.
    pub fn write_csv(&self, path: &Path, with_centroids: bool) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec!["row", "col"];
        if with_centroids {
            header.extend(["northing", "easting"]);
        }
        header.extend([
            "noise_level",
            "average_noise",
            "max_noise",
            "combined_noise",
            "noise_difference",
        ]);
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.row.to_string(), row.col.to_string()];
            if with_centroids {
                record.push(row.centroid.northing.to_string());
                record.push(row.centroid.easting.to_string());
            }
            record.extend(
                [
                    row.noise_level,
                    row.average_noise,
                    row.max_noise,
                    row.combined_noise,
                    row.noise_difference,
                ]
                .iter()
                .map(f64::to_string),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MapBoundaries;
    use proptest::prelude::*;

    /// 3x3 grid of 500 m cells whose middle cell is centred on the origin.
    fn grid() -> NoiseGrid {
        NoiseGrid::new(
            MapBoundaries {
                left: -750.0,
                right: 750.0,
                top: 750.0,
                bottom: -750.0,
            },
            500.0,
        )
        .unwrap()
    }

    #[test]
    fn test_hovering_drone() {
        let grid = grid();
        let mut monitor = NoiseMonitor::new(90.0);
        for _ in 0..2 {
            monitor.capture_points(vec![Coordinate::new(0.0, 0.0)], vec![100.0]);
        }
        let field = monitor.finish(&grid, 2);
        let centre = grid.index(1, 1);
        assert!((field.total_noise[centre] - 100.0).abs() < 1e-9);
        assert!((field.max_noise[centre] - 50.0).abs() < 1e-9);
        assert!((field.average(centre) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_drones_sum_in_decibels() {
        let grid = grid();
        let mut monitor = NoiseMonitor::new(90.0);
        monitor.capture_points(
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.0)],
            vec![100.0, 100.0],
        );
        let field = monitor.finish(&grid, 1);
        let centre = grid.index(1, 1);
        assert!((field.total_noise[centre] - 53.010_299_956_639_81).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshots_and_zero_iterations() {
        let grid = grid();
        let mut monitor = NoiseMonitor::new(90.0);
        monitor.capture_points(Vec::new(), Vec::new());
        let field = monitor.finish(&grid, 1);
        assert!(field.total_noise.iter().all(|t| *t == 0.0));

        let field = NoiseMonitor::new(90.0).finish(&grid, 0);
        assert_eq!(field.average(0), 0.0);
    }

    #[test]
    fn test_impact_rows_cover_valid_cells() {
        let grid = grid().with_boundary_polygon(&[
            Coordinate::new(-100.0, -100.0),
            Coordinate::new(-100.0, 100.0),
            Coordinate::new(100.0, 100.0),
            Coordinate::new(100.0, -100.0),
        ]);
        let mut monitor = NoiseMonitor::new(90.0);
        monitor.capture_points(vec![Coordinate::new(0.0, 0.0)], vec![100.0]);
        let impact = monitor.finish(&grid, 1).impact(&grid);
        assert_eq!(impact.len(), grid.valid_indices().len());
        let centre = impact.get(1, 1).unwrap();
        // 0 dB baseline: combined is the drone level plus 10·log10(1 + 10^-5)
        assert!((centre.combined_noise - db_add(0.0, 50.0)).abs() < 1e-12);
        assert!(centre.noise_difference > 0.0);
    }

    #[test]
    fn test_write_csv_with_centroids() {
        let dir = crate::persist::test_dir("impact_csv");
        let grid = grid();
        let mut monitor = NoiseMonitor::new(90.0);
        monitor.capture_points(vec![Coordinate::new(0.0, 0.0)], vec![100.0]);
        let impact = monitor.finish(&grid, 1).impact(&grid);

        let path = dir.join("impact.csv");
        impact.write_csv(&path, true).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("row,col,northing,easting,noise_level,average_noise,max_noise,combined_noise,noise_difference")
        );
        assert_eq!(lines.count(), 9);
        let _ = std::fs::remove_dir_all(&dir);
    }

    proptest! {
        #[test]
        fn test_max_is_at_least_average(
            snaps in prop::collection::vec(
                prop::collection::vec((-800.0f64..800.0, -800.0f64..800.0, 1.0f64..200.0), 0..4),
                1..6,
            )
        ) {
            let grid = grid();
            let mut monitor = NoiseMonitor::new(90.0);
            for snap in &snaps {
                let positions = snap.iter().map(|(n, e, _)| Coordinate::new(*n, *e)).collect();
                let altitudes = snap.iter().map(|(_, _, z)| *z).collect();
                monitor.capture_points(positions, altitudes);
            }
            let field = monitor.finish(&grid, snaps.len() as u64);
            for idx in 0..grid.len() {
                prop_assert!(field.max_noise[idx] + 1e-9 >= field.average(idx));
            }
        }

        #[test]
        fn test_drone_order_does_not_matter(
            drones in prop::collection::vec((-800.0f64..800.0, -800.0f64..800.0, 1.0f64..200.0), 1..8)
        ) {
            let receiver = Coordinate::new(0.0, 0.0);
            let positions: Vec<_> = drones.iter().map(|(n, e, _)| Coordinate::new(*n, *e)).collect();
            let altitudes: Vec<_> = drones.iter().map(|(_, _, z)| *z).collect();
            let forward = snapshot_level(90.0, &receiver, &positions, &altitudes);

            let mut rev_positions = positions.clone();
            let mut rev_altitudes = altitudes.clone();
            rev_positions.reverse();
            rev_altitudes.reverse();
            let backward = snapshot_level(90.0, &receiver, &rev_positions, &rev_altitudes);
            prop_assert!((forward - backward).abs() < 1e-9);
        }
    }
}
