//! Experiment output files.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use skynoise_core::{SimConfig, SimulationOutcome, SimulationResult};
use std::path::{Path, PathBuf};

/// The JSON document written for one run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub config: &'a SimConfig,
    pub iterations: u64,
    pub aborted_orders: usize,
    pub cancelled: bool,
    pub result: &'a SimulationResult,
}

/// Paths written by [`write_outcome`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFiles {
    pub report: PathBuf,
    pub impact_csv: PathBuf,
}

/// `{dataset}_{navigator}_{drones}d_{timestamp}`, unique per second.
pub fn run_stem(result: &SimulationResult, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}d_{}",
        result.dataset_name,
        result.navigation_type.to_lowercase(),
        result.num_drones,
        at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Write the report JSON and the impact table CSV into `out_dir`.
/// Cell centroids go into the CSV when the config asks for map output.
pub fn write_outcome(out_dir: &Path, config: &SimConfig, outcome: &SimulationOutcome) -> Result<WrittenFiles> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let generated_at = Utc::now();
    let stem = run_stem(&outcome.result, generated_at);
    let report = RunReport {
        generated_at,
        config,
        iterations: outcome.iterations,
        aborted_orders: outcome.aborted_orders,
        cancelled: outcome.cancelled,
        result: &outcome.result,
    };

    let files = WrittenFiles {
        report: out_dir.join(format!("{stem}.json")),
        impact_csv: out_dir.join(format!("{stem}_impact.csv")),
    };
    skynoise_core::persist::write_json(&files.report, &report)
        .with_context(|| format!("writing {}", files.report.display()))?;
    outcome
        .impact()
        .write_csv(&files.impact_csv, config.plot_map)
        .with_context(|| format!("writing {}", files.impact_csv.display()))?;

    tracing::info!(
        report = %files.report.display(),
        impact = %files.impact_csv.display(),
        "results written"
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skynoise_core::{Coordinate, MapBoundaries, Order, Scenario, Simulator};

    fn outcome(config: &SimConfig) -> SimulationOutcome {
        let home = Coordinate::new(0.0, 0.0);
        let scenario = Scenario::new(
            MapBoundaries {
                left: -500.0,
                right: 500.0,
                top: 500.0,
                bottom: -500.0,
            },
            vec![home],
            500.0,
        )
        .unwrap();
        let orders = vec![Order::new(1, home, Coordinate::new(0.0, 270.0))];
        Simulator::with_orders(config, &scenario, orders).unwrap().run()
    }

    #[test]
    fn test_run_stem_format() {
        let config = SimConfig::builder()
            .drones(1)
            .orders(1)
            .order_dataset_path("data/demo.csv")
            .build()
            .unwrap();
        let outcome = outcome(&config);
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(run_stem(&outcome.result, at), "demo_straight_1d_20240309T140500Z");
    }

    #[test]
    fn test_write_outcome_files() {
        let dir = std::env::temp_dir().join(format!("skynoise_cli_out_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = SimConfig::builder()
            .drones(1)
            .orders(1)
            .plot_map(true)
            .build()
            .unwrap();
        let outcome = outcome(&config);

        let files = write_outcome(&dir, &config, &outcome).unwrap();
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.report).unwrap()).unwrap();
        assert_eq!(report["result"]["delivered_orders_number"], 1);
        assert_eq!(report["config"]["navigator_type"], "STRAIGHT");

        let csv = std::fs::read_to_string(&files.impact_csv).unwrap();
        assert!(csv.lines().count() > 1);
        assert!(csv.lines().next().unwrap().contains("northing"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
