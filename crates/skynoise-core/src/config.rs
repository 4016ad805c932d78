//! Simulation configuration and world inputs.
//!
//! [`SimConfig`] holds the experiment switches and physical constants. It is
//! built once, validated, and cloned into each [`Simulator`](crate::Simulator)
//! so a running simulation never observes a later change. [`Scenario`] holds
//! the world: map rectangle, warehouses, noise grid and navigation graph.

use crate::baseline::load_baseline;
use crate::error::{Result, SimError};
use crate::grid::NoiseGrid;
use crate::models::{Coordinate, MapBoundaries};
use crate::nav_graph::NavGraph;
use crate::spatial::{IdentityProjection, LocalTangentProjection, Projection};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Route planning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigatorType {
    #[default]
    Straight,
    LightNoise,
    NoiseA025,
    NoiseA050,
    NoiseA075,
    NoiseA100,
    HeavyNoise,
}

impl NavigatorType {
    pub const ALL: [NavigatorType; 7] = [
        NavigatorType::Straight,
        NavigatorType::LightNoise,
        NavigatorType::NoiseA025,
        NavigatorType::NoiseA050,
        NavigatorType::NoiseA075,
        NavigatorType::NoiseA100,
        NavigatorType::HeavyNoise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NavigatorType::Straight => "STRAIGHT",
            NavigatorType::LightNoise => "LIGHT_NOISE",
            NavigatorType::NoiseA025 => "NOISE_A025",
            NavigatorType::NoiseA050 => "NOISE_A050",
            NavigatorType::NoiseA075 => "NOISE_A075",
            NavigatorType::NoiseA100 => "NOISE_A100",
            NavigatorType::HeavyNoise => "HEAVY_NOISE",
        }
    }

    /// Noise share of the mixed weight, for the `NOISE_Axx` planners.
    pub fn alpha(&self) -> Option<f64> {
        match self {
            NavigatorType::NoiseA025 => Some(0.25),
            NavigatorType::NoiseA050 => Some(0.50),
            NavigatorType::NoiseA075 => Some(0.75),
            NavigatorType::NoiseA100 => Some(1.0),
            _ => None,
        }
    }

    /// Whether planning needs the navigation graph.
    pub fn needs_graph(&self, compute_on_miss: bool) -> bool {
        match self {
            NavigatorType::Straight => false,
            NavigatorType::LightNoise => compute_on_miss,
            _ => true,
        }
    }
}

impl fmt::Display for NavigatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigatorType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|navigator| navigator.as_str() == wanted)
            .ok_or_else(|| SimError::UnknownNavigator(s.to_string()))
    }
}

/// Experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Cap on orders loaded from the dataset
    pub orders: usize,
    /// Fleet size
    pub drones: usize,
    pub order_dataset_path: PathBuf,
    pub navigator_type: NavigatorType,
    /// Pad routes with take-off and landing samples
    pub drone_landing: bool,
    /// Let LIGHT_NOISE compute routes missing from its cache
    pub compute_on_miss: bool,
    pub print_model_stats: bool,
    /// Export cell centroids alongside the noise impact table
    pub plot_map: bool,

    pub drone_speed_mps: f64,
    pub step_s: u64,
    pub start_s: u64,
    pub end_s: u64,
    /// Source level of one drone, dB
    pub drone_noise_db: f64,
    pub flight_altitude_m: f64,
    pub landing_delay_s: u64,
    pub noise_cell_size_m: f64,
    pub nav_cell_size_m: f64,
    /// Ticks between fleet summaries when `print_model_stats` is set
    pub stats_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            orders: 100,
            drones: 10,
            order_dataset_path: PathBuf::from("orders.csv"),
            navigator_type: NavigatorType::Straight,
            drone_landing: false,
            compute_on_miss: false,
            print_model_stats: false,
            plot_map: false,
            drone_speed_mps: 27.0,
            step_s: 30,
            start_s: 0,
            end_s: 86_400,
            drone_noise_db: 90.0,
            flight_altitude_m: 100.0,
            landing_delay_s: 60,
            noise_cell_size_m: 500.0,
            nav_cell_size_m: 100.0,
            stats_every: 100,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

impl SimConfig {
    pub fn builder() -> SimConfigBuilder {
        SimConfigBuilder::default()
    }

    /// Defaults overlaid with `SKYNOISE_*` environment variables.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            orders: env_parse("SKYNOISE_ORDERS").unwrap_or(defaults.orders),
            drones: env_parse("SKYNOISE_DRONES").unwrap_or(defaults.drones),
            order_dataset_path: env::var("SKYNOISE_ORDER_DATASET_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.order_dataset_path),
            navigator_type: env_parse("SKYNOISE_NAVIGATOR_TYPE").unwrap_or(defaults.navigator_type),
            drone_landing: env_flag("SKYNOISE_DRONE_LANDING").unwrap_or(defaults.drone_landing),
            compute_on_miss: env_flag("SKYNOISE_COMPUTE_ON_MISS").unwrap_or(defaults.compute_on_miss),
            print_model_stats: env_flag("SKYNOISE_PRINT_MODEL_STATS")
                .unwrap_or(defaults.print_model_stats),
            plot_map: env_flag("SKYNOISE_PLOT_MAP").unwrap_or(defaults.plot_map),
            drone_speed_mps: env_parse("SKYNOISE_DRONE_SPEED_MPS").unwrap_or(defaults.drone_speed_mps),
            step_s: env_parse("SKYNOISE_STEP_S").unwrap_or(defaults.step_s),
            start_s: env_parse("SKYNOISE_START_S").unwrap_or(defaults.start_s),
            end_s: env_parse("SKYNOISE_END_S").unwrap_or(defaults.end_s),
            drone_noise_db: env_parse("SKYNOISE_DRONE_NOISE_DB").unwrap_or(defaults.drone_noise_db),
            flight_altitude_m: env_parse("SKYNOISE_FLIGHT_ALTITUDE_M")
                .unwrap_or(defaults.flight_altitude_m),
            landing_delay_s: env_parse("SKYNOISE_LANDING_DELAY_S").unwrap_or(defaults.landing_delay_s),
            noise_cell_size_m: env_parse("SKYNOISE_NOISE_CELL_SIZE_M")
                .unwrap_or(defaults.noise_cell_size_m),
            nav_cell_size_m: env_parse("SKYNOISE_NAV_CELL_SIZE_M").unwrap_or(defaults.nav_cell_size_m),
            stats_every: env_parse("SKYNOISE_STATS_EVERY").unwrap_or(defaults.stats_every),
        }
    }

    /// Problems that make the configuration unusable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.orders == 0 {
            errors.push("orders must be > 0".to_string());
        }
        if self.drones == 0 {
            errors.push("drones must be > 0".to_string());
        }
        if self.step_s == 0 {
            errors.push("step_s must be > 0".to_string());
        }
        if !(self.drone_speed_mps > 0.0) || !self.drone_speed_mps.is_finite() {
            errors.push(format!("drone_speed_mps must be positive, got {}", self.drone_speed_mps));
        }
        if self.end_s < self.start_s {
            errors.push(format!(
                "end_s ({}) must not precede start_s ({})",
                self.end_s, self.start_s
            ));
        }
        if !(self.flight_altitude_m > 0.0) {
            errors.push(format!(
                "flight_altitude_m must be positive, got {}",
                self.flight_altitude_m
            ));
        }
        if !(self.noise_cell_size_m > 0.0) {
            errors.push("noise_cell_size_m must be positive".to_string());
        }
        if !(self.nav_cell_size_m > 0.0) {
            errors.push("nav_cell_size_m must be positive".to_string());
        }
        errors
    }
}

/// Fluent construction of a validated [`SimConfig`].
#[derive(Debug, Clone, Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Start from an existing configuration instead of the defaults.
    pub fn from_config(config: SimConfig) -> Self {
        Self { config }
    }

    pub fn orders(mut self, orders: usize) -> Self {
        self.config.orders = orders;
        self
    }

    pub fn drones(mut self, drones: usize) -> Self {
        self.config.drones = drones;
        self
    }

    pub fn order_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.order_dataset_path = path.into();
        self
    }

    pub fn navigator_type(mut self, navigator: NavigatorType) -> Self {
        self.config.navigator_type = navigator;
        self
    }

    pub fn drone_landing(mut self, enabled: bool) -> Self {
        self.config.drone_landing = enabled;
        self
    }

    pub fn compute_on_miss(mut self, enabled: bool) -> Self {
        self.config.compute_on_miss = enabled;
        self
    }

    pub fn print_model_stats(mut self, enabled: bool) -> Self {
        self.config.print_model_stats = enabled;
        self
    }

    pub fn plot_map(mut self, enabled: bool) -> Self {
        self.config.plot_map = enabled;
        self
    }

    pub fn drone_speed_mps(mut self, speed: f64) -> Self {
        self.config.drone_speed_mps = speed;
        self
    }

    pub fn step_s(mut self, step: u64) -> Self {
        self.config.step_s = step;
        self
    }

    pub fn time_window(mut self, start_s: u64, end_s: u64) -> Self {
        self.config.start_s = start_s;
        self.config.end_s = end_s;
        self
    }

    pub fn drone_noise_db(mut self, level: f64) -> Self {
        self.config.drone_noise_db = level;
        self
    }

    pub fn flight_altitude_m(mut self, altitude: f64) -> Self {
        self.config.flight_altitude_m = altitude;
        self
    }

    pub fn landing_delay_s(mut self, delay: u64) -> Self {
        self.config.landing_delay_s = delay;
        self
    }

    pub fn noise_cell_size_m(mut self, size: f64) -> Self {
        self.config.noise_cell_size_m = size;
        self
    }

    pub fn nav_cell_size_m(mut self, size: f64) -> Self {
        self.config.nav_cell_size_m = size;
        self
    }

    pub fn stats_every(mut self, ticks: u64) -> Self {
        self.config.stats_every = ticks;
        self
    }

    pub fn build(self) -> Result<SimConfig> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(SimError::invalid_config(errors.join("; ")))
        }
    }
}

/// World inputs shared by every experiment over the same map.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub boundaries: MapBoundaries,
    pub warehouses: Vec<Coordinate>,
    pub noise_grid: NoiseGrid,
    pub nav_graph: Option<Arc<NavGraph>>,
    /// Directory of per-warehouse shortest-path trees
    pub path_cache_dir: Option<PathBuf>,
    /// Pre-baked polylines for LIGHT_NOISE
    pub route_cache_path: Option<PathBuf>,
}

impl Scenario {
    /// Scenario with a plain grid over `boundaries` and no navigation graph.
    pub fn new(boundaries: MapBoundaries, warehouses: Vec<Coordinate>, noise_cell_size_m: f64) -> Result<Self> {
        if warehouses.is_empty() {
            return Err(SimError::invalid_config("at least one warehouse is required"));
        }
        let noise_grid = NoiseGrid::new(boundaries, noise_cell_size_m)?;
        Ok(Self {
            boundaries,
            warehouses,
            noise_grid,
            nav_graph: None,
            path_cache_dir: None,
            route_cache_path: None,
        })
    }

    pub fn with_noise_grid(mut self, grid: NoiseGrid) -> Self {
        self.noise_grid = grid;
        self
    }

    pub fn with_nav_graph(mut self, graph: Arc<NavGraph>) -> Self {
        self.nav_graph = Some(graph);
        self
    }

    pub fn with_path_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_cache_dir = Some(dir.into());
        self
    }

    pub fn with_route_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.route_cache_path = Some(path.into());
        self
    }
}

/// How baseline geometries map into the simulator plane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectionKind {
    #[default]
    Identity,
    LocalTangent { origin_lat: f64, origin_lon: f64 },
}

impl ProjectionKind {
    pub fn projection(&self) -> Box<dyn Projection> {
        match *self {
            ProjectionKind::Identity => Box::new(IdentityProjection),
            ProjectionKind::LocalTangent {
                origin_lat,
                origin_lon,
            } => Box::new(LocalTangentProjection {
                origin_lat,
                origin_lon,
            }),
        }
    }
}

/// Readable and binary navigation graph files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFiles {
    pub json: PathBuf,
    pub binary: PathBuf,
}

/// Scenario description as stored on disk. Relative paths are resolved
/// against the directory holding the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub boundaries: MapBoundaries,
    pub warehouses: Vec<Coordinate>,
    #[serde(default)]
    pub projection: ProjectionKind,
    /// Baseline at noise-grid resolution
    #[serde(default)]
    pub baseline_path: Option<PathBuf>,
    /// Study-area outline; cells outside it are ignored
    #[serde(default)]
    pub boundary_polygon: Vec<Coordinate>,
    #[serde(default)]
    pub nav_graph: Option<GraphFiles>,
    /// Baseline at navigation resolution, used to build the graph
    #[serde(default)]
    pub nav_baseline_path: Option<PathBuf>,
    #[serde(default)]
    pub path_cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub route_cache_path: Option<PathBuf>,
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl ScenarioFile {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file: ScenarioFile = crate::persist::read_json(path)
            .map_err(|err| err.with_context(format!("reading scenario {}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for slot in [
            file.baseline_path.as_mut(),
            file.nav_baseline_path.as_mut(),
            file.path_cache_dir.as_mut(),
            file.route_cache_path.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            resolve(base, slot);
        }
        if let Some(files) = file.nav_graph.as_mut() {
            resolve(base, &mut files.json);
            resolve(base, &mut files.binary);
        }
        Ok(file)
    }

    /// Navigation graph from the saved files, or built from the
    /// navigation-resolution baseline when no files are configured.
    pub fn load_nav_graph(&self, nav_cell_size_m: f64) -> Result<Option<NavGraph>> {
        if let Some(files) = &self.nav_graph {
            if files.json.exists() || files.binary.exists() {
                return NavGraph::load(&files.json, &files.binary).map(Some);
            }
        }
        match &self.nav_baseline_path {
            Some(path) => {
                let projection = self.projection.projection();
                let cells = load_baseline(path, projection.as_ref())?;
                NavGraph::from_baseline(&cells, nav_cell_size_m).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Materialise the scenario for `config`. The navigation graph is only
    /// loaded when the selected navigator uses it.
    pub fn build(&self, config: &SimConfig) -> Result<Scenario> {
        let mut grid = NoiseGrid::new(self.boundaries, config.noise_cell_size_m)?;
        if !self.boundary_polygon.is_empty() {
            grid = grid.with_boundary_polygon(&self.boundary_polygon);
        }
        if let Some(path) = &self.baseline_path {
            let projection = self.projection.projection();
            let cells = load_baseline(path, projection.as_ref())
                .map_err(|err| err.with_context(format!("reading baseline {}", path.display())))?;
            grid = grid.with_baseline(&cells);
        }

        let mut scenario = Scenario::new(self.boundaries, self.warehouses.clone(), config.noise_cell_size_m)?
            .with_noise_grid(grid);
        if config.navigator_type.needs_graph(config.compute_on_miss) {
            let graph = self
                .load_nav_graph(config.nav_cell_size_m)?
                .ok_or(SimError::MissingNavigationGraph)?;
            scenario = scenario.with_nav_graph(Arc::new(graph));
        }
        scenario.path_cache_dir = self.path_cache_dir.clone();
        scenario.route_cache_path = self.route_cache_path.clone();
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigator_parsing_is_case_insensitive() {
        assert_eq!("noise_a050".parse::<NavigatorType>().unwrap(), NavigatorType::NoiseA050);
        assert_eq!(" HEAVY_NOISE ".parse::<NavigatorType>().unwrap(), NavigatorType::HeavyNoise);
        assert!(matches!(
            "quiet".parse::<NavigatorType>(),
            Err(SimError::UnknownNavigator(_))
        ));
    }

    #[test]
    fn test_navigator_serde_tags_match_display() {
        for navigator in NavigatorType::ALL {
            let json = serde_json::to_string(&navigator).unwrap();
            assert_eq!(json, format!("\"{}\"", navigator.as_str()));
        }
    }

    #[test]
    fn test_navigator_alpha() {
        assert_eq!(NavigatorType::NoiseA075.alpha(), Some(0.75));
        assert_eq!(NavigatorType::HeavyNoise.alpha(), None);
        assert!(!NavigatorType::LightNoise.needs_graph(false));
        assert!(NavigatorType::LightNoise.needs_graph(true));
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        let err = SimConfig::builder().drones(0).build().unwrap_err();
        assert!(err.to_string().contains("drones must be > 0"));

        let err = SimConfig::builder().time_window(100, 50).build().unwrap_err();
        assert!(err.to_string().contains("end_s"));

        let config = SimConfig::builder()
            .drones(3)
            .orders(5)
            .navigator_type(NavigatorType::NoiseA025)
            .build()
            .unwrap();
        assert_eq!(config.drones, 3);
        assert_eq!(config.step_s, 30);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"drones": 4, "navigator_type": "LIGHT_NOISE"}"#).unwrap();
        assert_eq!(config.drones, 4);
        assert_eq!(config.navigator_type, NavigatorType::LightNoise);
        assert_eq!(config.drone_speed_mps, 27.0);
    }

    #[test]
    fn test_scenario_requires_warehouse() {
        let boundaries = MapBoundaries {
            left: 0.0,
            right: 1000.0,
            top: 1000.0,
            bottom: 0.0,
        };
        assert!(Scenario::new(boundaries, Vec::new(), 500.0).is_err());
        let scenario = Scenario::new(boundaries, vec![Coordinate::new(0.0, 0.0)], 500.0).unwrap();
        assert_eq!(scenario.noise_grid.len(), 4);
    }

    #[test]
    fn test_scenario_file_resolves_relative_paths() {
        let dir = crate::persist::test_dir("scenario_file");
        let path = dir.join("scenario.json");
        std::fs::write(
            &path,
            r#"{
                "boundaries": {"left": 0, "right": 1000, "top": 1000, "bottom": 0},
                "warehouses": [{"northing": 250, "easting": 250}],
                "path_cache_dir": "cache"
            }"#,
        )
        .unwrap();
        let file = ScenarioFile::load(&path).unwrap();
        assert_eq!(file.path_cache_dir, Some(dir.join("cache")));

        let config = SimConfig::default();
        let scenario = file.build(&config).unwrap();
        assert!(scenario.nav_graph.is_none());
        assert_eq!(scenario.warehouses.len(), 1);

        let heavy = SimConfig {
            navigator_type: NavigatorType::HeavyNoise,
            ..SimConfig::default()
        };
        assert!(matches!(file.build(&heavy), Err(SimError::MissingNavigationGraph)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
