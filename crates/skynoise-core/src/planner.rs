//! Route planning: time-sampled polylines plus their altitude profiles.
//!
//! Every planner produces a polyline sampled once per tick at the drone's
//! cruise speed. The landing profile then pads both ends with stationary
//! samples while the drone climbs to, or descends from, flight altitude.

use crate::config::{NavigatorType, Scenario, SimConfig};
use crate::error::{PlanningError, Result, SimError};
use crate::models::{Coordinate, Order};
use crate::nav_graph::NavGraph;
use crate::persist;
use crate::router::WarehouseRouter;
use crate::weights::{MixedWeight, WeightFn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A planned flight: positions and altitudes, one entry per tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    pub path: Vec<Coordinate>,
    pub altitudes: Vec<f64>,
}

impl Route {
    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Kinematic parameters shared by every planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightProfile {
    pub speed_mps: f64,
    pub step_s: f64,
    pub flight_altitude_m: f64,
    /// Stationary samples spent climbing (and again descending); 0 disables landing
    pub landing_steps: usize,
}

impl FlightProfile {
    pub fn from_config(config: &SimConfig) -> Self {
        let landing_steps = if config.drone_landing && config.step_s > 0 {
            (config.landing_delay_s as f64 / config.step_s as f64).ceil() as usize
        } else {
            0
        };
        Self {
            speed_mps: config.drone_speed_mps,
            step_s: config.step_s as f64,
            flight_altitude_m: config.flight_altitude_m,
            landing_steps,
        }
    }

    /// Distance covered in one tick.
    #[inline]
    pub fn step_distance(&self) -> f64 {
        self.speed_mps * self.step_s
    }

    /// Pad `path` for take-off and landing and attach the altitude profile.
    pub fn with_altitudes(&self, path: Vec<Coordinate>) -> Route {
        let n = self.landing_steps;
        let h = self.flight_altitude_m;
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Route::default();
        };
        if n == 0 {
            let altitudes = vec![h; path.len()];
            return Route { path, altitudes };
        }

        let inner = path.len();
        let ascending: Vec<f64> = (0..n).map(|i| h * i as f64 / n as f64).collect();

        let mut padded = Vec::with_capacity(inner + 2 * n);
        padded.extend(std::iter::repeat(first).take(n));
        padded.extend(path);
        padded.extend(std::iter::repeat(last).take(n));

        let mut altitudes = Vec::with_capacity(padded.len());
        altitudes.extend_from_slice(&ascending);
        altitudes.extend(std::iter::repeat(h).take(inner));
        altitudes.extend(ascending.iter().rev());

        Route {
            path: padded,
            altitudes,
        }
    }
}

/// Straight segment from `start` to `end`, one sample per tick.
pub fn straight_line(start: Coordinate, end: Coordinate, speed_mps: f64, step_s: f64) -> Vec<Coordinate> {
    let distance = start.distance(&end);
    if distance == 0.0 {
        return vec![start];
    }
    let steps = ((distance / speed_mps) / step_s).floor();
    if !(steps >= 1.0) || !steps.is_finite() {
        return vec![start, end];
    }
    let step_distance = speed_mps * step_s;
    let steps = steps as usize;
    let mut samples: Vec<Coordinate> = (0..=steps)
        .map(|i| start.lerp(&end, (i as f64 * step_distance / distance).min(1.0)))
        .collect();
    if samples.last() != Some(&end) {
        samples.push(end);
    }
    samples
}

/// Resample `points` every `step_distance` metres of arc length.
///
/// The samples always include both ends of the polyline; the first is then
/// replaced by `start` and the last by `end`.
pub fn resample_polyline(
    points: &[Coordinate],
    start: Coordinate,
    end: Coordinate,
    step_distance: f64,
) -> Vec<Coordinate> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += points[i - 1].distance(point);
        }
        cumulative.push(total);
    }

    let mut samples = Vec::new();
    if points.len() < 2 || total == 0.0 || !(step_distance > 0.0) {
        samples.push(start);
        if start != end {
            samples.push(end);
        }
        return samples;
    }

    let mut segment = 0usize;
    let mut emit = |at: f64, samples: &mut Vec<Coordinate>| {
        while segment + 2 < points.len() && cumulative[segment + 1] < at {
            segment += 1;
        }
        let seg_len = cumulative[segment + 1] - cumulative[segment];
        let ratio = if seg_len > 0.0 {
            ((at - cumulative[segment]) / seg_len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        samples.push(points[segment].lerp(&points[segment + 1], ratio));
    };

    let mut k = 0usize;
    loop {
        let at = k as f64 * step_distance;
        if at >= total {
            break;
        }
        emit(at, &mut samples);
        k += 1;
    }
    emit(total, &mut samples);

    if let Some(first) = samples.first_mut() {
        *first = start;
    }
    if let Some(last) = samples.last_mut() {
        *last = end;
    }
    samples
}

/// Pre-baked polylines keyed by `"start->end"`, for the light-weight planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteCache {
    routes: BTreeMap<String, Vec<Coordinate>>,
}

impl RouteCache {
    pub fn key(start: &Coordinate, end: &Coordinate) -> String {
        format!(
            "{},{}->{},{}",
            start.northing, start.easting, end.northing, end.easting
        )
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn insert(&mut self, start: &Coordinate, end: &Coordinate, polyline: Vec<Coordinate>) {
        self.routes.insert(Self::key(start, end), polyline);
    }

    /// Stored polyline for the pair, falling back to the reversed reverse entry.
    pub fn lookup(&self, start: &Coordinate, end: &Coordinate) -> Option<Vec<Coordinate>> {
        if let Some(polyline) = self.routes.get(&Self::key(start, end)) {
            return Some(polyline.clone());
        }
        self.routes.get(&Self::key(end, start)).map(|polyline| {
            let mut reversed = polyline.clone();
            reversed.reverse();
            reversed
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        persist::read_json(path)
            .map_err(|err| err.with_context(format!("reading route cache {}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_json(path, self)
    }

    /// Graph polylines for every order's outbound leg. Pairs already present
    /// are skipped, so baking can resume into an existing cache. Returns the
    /// number of orders with no route.
    pub fn bake(&mut self, router: &mut WarehouseRouter, orders: &[Order]) -> usize {
        let mut failures = 0;
        for order in orders {
            if order.start == order.end || self.lookup(&order.start, &order.end).is_some() {
                continue;
            }
            match router.route_polyline(&order.start, &order.end) {
                Ok(polyline) => self.insert(&order.start, &order.end, polyline),
                Err(err) => {
                    failures += 1;
                    tracing::warn!(order_id = order.id, error = %err, "no route to bake");
                }
            }
        }
        failures
    }
}

/// Edge weight a navigator plans with, or `None` for STRAIGHT.
/// LIGHT_NOISE misses are computed with the HEAVY_NOISE weight.
pub fn navigator_weight(navigator: NavigatorType, graph: &NavGraph) -> Option<WeightFn> {
    match navigator {
        NavigatorType::Straight => None,
        NavigatorType::LightNoise | NavigatorType::HeavyNoise => Some(WeightFn::NoiseFavoured),
        _ => navigator.alpha().map(|alpha| {
            WeightFn::Mixed(MixedWeight::new(
                alpha,
                false,
                graph.cell_size_m(),
                graph.noise_stats(),
            ))
        }),
    }
}

/// Route planning strategy.
pub enum Planner {
    /// Straight line between the two points
    Straight,
    /// Pre-baked polylines, optionally computing misses with a router
    CachedRoutes {
        cache: RouteCache,
        on_miss: Option<WarehouseRouter>,
    },
    /// Shortest path over the navigation graph
    Warehouse(WarehouseRouter),
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Planner::Straight => f.write_str("Straight"),
            Planner::CachedRoutes { cache, on_miss } => f
                .debug_struct("CachedRoutes")
                .field("routes", &cache.len())
                .field("compute_on_miss", &on_miss.is_some())
                .finish(),
            Planner::Warehouse(router) => f
                .debug_tuple("Warehouse")
                .field(&router.graph().weight_id())
                .finish(),
        }
    }
}

impl Planner {
    /// Build the planner selected by `config.navigator_type`.
    pub fn from_config(config: &SimConfig, scenario: &Scenario) -> Result<Self> {
        let navigator = config.navigator_type;
        match navigator {
            NavigatorType::Straight => Ok(Planner::Straight),
            NavigatorType::LightNoise => {
                let path = scenario.route_cache_path.as_deref().ok_or_else(|| {
                    SimError::invalid_config("LIGHT_NOISE needs a route cache path")
                })?;
                let cache = RouteCache::load(path)?;
                let on_miss = if config.compute_on_miss {
                    Some(Self::router(navigator, scenario)?)
                } else {
                    None
                };
                tracing::info!(routes = cache.len(), compute_on_miss = config.compute_on_miss, "loaded route cache");
                Ok(Planner::CachedRoutes { cache, on_miss })
            }
            _ => Ok(Planner::Warehouse(Self::router(navigator, scenario)?)),
        }
    }

    /// Warehouse router for a graph-backed navigator over the scenario's
    /// navigation graph. Warms the scenario's path cache, if any.
    pub fn router(navigator: NavigatorType, scenario: &Scenario) -> Result<WarehouseRouter> {
        let graph = scenario
            .nav_graph
            .clone()
            .ok_or(SimError::MissingNavigationGraph)?;
        let weight = navigator_weight(navigator, &graph).ok_or_else(|| {
            SimError::invalid_config(format!("{navigator} does not route over the navigation graph"))
        })?;
        WarehouseRouter::new(
            graph,
            &weight,
            &scenario.warehouses,
            scenario.path_cache_dir.as_deref(),
        )
    }

    /// Sampled route from `start` to `end` with its altitude profile.
    pub fn plan_route(
        &mut self,
        start: Coordinate,
        end: Coordinate,
        profile: &FlightProfile,
    ) -> std::result::Result<Route, PlanningError> {
        let path = match self.sampled_path(start, end, profile) {
            Ok(path) => path,
            Err(PlanningError::CacheMiss) => {
                tracing::debug!(key = %RouteCache::key(&start, &end), "route cache miss, flying straight");
                straight_line(start, end, profile.speed_mps, profile.step_s)
            }
            Err(err) => return Err(err),
        };
        Ok(profile.with_altitudes(path))
    }

    fn sampled_path(
        &mut self,
        start: Coordinate,
        end: Coordinate,
        profile: &FlightProfile,
    ) -> std::result::Result<Vec<Coordinate>, PlanningError> {
        if start == end {
            return Ok(vec![start]);
        }
        let polyline = match self {
            Planner::Straight => {
                return Ok(straight_line(start, end, profile.speed_mps, profile.step_s));
            }
            Planner::CachedRoutes { cache, on_miss } => match cache.lookup(&start, &end) {
                Some(polyline) => polyline,
                None => match on_miss {
                    Some(router) => router.route_polyline(&start, &end)?,
                    None => return Err(PlanningError::CacheMiss),
                },
            },
            Planner::Warehouse(router) => router.route_polyline(&start, &end)?,
        };
        Ok(resample_polyline(&polyline, start, end, profile.step_distance()))
    }
}
