//! Fixed-step simulation loop: dispatch, plan, move, capture.

use crate::config::{Scenario, SimConfig};
use crate::dispatcher::Dispatcher;
use crate::drone::{DroneEvent, Odometry};
use crate::error::{Result, SimError};
use crate::fleet::Fleet;
use crate::grid::NoiseGrid;
use crate::models::Order;
use crate::monitor::{NoiseField, NoiseImpact, NoiseMonitor};
use crate::orders::load_orders;
use crate::planner::{FlightProfile, Planner};
use crate::timer::Timer;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// One row of the experiment result frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub dataset_name: String,
    pub num_drones: usize,
    pub num_orders: usize,
    pub navigation_type: String,
    pub avg_noise_diff: f64,
    pub noise_impact_df: NoiseImpact,
    pub delivered_orders_number: usize,
    pub execution_time_seconds: f64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub result: SimulationResult,
    pub field: NoiseField,
    pub odometry: Vec<Odometry>,
    pub iterations: u64,
    pub aborted_orders: usize,
    /// The run stopped early on request
    pub cancelled: bool,
}

impl SimulationOutcome {
    pub fn impact(&self) -> &NoiseImpact {
        &self.result.noise_impact_df
    }
}

pub struct Simulator {
    config: SimConfig,
    grid: NoiseGrid,
    profile: FlightProfile,
    timer: Timer,
    monitor: NoiseMonitor,
    fleet: Fleet,
    dispatcher: Dispatcher,
    planner: Planner,
    total_orders: usize,
}

impl Simulator {
    /// Simulator over the first `config.orders` orders of the configured dataset.
    pub fn new(config: &SimConfig, scenario: &Scenario) -> Result<Self> {
        let orders = load_orders(&config.order_dataset_path, config.orders)?;
        Self::with_orders(config, scenario, orders)
    }

    /// Simulator over an in-memory order list, capped at `config.orders`.
    pub fn with_orders(config: &SimConfig, scenario: &Scenario, orders: Vec<Order>) -> Result<Self> {
        let planner = Planner::from_config(config, scenario)?;
        Self::with_planner(config, scenario, orders, planner)
    }

    /// Simulator with a caller-built planner, for custom weight functions.
    pub fn with_planner(
        config: &SimConfig,
        scenario: &Scenario,
        mut orders: Vec<Order>,
        planner: Planner,
    ) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(SimError::invalid_config(errors.join("; ")));
        }
        if scenario.warehouses.is_empty() {
            return Err(SimError::invalid_config("at least one warehouse is required"));
        }
        orders.truncate(config.orders);

        let config = config.clone();
        let fleet = Fleet::new(config.drones, scenario.warehouses.clone(), scenario.boundaries);
        tracing::info!(
            drones = config.drones,
            orders = orders.len(),
            warehouses = scenario.warehouses.len(),
            navigator = %config.navigator_type,
            "simulator ready"
        );
        Ok(Self {
            profile: FlightProfile::from_config(&config),
            timer: Timer::new(config.start_s, config.step_s, config.end_s),
            monitor: NoiseMonitor::new(config.drone_noise_db),
            grid: scenario.noise_grid.clone(),
            total_orders: orders.len(),
            dispatcher: Dispatcher::new(orders),
            fleet,
            planner,
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn monitor(&self) -> &NoiseMonitor {
        &self.monitor
    }

    pub fn total_orders(&self) -> usize {
        self.total_orders
    }

    pub fn has_pending_deliveries(&self) -> bool {
        self.dispatcher.has_pending() || self.fleet.has_active_drones()
    }

    /// Orders neither queued, carried, nor dropped: `total - pending - held - aborted`.
    /// Orders lost to a boundary abort are subtracted so they never count as delivered.
    pub fn delivered_orders_number(&self) -> usize {
        self.total_orders
            - self.dispatcher.pending()
            - self.fleet.held_orders()
            - self.fleet.aborted()
    }

    /// Run one tick.
    pub fn step(&mut self) -> Vec<DroneEvent> {
        self.dispatcher.process_orders(&mut self.fleet);
        self.fleet.plan_drones_path(&mut self.planner, &self.profile);
        let events = self.fleet.update_drones();
        self.monitor.capture(self.fleet.in_flight_drones());
        self.timer.advance();

        if self.config.print_model_stats
            && self.config.stats_every > 0
            && self.timer.iteration() % self.config.stats_every == 0
        {
            self.log_stats();
        }
        events
    }

    /// Run until every order is settled or the clock runs out.
    pub fn run(self) -> SimulationOutcome {
        self.run_until(&AtomicBool::new(false))
    }

    /// As [`run`](Self::run), also stopping at the first tick boundary after
    /// `cancel` is set.
    pub fn run_until(mut self, cancel: &AtomicBool) -> SimulationOutcome {
        let started = Instant::now();
        let mut cancelled = false;
        while self.has_pending_deliveries() && self.timer.running() {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                tracing::warn!(iteration = self.timer.iteration(), "simulation cancelled");
                break;
            }
            self.step();
        }
        self.finish(started, cancelled)
    }

    fn finish(self, started: Instant, cancelled: bool) -> SimulationOutcome {
        let iterations = self.timer.iteration();
        let field = self.monitor.finish(&self.grid, iterations);
        let impact = field.impact(&self.grid);
        let delivered = self.delivered_orders_number();

        if self.config.print_model_stats {
            self.log_stats();
            self.log_odometry();
        }
        tracing::info!(
            iterations,
            delivered,
            orders = self.total_orders,
            aborted = self.fleet.aborted(),
            sim_time_s = self.timer.now(),
            "simulation finished"
        );

        let result = SimulationResult {
            dataset_name: dataset_name(&self.config.order_dataset_path),
            num_drones: self.config.drones,
            num_orders: self.total_orders,
            navigation_type: self.config.navigator_type.to_string(),
            avg_noise_diff: impact.avg_noise_diff(),
            noise_impact_df: impact,
            delivered_orders_number: delivered,
            execution_time_seconds: started.elapsed().as_secs_f64(),
        };
        SimulationOutcome {
            result,
            field,
            odometry: self.fleet.odometry(),
            iterations,
            aborted_orders: self.fleet.aborted(),
            cancelled,
        }
    }

    fn log_stats(&self) {
        let counts = self.fleet.counts();
        tracing::info!(
            iteration = self.timer.iteration(),
            time_s = self.timer.now(),
            free = counts.free,
            planning = counts.planning,
            in_flight = counts.in_flight,
            pending = self.dispatcher.pending(),
            delivered = self.delivered_orders_number(),
            planning_failures = self.fleet.planning_failures(),
            "fleet status"
        );
    }

    fn log_odometry(&self) {
        for drone in self.fleet.drones() {
            let odometry = drone.odometry();
            tracing::info!(
                drone_id = drone.id(),
                steps = odometry.steps,
                distance_m = odometry.distance_m,
                trips = odometry.completed_trips,
                "drone odometry"
            );
        }
        let total: f64 = self.fleet.drones().iter().map(|d| d.odometry().distance_m).sum();
        tracing::info!(total_distance_m = total, "fleet odometry");
    }
}

fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
