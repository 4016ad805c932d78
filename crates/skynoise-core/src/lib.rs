pub mod acoustics;
pub mod baseline;
pub mod config;
pub mod dispatcher;
pub mod drone;
pub mod error;
pub mod fleet;
pub mod grid;
pub mod models;
pub mod monitor;
pub mod nav_graph;
pub mod orders;
pub mod persist;
pub mod planner;
pub mod router;
pub mod shortest_path;
pub mod simulator;
pub mod spatial;
pub mod timer;
pub mod weights;

pub use acoustics::{db_add, db_sum, received_level};
pub use baseline::{load_baseline, parse_baseline, BaselineCell};
pub use config::{
    GraphFiles, NavigatorType, ProjectionKind, Scenario, ScenarioFile, SimConfig, SimConfigBuilder,
};
pub use dispatcher::Dispatcher;
pub use drone::{Drone, DroneEvent, DroneStatus, Odometry};
pub use error::{PlanningError, Result, SimError};
pub use fleet::{Fleet, FleetCounts};
pub use grid::{CellIndex, NoiseGrid};
pub use models::{Coordinate, DroneId, MapBoundaries, Order, OrderId, OrderStatus};
pub use monitor::{NoiseField, NoiseImpact, NoiseImpactRow, NoiseMonitor};
pub use nav_graph::{GraphFile, NavEdge, NavGraph, NavNode, NodeId};
pub use orders::{load_orders, read_orders, save_orders, write_orders};
pub use planner::{navigator_weight, FlightProfile, Planner, Route, RouteCache};
pub use router::{RouterStats, WarehouseRouter};
pub use simulator::{SimulationOutcome, SimulationResult, Simulator};
pub use spatial::{IdentityProjection, LocalTangentProjection, Projection};
pub use timer::Timer;
pub use weights::{CustomWeight, EdgeAttrs, MixedWeight, NoiseStats, WeightFn};
