//! The drone fleet, partitioned into free, planning and in-flight lists.
//!
//! Every drone id is in exactly one of the three lists at any time. Newly
//! assigned drones wait in `planning` until their first route is planned;
//! in-flight drones that change destination stay in `in_flight` and are
//! re-planned in place.

use crate::drone::{Drone, DroneEvent, DroneStatus, Odometry};
use crate::models::{Coordinate, DroneId, MapBoundaries, Order};
use crate::planner::{FlightProfile, Planner};

/// Per-list drone counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetCounts {
    pub free: usize,
    pub planning: usize,
    pub in_flight: usize,
}

impl FleetCounts {
    pub fn total(&self) -> usize {
        self.free + self.planning + self.in_flight
    }
}

#[derive(Debug, Clone)]
pub struct Fleet {
    drones: Vec<Drone>,
    free: Vec<DroneId>,
    planning: Vec<DroneId>,
    in_flight: Vec<DroneId>,
    warehouses: Vec<Coordinate>,
    boundaries: MapBoundaries,
    delivered: usize,
    aborted: usize,
    planning_failures: u64,
}

impl Fleet {
    /// `size` free drones spread round-robin over `warehouses`.
    pub fn new(size: usize, warehouses: Vec<Coordinate>, boundaries: MapBoundaries) -> Self {
        let drones: Vec<Drone> = if warehouses.is_empty() {
            Vec::new()
        } else {
            (0..size)
                .map(|id| Drone::new(id, warehouses[id % warehouses.len()]))
                .collect()
        };
        let free = (0..drones.len()).collect();
        Self {
            drones,
            free,
            planning: Vec::new(),
            in_flight: Vec::new(),
            warehouses,
            boundaries,
            delivered: 0,
            aborted: 0,
            planning_failures: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.drones.len()
    }

    pub fn drone(&self, id: DroneId) -> &Drone {
        &self.drones[id]
    }

    pub fn drones(&self) -> &[Drone] {
        &self.drones
    }

    pub fn warehouses(&self) -> &[Coordinate] {
        &self.warehouses
    }

    pub fn free_drones(&self) -> &[DroneId] {
        &self.free
    }

    pub fn planning_drones(&self) -> &[DroneId] {
        &self.planning
    }

    pub fn in_flight_ids(&self) -> &[DroneId] {
        &self.in_flight
    }

    /// Drones currently flying, in list order.
    pub fn in_flight_drones(&self) -> impl Iterator<Item = &Drone> + '_ {
        self.in_flight.iter().map(|id| &self.drones[*id])
    }

    pub fn counts(&self) -> FleetCounts {
        FleetCounts {
            free: self.free.len(),
            planning: self.planning.len(),
            in_flight: self.in_flight.len(),
        }
    }

    pub fn has_active_drones(&self) -> bool {
        !self.planning.is_empty() || !self.in_flight.is_empty()
    }

    /// Orders delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Orders dropped by boundary violations.
    pub fn aborted(&self) -> usize {
        self.aborted
    }

    /// Orders on board or being collected, not yet delivered.
    pub fn held_orders(&self) -> usize {
        self.drones
            .iter()
            .filter(|drone| drone.holds_undelivered_order())
            .count()
    }

    pub fn planning_failures(&self) -> u64 {
        self.planning_failures
    }

    pub fn odometry(&self) -> Vec<Odometry> {
        self.drones.iter().map(Drone::odometry).collect()
    }

    /// Hand each accepted order to its drone and move the drone from the free
    /// list to the planning list.
    pub fn assign_orders(&mut self, assignments: Vec<(DroneId, Order)>) {
        if assignments.is_empty() {
            return;
        }
        for (id, order) in assignments {
            tracing::debug!(drone_id = id, order_id = order.id, "order assigned");
            self.drones[id].assign(order);
            self.planning.push(id);
        }
        let drones = &self.drones;
        self.free
            .retain(|id| drones[*id].status() == DroneStatus::Free);
    }

    /// Plan every drone that needs a route. Drones whose planning fails keep
    /// waiting and are retried next tick. Returns the number of failures.
    pub fn plan_drones_path(&mut self, planner: &mut Planner, profile: &FlightProfile) -> usize {
        let mut failures = 0;

        let waiting = std::mem::take(&mut self.planning);
        for id in waiting {
            if self.plan_one(id, planner, profile) {
                self.in_flight.push(id);
            } else {
                failures += 1;
                self.planning.push(id);
            }
        }

        for idx in 0..self.in_flight.len() {
            let id = self.in_flight[idx];
            if self.drones[id].needs_planning() && !self.plan_one(id, planner, profile) {
                failures += 1;
            }
        }

        self.planning_failures += failures as u64;
        failures
    }

    fn plan_one(&mut self, id: DroneId, planner: &mut Planner, profile: &FlightProfile) -> bool {
        let drone = &mut self.drones[id];
        let Some(destination) = drone.destination() else {
            return false;
        };
        match planner.plan_route(drone.location(), destination, profile) {
            Ok(route) => {
                drone.set_route(route);
                true
            }
            Err(err) => {
                tracing::warn!(drone_id = id, error = %err, "route planning failed, retrying next tick");
                false
            }
        }
    }

    /// Advance every in-flight drone by one sample. Drones that come back to
    /// a warehouse, or abort, return to the free list.
    pub fn update_drones(&mut self) -> Vec<DroneEvent> {
        let mut events = Vec::new();
        let mut still_flying = Vec::with_capacity(self.in_flight.len());

        for id in std::mem::take(&mut self.in_flight) {
            let event = self.drones[id].update_position(&self.boundaries, &self.warehouses);
            match &event {
                Some(DroneEvent::Delivered { order_id, .. }) => {
                    self.delivered += 1;
                    tracing::debug!(drone_id = id, order_id, "order delivered");
                }
                Some(DroneEvent::Aborted { order_id, at, .. }) => {
                    if order_id.is_some() {
                        self.aborted += 1;
                    }
                    tracing::warn!(
                        drone_id = id,
                        order_id = ?order_id,
                        northing = at.northing,
                        easting = at.easting,
                        "drone left the map, order aborted"
                    );
                }
                _ => {}
            }
            if self.drones[id].status().is_in_flight() {
                still_flying.push(id);
            } else {
                self.free.push(id);
            }
            events.extend(event);
        }

        self.in_flight = still_flying;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    const BOUNDS: MapBoundaries = MapBoundaries {
        left: -1000.0,
        right: 1000.0,
        top: 1000.0,
        bottom: -1000.0,
    };

    fn profile() -> FlightProfile {
        FlightProfile {
            speed_mps: 27.0,
            step_s: 30.0,
            flight_altitude_m: 100.0,
            landing_steps: 0,
        }
    }

    fn accepted(id: u64, start: Coordinate, end: Coordinate) -> Order {
        let mut order = Order::new(id, start, end);
        order.advance(OrderStatus::Accepted);
        order
    }

    #[test]
    fn test_round_robin_homes() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(100.0, 100.0);
        let fleet = Fleet::new(5, vec![a, b], BOUNDS);
        let homes: Vec<_> = fleet.drones().iter().map(Drone::home).collect();
        assert_eq!(homes, vec![a, b, a, b, a]);
        assert_eq!(fleet.counts(), FleetCounts { free: 5, planning: 0, in_flight: 0 });
    }

    #[test]
    fn test_lists_stay_partitioned_through_a_delivery() {
        let home = Coordinate::new(0.0, 0.0);
        let mut fleet = Fleet::new(2, vec![home], BOUNDS);
        let mut planner = Planner::Straight;

        fleet.assign_orders(vec![(0, accepted(1, home, Coordinate::new(0.0, 270.0)))]);
        assert_eq!(fleet.counts(), FleetCounts { free: 1, planning: 1, in_flight: 0 });
        assert_eq!(fleet.held_orders(), 1);

        let mut ticks = 0;
        while fleet.has_active_drones() && ticks < 20 {
            assert_eq!(fleet.plan_drones_path(&mut planner, &profile()), 0);
            fleet.update_drones();
            assert_eq!(fleet.counts().total(), 2);
            ticks += 1;
        }
        assert_eq!(fleet.delivered(), 1);
        assert_eq!(fleet.held_orders(), 0);
        assert_eq!(fleet.counts(), FleetCounts { free: 2, planning: 0, in_flight: 0 });
        assert_eq!(fleet.drone(0).location(), home);
        assert!((fleet.drone(0).odometry().distance_m - 540.0).abs() < 1e-9);
    }

    #[test]
    fn test_abort_returns_drone_to_free_list() {
        let home = Coordinate::new(0.0, 0.0);
        let mut fleet = Fleet::new(1, vec![home], BOUNDS);
        let mut planner = Planner::Straight;
        fleet.assign_orders(vec![(0, accepted(1, home, Coordinate::new(0.0, 5000.0)))]);

        for _ in 0..20 {
            fleet.plan_drones_path(&mut planner, &profile());
            fleet.update_drones();
            if !fleet.has_active_drones() {
                break;
            }
        }
        assert_eq!(fleet.aborted(), 1);
        assert_eq!(fleet.delivered(), 0);
        assert_eq!(fleet.counts().free, 1);
        assert_eq!(fleet.drone(0).location(), home);
    }
}
