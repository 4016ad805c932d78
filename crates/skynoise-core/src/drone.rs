//! Delivery drone state machine.
//!
//! A drone cycles `Free -> Collecting -> Delivering -> Returning -> Free`.
//! Each tick it consumes one sample of its planned route; reaching the end of
//! the route at its destination fires the next transition, which changes the
//! destination and flags the drone for re-planning.

use crate::models::{Coordinate, DroneId, MapBoundaries, Order, OrderId, OrderStatus};
use crate::planner::Route;
use crate::spatial::nearest_linear;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneStatus {
    Free,
    Collecting,
    Delivering,
    Returning,
}

impl DroneStatus {
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, DroneStatus::Free)
    }
}

/// Notable outcome of one drone step.
#[derive(Debug, Clone, PartialEq)]
pub enum DroneEvent {
    /// Reached the order origin; now carrying the parcel
    PickedUp { drone_id: DroneId, order_id: OrderId },
    /// Reached the customer; heading back to a warehouse
    Delivered { drone_id: DroneId, order_id: OrderId },
    /// Back at a warehouse and free for a new order
    Returned { drone_id: DroneId, warehouse: Coordinate },
    /// Next sample left the map; the undelivered order, if any, was dropped
    Aborted {
        drone_id: DroneId,
        order_id: Option<OrderId>,
        at: Coordinate,
    },
}

/// Cumulative travel counters of one drone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub steps: u64,
    pub distance_m: f64,
    pub completed_trips: u64,
}

#[derive(Debug, Clone)]
pub struct Drone {
    id: DroneId,
    home: Coordinate,
    location: Coordinate,
    altitude: f64,
    status: DroneStatus,
    order: Option<Order>,
    destination: Option<Coordinate>,
    path: Vec<Coordinate>,
    altitudes: Vec<f64>,
    cursor: usize,
    needs_planning: bool,
    odometry: Odometry,
}

impl Drone {
    /// A free drone parked at `home`.
    pub fn new(id: DroneId, home: Coordinate) -> Self {
        Self {
            id,
            home,
            location: home,
            altitude: 0.0,
            status: DroneStatus::Free,
            order: None,
            destination: None,
            path: Vec::new(),
            altitudes: Vec::new(),
            cursor: 0,
            needs_planning: false,
            odometry: Odometry::default(),
        }
    }

    pub fn id(&self) -> DroneId {
        self.id
    }

    pub fn home(&self) -> Coordinate {
        self.home
    }

    pub fn location(&self) -> Coordinate {
        self.location
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn status(&self) -> DroneStatus {
        self.status
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn destination(&self) -> Option<Coordinate> {
        self.destination
    }

    pub fn needs_planning(&self) -> bool {
        self.needs_planning
    }

    pub fn odometry(&self) -> Odometry {
        self.odometry
    }

    /// Samples of the current route not yet flown.
    pub fn remaining_samples(&self) -> usize {
        self.path.len().saturating_sub(self.cursor)
    }

    /// Whether the drone carries an order that has not been delivered yet.
    pub fn holds_undelivered_order(&self) -> bool {
        self.order
            .as_ref()
            .is_some_and(|order| order.status < OrderStatus::Delivered)
    }

    /// Take an accepted order and head for its origin.
    pub fn assign(&mut self, order: Order) {
        debug_assert_eq!(self.status, DroneStatus::Free);
        debug_assert_eq!(order.status, OrderStatus::Accepted);
        self.destination = Some(order.start);
        self.order = Some(order);
        self.status = DroneStatus::Collecting;
        self.needs_planning = true;
    }

    /// Replace the current route.
    pub fn set_route(&mut self, route: Route) {
        debug_assert_eq!(route.path.len(), route.altitudes.len());
        self.path = route.path;
        self.altitudes = route.altitudes;
        self.cursor = 0;
        self.needs_planning = false;
    }

    /// Advance one tick along the route, firing a transition on arrival.
    pub fn update_position(
        &mut self,
        boundaries: &MapBoundaries,
        warehouses: &[Coordinate],
    ) -> Option<DroneEvent> {
        if !self.status.is_in_flight() {
            return None;
        }

        if let Some(&next) = self.path.get(self.cursor) {
            if !boundaries.contains(&next) {
                return Some(self.abort(warehouses));
            }
            self.odometry.distance_m += self.location.distance(&next);
            self.odometry.steps += 1;
            self.location = next;
            self.altitude = self.altitudes.get(self.cursor).copied().unwrap_or(self.altitude);
            self.cursor += 1;
        } else if self.needs_planning {
            // Still waiting for a route.
            return None;
        }

        if self.cursor < self.path.len() {
            return None;
        }
        if self.destination == Some(self.location) {
            self.transition(warehouses)
        } else {
            self.needs_planning = true;
            None
        }
    }

    fn transition(&mut self, warehouses: &[Coordinate]) -> Option<DroneEvent> {
        let drone_id = self.id;
        self.needs_planning = true;
        match self.status {
            DroneStatus::Free => None,
            DroneStatus::Collecting => {
                let order = self.order.as_mut()?;
                order.advance(OrderStatus::EnRoute);
                self.destination = Some(order.end);
                self.status = DroneStatus::Delivering;
                Some(DroneEvent::PickedUp {
                    drone_id,
                    order_id: order.id,
                })
            }
            DroneStatus::Delivering => {
                let order = self.order.as_mut()?;
                order.advance(OrderStatus::Delivered);
                let order_id = order.id;
                self.destination = Some(self.nearest_warehouse(warehouses));
                self.status = DroneStatus::Returning;
                Some(DroneEvent::Delivered { drone_id, order_id })
            }
            DroneStatus::Returning => {
                let warehouse = self.location;
                self.park();
                self.odometry.completed_trips += 1;
                Some(DroneEvent::Returned {
                    drone_id,
                    warehouse,
                })
            }
        }
    }

    /// Drop the order and teleport to the nearest warehouse. Odometry is kept.
    fn abort(&mut self, warehouses: &[Coordinate]) -> DroneEvent {
        let at = self.location;
        let order_id = self
            .holds_undelivered_order()
            .then(|| self.order.as_ref().map(|order| order.id))
            .flatten();
        self.location = self.nearest_warehouse(warehouses);
        self.park();
        DroneEvent::Aborted {
            drone_id: self.id,
            order_id,
            at,
        }
    }

    fn park(&mut self) {
        self.status = DroneStatus::Free;
        self.order = None;
        self.destination = None;
        self.path.clear();
        self.altitudes.clear();
        self.cursor = 0;
        self.altitude = 0.0;
        self.needs_planning = false;
    }

    fn nearest_warehouse(&self, warehouses: &[Coordinate]) -> Coordinate {
        nearest_linear(warehouses, &self.location)
            .map(|idx| warehouses[idx])
            .unwrap_or(self.home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::FlightProfile;

    const BOUNDS: MapBoundaries = MapBoundaries {
        left: -1000.0,
        right: 1000.0,
        top: 1000.0,
        bottom: -1000.0,
    };

    fn route(points: &[Coordinate]) -> Route {
        FlightProfile {
            speed_mps: 27.0,
            step_s: 30.0,
            flight_altitude_m: 100.0,
            landing_steps: 0,
        }
        .with_altitudes(points.to_vec())
    }

    fn accepted(id: OrderId, start: Coordinate, end: Coordinate) -> Order {
        let mut order = Order::new(id, start, end);
        order.advance(OrderStatus::Accepted);
        order
    }

    #[test]
    fn test_full_delivery_cycle() {
        let home = Coordinate::new(0.0, 0.0);
        let customer = Coordinate::new(0.0, 270.0);
        let warehouses = [home];
        let mut drone = Drone::new(0, home);
        drone.assign(accepted(7, home, customer));
        assert_eq!(drone.status(), DroneStatus::Collecting);
        assert!(drone.needs_planning());

        drone.set_route(route(&[home]));
        let event = drone.update_position(&BOUNDS, &warehouses);
        assert_eq!(event, Some(DroneEvent::PickedUp { drone_id: 0, order_id: 7 }));
        assert_eq!(drone.order().unwrap().status, OrderStatus::EnRoute);
        assert_eq!(drone.destination(), Some(customer));

        drone.set_route(route(&[home, customer]));
        assert_eq!(drone.update_position(&BOUNDS, &warehouses), None);
        let event = drone.update_position(&BOUNDS, &warehouses);
        assert_eq!(event, Some(DroneEvent::Delivered { drone_id: 0, order_id: 7 }));
        assert_eq!(drone.status(), DroneStatus::Returning);
        assert_eq!(drone.destination(), Some(home));

        drone.set_route(route(&[customer, home]));
        drone.update_position(&BOUNDS, &warehouses);
        let event = drone.update_position(&BOUNDS, &warehouses);
        assert_eq!(event, Some(DroneEvent::Returned { drone_id: 0, warehouse: home }));
        assert_eq!(drone.status(), DroneStatus::Free);
        assert!(drone.order().is_none());

        let odometry = drone.odometry();
        assert_eq!(odometry.steps, 5);
        assert!((odometry.distance_m - 540.0).abs() < 1e-9);
        assert_eq!(odometry.completed_trips, 1);
    }

    #[test]
    fn test_waits_without_route() {
        let home = Coordinate::new(0.0, 0.0);
        let mut drone = Drone::new(1, home);
        drone.assign(accepted(1, home, Coordinate::new(0.0, 500.0)));
        assert_eq!(drone.update_position(&BOUNDS, &[home]), None);
        assert_eq!(drone.status(), DroneStatus::Collecting);
        assert_eq!(drone.odometry().steps, 0);
    }

    #[test]
    fn test_altitude_follows_profile() {
        let home = Coordinate::new(0.0, 0.0);
        let mut drone = Drone::new(2, home);
        drone.assign(accepted(1, home, Coordinate::new(0.0, 500.0)));
        drone.set_route(Route {
            path: vec![home, home, home],
            altitudes: vec![0.0, 50.0, 100.0],
        });
        drone.update_position(&BOUNDS, &[home]);
        assert_eq!(drone.altitude(), 0.0);
        drone.update_position(&BOUNDS, &[home]);
        assert_eq!(drone.altitude(), 50.0);
        assert_eq!(drone.remaining_samples(), 1);
    }

    #[test]
    fn test_boundary_violation_aborts_and_keeps_odometry() {
        let home = Coordinate::new(0.0, 0.0);
        let other = Coordinate::new(500.0, 500.0);
        let outside = Coordinate::new(0.0, 5000.0);
        let mut drone = Drone::new(3, home);
        drone.assign(accepted(9, home, outside));
        drone.set_route(route(&[Coordinate::new(400.0, 400.0), outside]));
        assert_eq!(drone.update_position(&BOUNDS, &[home, other]), None);
        let steps = drone.odometry().steps;

        let event = drone.update_position(&BOUNDS, &[home, other]);
        assert_eq!(
            event,
            Some(DroneEvent::Aborted {
                drone_id: 3,
                order_id: Some(9),
                at: Coordinate::new(400.0, 400.0),
            })
        );
        assert_eq!(drone.status(), DroneStatus::Free);
        assert_eq!(drone.location(), other);
        assert_eq!(drone.odometry().steps, steps);
        assert!(drone.odometry().distance_m > 0.0);
    }

    #[test]
    fn test_replans_when_route_ends_short() {
        let home = Coordinate::new(0.0, 0.0);
        let mut drone = Drone::new(4, home);
        drone.assign(accepted(1, Coordinate::new(0.0, 100.0), Coordinate::new(0.0, 500.0)));
        drone.set_route(route(&[Coordinate::new(0.0, 50.0)]));
        assert_eq!(drone.update_position(&BOUNDS, &[home]), None);
        assert!(drone.needs_planning());
    }
}
