//! Core data models for the delivery simulation.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A position in the projected (metric) coordinate system.
///
/// Equality and hashing use the exact bit pattern of both components, so a
/// drone "is at" a warehouse only when it holds the very same coordinate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    pub northing: f64,
    pub easting: f64,
}

impl Coordinate {
    pub const fn new(northing: f64, easting: f64) -> Self {
        Self { northing, easting }
    }

    /// Euclidean distance in metres.
    #[inline]
    pub fn distance(&self, other: &Coordinate) -> f64 {
        self.distance_sq(other).sqrt()
    }

    #[inline]
    pub fn distance_sq(&self, other: &Coordinate) -> f64 {
        let dn = self.northing - other.northing;
        let de = self.easting - other.easting;
        dn * dn + de * de
    }

    /// Point at `ratio` along the segment from `self` to `other`.
    #[inline]
    pub fn lerp(&self, other: &Coordinate, ratio: f64) -> Coordinate {
        Coordinate {
            northing: self.northing + (other.northing - self.northing) * ratio,
            easting: self.easting + (other.easting - self.easting) * ratio,
        }
    }

    pub(crate) fn bits(&self) -> (u64, u64) {
        (self.northing.to_bits(), self.easting.to_bits())
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// The fixed map rectangle, in projected metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBoundaries {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl MapBoundaries {
    /// Check the rectangle is well formed (`left < right`, `bottom < top`).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.left < self.right) {
            errors.push(format!(
                "left ({}) must be less than right ({})",
                self.left, self.right
            ));
        }
        if !(self.bottom < self.top) {
            errors.push(format!(
                "bottom ({}) must be less than top ({})",
                self.bottom, self.top
            ));
        }
        errors
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: &Coordinate) -> bool {
        point.easting >= self.left
            && point.easting <= self.right
            && point.northing >= self.bottom
            && point.northing <= self.top
    }

    pub fn width_m(&self) -> f64 {
        self.right - self.left
    }

    pub fn height_m(&self) -> f64 {
        self.top - self.bottom
    }
}

pub type OrderId = u64;
pub type DroneId = usize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Waiting in the dispatcher queue
    #[default]
    Unassigned,
    /// Matched to a drone that is collecting it
    Accepted,
    /// Picked up and on its way to the customer
    EnRoute,
    /// Dropped at the customer
    Delivered,
}

/// A delivery from a warehouse (`start`) to a customer (`end`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub start: Coordinate,
    pub end: Coordinate,
    #[serde(default)]
    pub status: OrderStatus,
}

impl Order {
    pub fn new(id: OrderId, start: Coordinate, end: Coordinate) -> Self {
        Self {
            id,
            start,
            end,
            status: OrderStatus::Unassigned,
        }
    }

    /// Move the order forward to `next`. Statuses only ever advance by one.
    pub fn advance(&mut self, next: OrderStatus) {
        debug_assert!(
            next as u8 == self.status as u8 + 1,
            "order {} cannot go from {:?} to {:?}",
            self.id,
            self.status,
            next
        );
        self.status = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_coordinate_equality_is_bitwise() {
        let a = Coordinate::new(0.1 + 0.2, 5.0);
        let b = Coordinate::new(0.3, 5.0);
        assert_ne!(a, b);
        assert_eq!(a, Coordinate::new(0.1 + 0.2, 5.0));

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&Coordinate::new(0.1 + 0.2, 5.0)));
        assert!(!set.contains(&b));
    }

    #[test]
    fn test_boundaries_validate() {
        let good = MapBoundaries {
            left: 0.0,
            right: 10.0,
            top: 10.0,
            bottom: 0.0,
        };
        assert!(good.validate().is_empty());
        let bad = MapBoundaries {
            left: 10.0,
            right: 0.0,
            top: 0.0,
            bottom: 0.0,
        };
        assert_eq!(bad.validate().len(), 2);
    }

    #[test]
    fn test_order_status_advances_in_sequence() {
        let mut order = Order::new(1, Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0));
        order.advance(OrderStatus::Accepted);
        order.advance(OrderStatus::EnRoute);
        order.advance(OrderStatus::Delivered);
        assert_eq!(order.status, OrderStatus::Delivered);
    }
}
