//! Seeded demo order datasets.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skynoise_core::{Coordinate, MapBoundaries, Order};

/// Parameters for a generated order set.
#[derive(Debug, Clone)]
pub struct DemoOrders {
    pub count: usize,
    /// Customers are placed within this many metres of their warehouse,
    /// per axis, then clamped to the map.
    pub max_radius_m: f64,
    pub seed: u64,
}

impl Default for DemoOrders {
    fn default() -> Self {
        Self {
            count: 100,
            max_radius_m: 3000.0,
            seed: 42,
        }
    }
}

impl DemoOrders {
    /// Warehouse to customer orders with ids `0..count`. The same seed
    /// always yields the same dataset.
    pub fn generate(&self, boundaries: &MapBoundaries, warehouses: &[Coordinate]) -> Vec<Order> {
        if warehouses.is_empty() {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let radius = self.max_radius_m.max(0.0);

        (0..self.count)
            .map(|id| {
                let start = warehouses[rng.random_range(0..warehouses.len())];
                let northing = start.northing + rng.random_range(-radius..=radius);
                let easting = start.easting + rng.random_range(-radius..=radius);
                let end = Coordinate::new(
                    northing.clamp(boundaries.bottom, boundaries.top),
                    easting.clamp(boundaries.left, boundaries.right),
                );
                Order::new(id as u64, start, end)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundaries() -> MapBoundaries {
        MapBoundaries {
            left: 0.0,
            right: 5000.0,
            top: 5000.0,
            bottom: 0.0,
        }
    }

    fn warehouses() -> Vec<Coordinate> {
        vec![Coordinate::new(1000.0, 1000.0), Coordinate::new(4000.0, 4500.0)]
    }

    #[test]
    fn test_same_seed_same_orders() {
        let demo = DemoOrders {
            count: 25,
            ..DemoOrders::default()
        };
        let a = demo.generate(&boundaries(), &warehouses());
        let b = demo.generate(&boundaries(), &warehouses());
        assert_eq!(a, b);
        assert_eq!(a.len(), 25);
        assert_eq!(a[24].id, 24);
    }

    #[test]
    fn test_orders_start_at_warehouses_and_stay_on_map() {
        let demo = DemoOrders {
            count: 200,
            max_radius_m: 8000.0,
            seed: 7,
        };
        let map = boundaries();
        for order in demo.generate(&map, &warehouses()) {
            assert!(warehouses().contains(&order.start));
            assert!(map.contains(&order.end));
        }
    }

    #[test]
    fn test_radius_bounds_customer_offset() {
        let demo = DemoOrders {
            count: 100,
            max_radius_m: 250.0,
            seed: 3,
        };
        for order in demo.generate(&boundaries(), &warehouses()) {
            assert!((order.end.northing - order.start.northing).abs() <= 250.0);
            assert!((order.end.easting - order.start.easting).abs() <= 250.0);
        }
    }

    #[test]
    fn test_no_warehouses_no_orders() {
        assert!(DemoOrders::default().generate(&boundaries(), &[]).is_empty());
    }
}
