//! FIFO order dispatch to drones parked at each order's origin.

use crate::fleet::Fleet;
use crate::models::{Coordinate, DroneId, Order, OrderStatus};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    pending: VecDeque<Order>,
}

impl Dispatcher {
    pub fn new(orders: impl IntoIterator<Item = Order>) -> Self {
        Self {
            pending: orders.into_iter().collect(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.pending.iter()
    }

    /// Match pending orders to free drones standing at the order's start.
    ///
    /// Orders are scanned in arrival order. An order whose origin has no free
    /// drone this tick keeps its place in the queue. Returns the number of
    /// orders assigned.
    pub fn process_orders(&mut self, fleet: &mut Fleet) -> usize {
        if self.pending.is_empty() || fleet.free_drones().is_empty() {
            return 0;
        }

        let mut buckets: HashMap<Coordinate, VecDeque<DroneId>> = HashMap::new();
        for id in fleet.free_drones() {
            buckets
                .entry(fleet.drone(*id).location())
                .or_default()
                .push_back(*id);
        }

        let mut assignments = Vec::new();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        for mut order in self.pending.drain(..) {
            let drone = buckets
                .get_mut(&order.start)
                .and_then(|bucket| bucket.pop_front());
            match drone {
                Some(id) => {
                    order.advance(OrderStatus::Accepted);
                    assignments.push((id, order));
                }
                None => kept.push_back(order),
            }
        }
        self.pending = kept;

        let assigned = assignments.len();
        if assigned > 0 {
            tracing::debug!(assigned, pending = self.pending.len(), "orders dispatched");
        }
        fleet.assign_orders(assignments);
        assigned
    }
}
