//! Orders CSV: `Order ID, Start Northing, Start Easting, End Northing, End Easting`.

use crate::error::{Result, SimError};
use crate::models::{Coordinate, Order, OrderId};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct OrderRecord {
    #[serde(rename = "Order ID")]
    id: OrderId,
    #[serde(rename = "Start Northing")]
    start_northing: f64,
    #[serde(rename = "Start Easting")]
    start_easting: f64,
    #[serde(rename = "End Northing")]
    end_northing: f64,
    #[serde(rename = "End Easting")]
    end_easting: f64,
}

impl From<OrderRecord> for Order {
    fn from(record: OrderRecord) -> Self {
        Order::new(
            record.id,
            Coordinate::new(record.start_northing, record.start_easting),
            Coordinate::new(record.end_northing, record.end_easting),
        )
    }
}

impl From<&Order> for OrderRecord {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            start_northing: order.start.northing,
            start_easting: order.start.easting,
            end_northing: order.end.northing,
            end_easting: order.end.easting,
        }
    }
}

/// The first `limit` orders of a CSV stream, in row order.
pub fn read_orders<R: Read>(reader: R, limit: usize) -> Result<Vec<Order>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut orders = Vec::with_capacity(limit.min(4096));
    for record in reader.deserialize::<OrderRecord>().take(limit) {
        orders.push(record?.into());
    }
    Ok(orders)
}

/// The first `limit` orders of the CSV at `path`.
pub fn load_orders(path: &Path, limit: usize) -> Result<Vec<Order>> {
    let file = std::fs::File::open(path)
        .map_err(|err| SimError::from(err).with_context(format!("opening {}", path.display())))?;
    let orders = read_orders(std::io::BufReader::new(file), limit)?;
    tracing::info!(path = %path.display(), count = orders.len(), "loaded orders");
    Ok(orders)
}

pub fn write_orders<W: Write>(writer: W, orders: &[Order]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for order in orders {
        writer.serialize(OrderRecord::from(order))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_orders(path: &Path, orders: &[Order]) -> Result<()> {
    let mut buffer = Vec::new();
    write_orders(&mut buffer, orders)?;
    crate::persist::atomic_write(path, &buffer)
}
