//! Support code for the `skynoise` command line tool.

pub mod demo;
pub mod logging;
pub mod output;

pub use demo::DemoOrders;
pub use output::{write_outcome, RunReport, WrittenFiles};
