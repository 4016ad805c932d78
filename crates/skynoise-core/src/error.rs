//! Error types for the simulation core.
//!
//! Loading and configuration failures are fatal and surface as [`SimError`].
//! Route planning failures are recoverable and surface as [`PlanningError`];
//! the fleet keeps the drone waiting and retries on the next tick.

use thiserror::Error;

/// Fatal errors raised while configuring or loading a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    /// File system errors
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Orders CSV errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Binary cache decode errors
    #[error("Binary decode error: {0}")]
    Encode(String),

    /// A navigation node has no projected position
    #[error("Navigation node ({row}, {col}) is missing easting/northing")]
    MissingCoordinate { row: u32, col: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown navigator type: {0}")]
    UnknownNavigator(String),

    /// A noise-aware navigator was selected without a navigation graph
    #[error("Navigator requires a navigation graph but none was loaded")]
    MissingNavigationGraph,

    /// Generic error with context
    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<SimError>,
    },
}

/// Result type alias for fatal simulation errors.
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    #[must_use]
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[must_use]
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Wraps an error with additional context.
    #[must_use]
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<bitcode::Error> for SimError {
    fn from(err: bitcode::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Recoverable route planning failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// No path exists between the two navigation nodes
    #[error("no path from node {from} to node {to}")]
    NoPath { from: u32, to: u32 },

    /// Pre-baked route lookup failed and compute-on-miss is disabled
    #[error("route not found in polyline cache")]
    CacheMiss,

    #[error("navigation graph has no nodes")]
    EmptyGraph,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::MissingCoordinate { row: 3, col: 7 };
        assert_eq!(
            err.to_string(),
            "Navigation node (3, 7) is missing easting/northing"
        );
    }

    #[test]
    fn test_error_context() {
        let err = SimError::invalid_config("drones must be > 0").with_context("building config");
        assert!(err.to_string().starts_with("building config"));
        assert!(err.to_string().contains("drones must be > 0"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SimError = io_err.into();
        assert!(matches!(err, SimError::Io(_)));
    }
}
