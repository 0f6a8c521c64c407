//! Unified error handling for the marker-cluster library.
//!
//! The clustering and geometry algorithms are total and never fail. Errors
//! only arise at the fallible edges: configuration validation, payload
//! parsing at the FFI boundary, and commands sent to a torn-down layer.

use std::fmt;

/// Unified error type for marker-cluster operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    /// A configuration value is out of range
    InvalidConfig { field: String, message: String },
    /// A point payload could not be parsed
    InvalidPayload { point_id: String, message: String },
    /// The layer has been shut down and no longer accepts commands
    LayerShutDown,
    /// The background worker could not be started or has exited
    WorkerUnavailable { message: String },
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::InvalidConfig { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
            ClusterError::InvalidPayload { point_id, message } => {
                write!(f, "Point '{}' has an invalid payload: {}", point_id, message)
            }
            ClusterError::LayerShutDown => write!(f, "Cluster layer has been shut down"),
            ClusterError::WorkerUnavailable { message } => {
                write!(f, "Cluster worker unavailable: {}", message)
            }
        }
    }
}

impl std::error::Error for ClusterError {}

/// Result type alias for marker-cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
