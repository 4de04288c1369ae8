//! Error types for the MAVLink MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the MAVLink MCP Server
#[derive(Error, Debug)]
pub enum MavlinkMcpError {
    /// MAVLink transport errors
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Vehicle protocol errors
    #[error("Vehicle error: {0}")]
    Vehicle(#[from] VehicleError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// UDP / frame level errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error("Failed to encode MAVLink frame: {message}")]
    Encode { message: String },

    #[error("Failed to send datagram: {message}")]
    Send { message: String },

    #[error("Failed to receive datagram: {message}")]
    Receive { message: String },
}

/// Errors reported by (or about) the connected vehicle
#[derive(Error, Debug)]
pub enum VehicleError {
    #[error("No heartbeat from an autopilot within {secs} seconds")]
    ConnectTimeout { secs: u64 },

    #[error("Vehicle not connected")]
    Disconnected,

    #[error("Command {command} rejected: {result}")]
    CommandRejected { command: String, result: String },

    #[error("Command {command} not acknowledged after {attempts} attempts")]
    CommandTimeout { command: String, attempts: u32 },

    #[error("Parameter {name} was not confirmed by the vehicle")]
    ParameterTimeout { name: String },

    #[error("Mission rejected: {result}")]
    MissionRejected { result: String },

    #[error("Mission transfer timed out: {stage}")]
    MissionTimeout { stage: String },

    #[error("No {stream} data within the timeout")]
    TelemetryTimeout { stream: String },

    #[error("No position estimate available")]
    NoPositionEstimate,

    #[error("Vehicle must be armed")]
    NotArmed,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field in mission point: {field}")]
    MissingField { field: String },

    #[error("Invalid {name}: {value}. Must be between {min} and {max}.")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for MAVLink MCP operations
pub type Result<T> = std::result::Result<T, MavlinkMcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidationError::OutOfRange {
            name: "latitude_deg".to_string(),
            value: 91.0,
            min: -90.0,
            max: 90.0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid latitude_deg: 91. Must be between -90 and 90."
        );
    }

    #[test]
    fn test_error_conversion() {
        let vehicle_err = VehicleError::NotArmed;
        let err: MavlinkMcpError = vehicle_err.into();
        assert!(matches!(err, MavlinkMcpError::Vehicle(_)));
    }
}
