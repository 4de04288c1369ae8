//! Configuration management for the MAVLink MCP Server
//!
//! Handles environment variables, defaults and the derived socket addresses.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, MavlinkMcpError, Result};

/// Configuration for the MAVLink MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Local address to listen on (empty means all interfaces)
    pub address: String,

    /// Local UDP port to listen on
    pub port: u16,

    /// Fixed autopilot endpoint; learned from the first datagram when unset
    pub remote: Option<SocketAddr>,

    /// Our MAVLink system id (GCS)
    pub system_id: u8,

    /// Our MAVLink component id
    pub component_id: u8,

    /// How long to wait for the first autopilot heartbeat
    pub connect_timeout: Duration,

    /// How long to wait for a position estimate before serving anyway
    pub position_timeout: Duration,

    /// Per-attempt wait for acknowledgements
    pub command_timeout: Duration,

    /// Resends after the first attempt
    pub command_retries: u32,

    /// GCS heartbeat period
    pub heartbeat_interval: Duration,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let defaults = Self::default();

        let remote = match std::env::var("MAVLINK_REMOTE") {
            Ok(value) if !value.trim().is_empty() => Some(parse_value("MAVLINK_REMOTE", &value)?),
            _ => None,
        };

        Ok(Self {
            address: std::env::var("MAVLINK_ADDRESS").unwrap_or(defaults.address),
            port: env_or("MAVLINK_PORT", defaults.port)?,
            remote,
            system_id: env_or("MAVLINK_SYSTEM_ID", defaults.system_id)?,
            component_id: env_or("MAVLINK_COMPONENT_ID", defaults.component_id)?,
            connect_timeout: Duration::from_secs(env_or(
                "MAVLINK_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            position_timeout: Duration::from_secs(env_or(
                "MAVLINK_POSITION_TIMEOUT_SECS",
                defaults.position_timeout.as_secs(),
            )?),
            command_timeout: Duration::from_secs(env_or(
                "MAVLINK_COMMAND_TIMEOUT_SECS",
                defaults.command_timeout.as_secs(),
            )?),
            command_retries: env_or("MAVLINK_COMMAND_RETRIES", defaults.command_retries)?,
            heartbeat_interval: defaults.heartbeat_interval,
        })
    }

    /// Socket address to bind the UDP link to
    pub fn bind_addr(&self) -> String {
        let host = if self.address.trim().is_empty() {
            "0.0.0.0"
        } else {
            self.address.trim()
        };
        format!("{}:{}", host, self.port)
    }

    /// Check values that the types alone cannot rule out
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_zero() {
            return Err(MavlinkMcpError::Config(ConfigError::InvalidConfig {
                message: "command timeout must be at least one second".to_string(),
            }));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(MavlinkMcpError::Config(ConfigError::InvalidConfig {
                message: "heartbeat interval must be positive".to_string(),
            }));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: drone::DEFAULT_PORT,
            remote: None,
            system_id: drone::GCS_SYSTEM_ID,
            component_id: drone::GCS_COMPONENT_ID,
            connect_timeout: Duration::from_secs(60),
            position_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(3),
            command_retries: 3,
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

fn env_or<T: FromStr>(var: &str, default: T) -> Result<T> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_value(var, &value),
        _ => Ok(default),
    }
}

fn parse_value<T: FromStr>(var: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        MavlinkMcpError::Config(ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
        })
    })
}

/// Drone / MAVLink constants
pub mod drone {
    /// PX4 SITL offboard API port
    pub const DEFAULT_PORT: u16 = 14540;

    /// Conventional ground station system id
    pub const GCS_SYSTEM_ID: u8 = 255;

    /// MAV_COMP_ID_MISSIONPLANNER
    pub const GCS_COMPONENT_ID: u8 = 190;

    /// HIGHRES_IMU message id
    pub const HIGHRES_IMU_MESSAGE_ID: u32 = 105;

    /// Requested IMU stream rate
    pub const IMU_RATE_HZ: f32 = 200.0;

    /// Upper bound for a single get_imu call
    pub const MAX_IMU_SAMPLES: u32 = 1000;

    /// PX4 takeoff altitude parameter
    pub const TAKEOFF_ALTITUDE_PARAM: &str = "MIS_TAKEOFF_ALT";

    /// Default takeoff altitude in meters
    pub const DEFAULT_TAKEOFF_ALTITUDE_M: f64 = 10.0;

    /// Heartbeat silence after which the vehicle counts as lost (seconds)
    pub const HEARTBEAT_LOSS_SECS: u64 = 5;

    /// Status text ring capacity
    pub const STATUS_TEXT_CAPACITY: usize = 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 14540);
        assert_eq!(config.system_id, 255);
        assert!(config.remote.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_addr_defaults_to_all_interfaces() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:14540");

        let config = Config {
            address: "127.0.0.1".to_string(),
            port: 14550,
            ..Config::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:14550");
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let result: Result<u16> = parse_value("MAVLINK_PORT", "not-a-port");
        assert!(matches!(
            result,
            Err(MavlinkMcpError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_zero_command_timeout_is_invalid() {
        let config = Config {
            command_timeout: std::time::Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
