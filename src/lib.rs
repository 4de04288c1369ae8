//! MAVLink MCP Server Library
//!
//! A Model Context Protocol (MCP) server that lets an agent fly a
//! MAVLink drone: arm, take off, move, land, read telemetry and run missions.

pub mod config;
pub mod drone;
pub mod error;
pub mod mcp;

pub use config::Config;
pub use error::{MavlinkMcpError, Result};
