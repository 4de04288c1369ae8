//! Drone side of the bridge
//!
//! MAVLink transport, telemetry folding, mission planning and the vehicle session.

pub mod link;
pub mod mission;
pub mod telemetry;
pub mod vehicle;

pub use vehicle::Vehicle;
