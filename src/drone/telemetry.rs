//! Telemetry snapshot
//!
//! Folds incoming MAVLink messages into the latest known vehicle state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use mavlink::common::{
    MavAutopilot, MavMessage, MavModeFlag, MavSeverity, MavState, MavType, HIGHRES_IMU_DATA,
};
use mavlink::MavHeader;
use serde::Serialize;

use crate::config::drone::{HEARTBEAT_LOSS_SECS, STATUS_TEXT_CAPACITY};
use crate::drone::mission::MissionPlan;

/// Mean earth radius used for small offsets
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// System/component that answers our commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VehicleTarget {
    pub system_id: u8,
    pub component_id: u8,
}

/// Global position estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Altitude above mean sea level
    pub absolute_altitude_m: f32,
    /// Altitude above home
    pub relative_altitude_m: f32,
    /// None when the autopilot reports an unknown heading
    pub heading_deg: Option<f32>,
}

impl GlobalPosition {
    /// Translate a body-frame offset (right, forward) into a new lat/lon.
    ///
    /// An unknown heading is treated as north.
    pub fn offset_body(&self, right_m: f64, forward_m: f64) -> (f64, f64) {
        let heading = f64::from(self.heading_deg.unwrap_or(0.0)).to_radians();
        let north = forward_m * heading.cos() - right_m * heading.sin();
        let east = forward_m * heading.sin() + right_m * heading.cos();

        let d_lat = (north / EARTH_RADIUS_M).to_degrees();
        let d_lon = (east / (EARTH_RADIUS_M * self.latitude_deg.to_radians().cos())).to_degrees();

        (self.latitude_deg + d_lat, self.longitude_deg + d_lon)
    }
}

/// Local NED position relative to the EKF origin (home)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalPosition {
    pub north_m: f32,
    pub east_m: f32,
    pub down_m: f32,
}

/// Home position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HomePosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f32,
}

/// A STATUSTEXT from the vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusText {
    pub severity: String,
    pub text: String,
}

/// Mission progress counted in mission points; `current == total` once finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MissionProgress {
    pub current: u16,
    pub total: u16,
}

/// Body-frame (forward, right, down) vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One HIGHRES_IMU reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImuSample {
    pub timestamp_us: u64,
    /// m/s^2
    pub acceleration: Vector3,
    /// rad/s
    pub angular_velocity: Vector3,
    /// gauss
    pub magnetic_field: Vector3,
    pub temperature_degc: f32,
}

impl From<&HIGHRES_IMU_DATA> for ImuSample {
    fn from(data: &HIGHRES_IMU_DATA) -> Self {
        Self {
            timestamp_us: data.time_usec,
            acceleration: Vector3 {
                x: data.xacc,
                y: data.yacc,
                z: data.zacc,
            },
            angular_velocity: Vector3 {
                x: data.xgyro,
                y: data.ygyro,
                z: data.zgyro,
            },
            magnetic_field: Vector3 {
                x: data.xmag,
                y: data.ymag,
                z: data.zmag,
            },
            temperature_degc: data.temperature,
        }
    }
}

/// Health flags gating the startup wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Health {
    pub is_global_position_ok: bool,
    pub is_home_position_ok: bool,
}

/// Latest-value view of the vehicle
#[derive(Debug, Default)]
pub struct TelemetrySnapshot {
    pub target: Option<VehicleTarget>,
    pub last_heartbeat: Option<Instant>,
    pub armed: bool,
    pub system_status: Option<MavState>,
    pub global: Option<GlobalPosition>,
    pub local: Option<LocalPosition>,
    pub home: Option<HomePosition>,
    pub mission_progress: Option<MissionProgress>,
    /// Point count of the last uploaded mission
    pub mission_total: Option<u16>,
    /// Point index of each uploaded item, indexed by seq
    mission_points: Vec<u16>,
    status_texts: VecDeque<StatusText>,
}

impl TelemetrySnapshot {
    /// Fold one message into the snapshot
    pub fn apply(&mut self, header: &MavHeader, message: &MavMessage) {
        if let MavMessage::HEARTBEAT(data) = message {
            if !is_autopilot(data.autopilot, data.mavtype) {
                return;
            }
            let target = *self.target.get_or_insert(VehicleTarget {
                system_id: header.system_id,
                component_id: header.component_id,
            });
            if target.system_id != header.system_id || target.component_id != header.component_id {
                return;
            }

            self.last_heartbeat = Some(Instant::now());
            self.armed = data.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
            self.system_status = Some(data.system_status);
            return;
        }

        // Everything else only counts once we know who the autopilot is
        match self.target {
            Some(target) if target.system_id == header.system_id => {}
            _ => return,
        }

        match message {
            MavMessage::GLOBAL_POSITION_INT(data) => {
                self.global = Some(GlobalPosition {
                    latitude_deg: f64::from(data.lat) / 1e7,
                    longitude_deg: f64::from(data.lon) / 1e7,
                    absolute_altitude_m: data.alt as f32 / 1000.0,
                    relative_altitude_m: data.relative_alt as f32 / 1000.0,
                    heading_deg: (data.hdg != u16::MAX).then(|| f32::from(data.hdg) / 100.0),
                });
            }
            MavMessage::LOCAL_POSITION_NED(data) => {
                self.local = Some(LocalPosition {
                    north_m: data.x,
                    east_m: data.y,
                    down_m: data.z,
                });
            }
            MavMessage::HOME_POSITION(data) => {
                self.home = Some(HomePosition {
                    latitude_deg: f64::from(data.latitude) / 1e7,
                    longitude_deg: f64::from(data.longitude) / 1e7,
                    altitude_m: data.altitude as f32 / 1000.0,
                });
            }
            MavMessage::STATUSTEXT(data) => {
                let status = StatusText {
                    severity: severity_name(data.severity),
                    text: trim_text(&data.text[..]),
                };
                tracing::info!("Status: {}: {}", status.severity, status.text);
                if self.status_texts.len() == STATUS_TEXT_CAPACITY {
                    self.status_texts.pop_front();
                }
                self.status_texts.push_back(status);
            }
            MavMessage::MISSION_CURRENT(data) => {
                if let Some(total) = self.mission_total {
                    let current = self
                        .mission_points
                        .get(usize::from(data.seq))
                        .copied()
                        .unwrap_or(total);
                    self.mission_progress = Some(MissionProgress {
                        current: current.min(total),
                        total,
                    });
                }
            }
            MavMessage::MISSION_ITEM_REACHED(data) => {
                if let Some(total) = self.mission_total {
                    if usize::from(data.seq) + 1 >= self.mission_points.len() {
                        self.mission_progress = Some(MissionProgress { current: total, total });
                    }
                }
            }
            _ => {}
        }
    }

    /// Whether a heartbeat arrived recently
    pub fn is_connected(&self) -> bool {
        self.last_heartbeat
            .map(|at| at.elapsed() < Duration::from_secs(HEARTBEAT_LOSS_SECS))
            .unwrap_or(false)
    }

    /// Position health as used by the startup wait
    pub fn health(&self) -> Health {
        Health {
            is_global_position_ok: self
                .global
                .map(|g| g.latitude_deg != 0.0 || g.longitude_deg != 0.0)
                .unwrap_or(false),
            is_home_position_ok: self.home.is_some(),
        }
    }

    /// Remove and return buffered status texts, oldest first
    pub fn drain_status_texts(&mut self) -> Vec<StatusText> {
        self.status_texts.drain(..).collect()
    }

    /// Reset progress for a freshly uploaded mission
    pub fn begin_mission(&mut self, plan: &MissionPlan) {
        let total = plan.point_count();
        self.mission_total = Some(total);
        self.mission_points = plan.point_of_item().to_vec();
        self.mission_progress = Some(MissionProgress { current: 0, total });
    }
}

fn is_autopilot(autopilot: MavAutopilot, mavtype: MavType) -> bool {
    autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID && mavtype != MavType::MAV_TYPE_GCS
}

/// `MAV_SEVERITY_WARNING` -> `WARNING`
pub fn severity_name(severity: MavSeverity) -> String {
    let name = format!("{:?}", severity);
    name.trim_start_matches("MAV_SEVERITY_").to_string()
}

/// Decode a NUL padded char array
pub fn trim_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::mission::MissionPoint;
    use mavlink::common::{
        GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, MISSION_CURRENT_DATA, MISSION_ITEM_REACHED_DATA,
        STATUSTEXT_DATA,
    };

    fn header(system_id: u8) -> MavHeader {
        MavHeader {
            system_id,
            component_id: 1,
            sequence: 0,
        }
    }

    fn heartbeat(autopilot: MavAutopilot, armed: bool) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot,
            base_mode: if armed {
                MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
            } else {
                MavModeFlag::empty()
            },
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn status_text(text: &str) -> MavMessage {
        let mut bytes = [0u8; 50];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            severity: MavSeverity::MAV_SEVERITY_WARNING,
            text: bytes.into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_heartbeat_sets_target_and_armed() {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(&header(1), &heartbeat(MavAutopilot::MAV_AUTOPILOT_PX4, true));

        assert_eq!(
            snapshot.target,
            Some(VehicleTarget {
                system_id: 1,
                component_id: 1
            })
        );
        assert!(snapshot.armed);
        assert!(snapshot.is_connected());

        snapshot.apply(&header(1), &heartbeat(MavAutopilot::MAV_AUTOPILOT_PX4, false));
        assert!(!snapshot.armed);
    }

    #[test]
    fn test_gcs_heartbeats_are_ignored() {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(&header(255), &heartbeat(MavAutopilot::MAV_AUTOPILOT_INVALID, false));
        assert!(snapshot.target.is_none());
        assert!(!snapshot.is_connected());
    }

    #[test]
    fn test_global_position_conversion() {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(&header(1), &heartbeat(MavAutopilot::MAV_AUTOPILOT_PX4, false));
        snapshot.apply(
            &header(1),
            &MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
                lat: 473_977_418,
                lon: 85_455_938,
                alt: 488_000,
                relative_alt: 10_000,
                hdg: u16::MAX,
                ..Default::default()
            }),
        );

        let global = snapshot.global.unwrap();
        assert!((global.latitude_deg - 47.3977418).abs() < 1e-9);
        assert!((global.longitude_deg - 8.5455938).abs() < 1e-9);
        assert!((global.relative_altitude_m - 10.0).abs() < 1e-3);
        assert_eq!(global.heading_deg, None);
        assert!(snapshot.health().is_global_position_ok);
        assert!(!snapshot.health().is_home_position_ok);
    }

    #[test]
    fn test_messages_before_target_are_ignored() {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(&header(1), &status_text("too early"));
        assert!(snapshot.drain_status_texts().is_empty());
    }

    #[test]
    fn test_status_text_ring() {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(&header(1), &heartbeat(MavAutopilot::MAV_AUTOPILOT_PX4, false));
        for i in 0..(STATUS_TEXT_CAPACITY + 3) {
            snapshot.apply(&header(1), &status_text(&format!("msg {}", i)));
        }

        let texts = snapshot.drain_status_texts();
        assert_eq!(texts.len(), STATUS_TEXT_CAPACITY);
        assert_eq!(texts[0].text, "msg 3");
        assert_eq!(texts[0].severity, "WARNING");
        assert!(snapshot.drain_status_texts().is_empty());
    }

    #[test]
    fn test_offset_body_rotates_by_heading() {
        let origin = GlobalPosition {
            latitude_deg: 47.0,
            longitude_deg: 8.0,
            absolute_altitude_m: 500.0,
            relative_altitude_m: 10.0,
            heading_deg: None,
        };

        // Heading unknown (north): forward moves north
        let (lat, lon) = origin.offset_body(0.0, 10.0);
        assert!(lat > origin.latitude_deg);
        assert!((lon - origin.longitude_deg).abs() < 1e-9);
        let north_m = (lat - origin.latitude_deg).to_radians() * EARTH_RADIUS_M;
        assert!((north_m - 10.0).abs() < 1e-6);

        // Facing east: forward moves east, right moves south
        let east_facing = GlobalPosition {
            heading_deg: Some(90.0),
            ..origin
        };
        let (lat, lon) = east_facing.offset_body(0.0, 10.0);
        assert!(lon > origin.longitude_deg);
        assert!((lat - origin.latitude_deg).abs() < 1e-9);

        let (lat, _) = east_facing.offset_body(5.0, 0.0);
        assert!(lat < origin.latitude_deg);
    }

    #[test]
    fn test_mission_progress_counts_points() {
        let points: Vec<MissionPoint> = [8.0, 8.001, 8.002]
            .iter()
            .map(|lon| {
                MissionPoint::from_value(serde_json::json!({
                    "latitude_deg": 47.0,
                    "longitude_deg": lon,
                    "relative_altitude_m": 10.0,
                    "speed_m_s": 5.0,
                    "is_fly_through": true
                }))
                .unwrap()
            })
            .collect();
        // speed, wp0, wp1, wp2, rtl
        let plan = MissionPlan::from_points(&points, true).unwrap();

        let mut snapshot = TelemetrySnapshot::default();
        snapshot.apply(&header(1), &heartbeat(MavAutopilot::MAV_AUTOPILOT_PX4, true));
        snapshot.apply(&header(1), &MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA { seq: 1, ..Default::default() }));
        assert!(snapshot.mission_progress.is_none());

        snapshot.begin_mission(&plan);
        assert_eq!(snapshot.mission_progress, Some(MissionProgress { current: 0, total: 3 }));

        snapshot.apply(&header(1), &MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA { seq: 3, ..Default::default() }));
        assert_eq!(snapshot.mission_progress, Some(MissionProgress { current: 2, total: 3 }));

        // Flying home after the last point
        snapshot.apply(&header(1), &MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA { seq: 4, ..Default::default() }));
        assert_eq!(snapshot.mission_progress, Some(MissionProgress { current: 3, total: 3 }));

        snapshot.begin_mission(&plan);
        snapshot.apply(
            &header(1),
            &MavMessage::MISSION_ITEM_REACHED(MISSION_ITEM_REACHED_DATA { seq: 3 }),
        );
        assert_eq!(snapshot.mission_progress, Some(MissionProgress { current: 0, total: 3 }));
        snapshot.apply(
            &header(1),
            &MavMessage::MISSION_ITEM_REACHED(MISSION_ITEM_REACHED_DATA { seq: 4 }),
        );
        assert_eq!(snapshot.mission_progress, Some(MissionProgress { current: 3, total: 3 }));
    }

    #[test]
    fn test_trim_text() {
        assert_eq!(trim_text(b"Takeoff detected\0\0\0"), "Takeoff detected");
        assert_eq!(trim_text(b"no terminator"), "no terminator");
    }
}
