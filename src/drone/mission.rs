//! Mission points and plan expansion
//!
//! A [`MissionPoint`] is what an agent describes; a [`MissionPlan`] is the
//! sequence of `MISSION_ITEM_INT` messages the autopilot receives.

use mavlink::common::{MavCmd, MavFrame, MISSION_ITEM_INT_DATA};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::error::{MavlinkMcpError, Result, ValidationError};

/// Hold time at a waypoint that is not flown through
const DEFAULT_HOLD_TIME_S: f32 = 0.5;

/// MAV_VTOL_STATE_MC
const VTOL_STATE_MC: f32 = 3.0;
/// MAV_VTOL_STATE_FW
const VTOL_STATE_FW: f32 = 4.0;
/// MAV_MOUNT_MODE_MAVLINK_TARGETING, carried in z of DO_MOUNT_CONTROL
const MOUNT_MODE_MAVLINK_TARGETING: f32 = 2.0;

/// Camera action performed at a mission point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CameraAction {
    #[default]
    #[serde(alias = "NONE")]
    None,
    #[serde(alias = "TAKE_PHOTO")]
    TakePhoto,
    #[serde(alias = "START_PHOTO_INTERVAL")]
    StartPhotoInterval,
    #[serde(alias = "STOP_PHOTO_INTERVAL")]
    StopPhotoInterval,
    #[serde(alias = "START_VIDEO")]
    StartVideo,
    #[serde(alias = "STOP_VIDEO")]
    StopVideo,
    #[serde(alias = "START_PHOTO_DISTANCE")]
    StartPhotoDistance,
    #[serde(alias = "STOP_PHOTO_DISTANCE")]
    StopPhotoDistance,
}

/// Vehicle action performed at a mission point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VehicleAction {
    #[default]
    #[serde(alias = "NONE")]
    None,
    #[serde(alias = "TAKEOFF")]
    Takeoff,
    #[serde(alias = "LAND")]
    Land,
    #[serde(alias = "TRANSITION_TO_FW")]
    TransitionToFw,
    #[serde(alias = "TRANSITION_TO_MC")]
    TransitionToMc,
}

/// One point of a mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MissionPoint {
    /// Latitude in degrees (range: -90 to +90)
    pub latitude_deg: f64,

    /// Longitude in degrees (range: -180 to +180)
    pub longitude_deg: f64,

    /// Altitude relative to the takeoff altitude in meters
    pub relative_altitude_m: f32,

    /// Speed in meters per second
    pub speed_m_s: f32,

    /// Whether to fly through the point or stop
    pub is_fly_through: bool,

    /// Gimbal pitch angle in degrees
    #[serde(default)]
    pub gimbal_pitch_deg: Option<f32>,

    /// Gimbal yaw angle in degrees
    #[serde(default)]
    pub gimbal_yaw_deg: Option<f32>,

    /// Camera action at the point
    #[serde(default)]
    pub camera_action: CameraAction,

    /// Loiter time in seconds
    #[serde(default)]
    pub loiter_time_s: Option<f32>,

    /// Camera photo interval in seconds
    #[serde(default)]
    pub camera_photo_interval_s: Option<f32>,

    /// Acceptance radius in meters
    #[serde(default)]
    pub acceptance_radius_m: Option<f32>,

    /// Yaw angle in degrees
    #[serde(default)]
    pub yaw_deg: Option<f32>,

    /// Camera photo distance in meters
    #[serde(default)]
    pub camera_photo_distance_m: Option<f32>,

    /// Vehicle action at the point
    #[serde(default)]
    pub vehicle_action: VehicleAction,
}

impl MissionPoint {
    /// Parse and validate a point from loose JSON
    pub fn from_value(value: Value) -> Result<Self> {
        let point: MissionPoint = serde_json::from_value(value).map_err(|e| {
            let message = e.to_string();
            let field = message
                .strip_prefix("missing field `")
                .and_then(|rest| rest.split('`').next())
                .map(|f| f.to_string());
            match field {
                Some(field) => MavlinkMcpError::Validation(ValidationError::MissingField { field }),
                None => MavlinkMcpError::Validation(ValidationError::InvalidParameter {
                    name: "mission_points".to_string(),
                    message,
                }),
            }
        })?;

        point.check()?;
        Ok(point)
    }

    /// Range checks
    pub fn check(&self) -> Result<()> {
        let Err(errors) = self.validate() else {
            return Ok(());
        };
        let fields = errors.field_errors();

        let (name, value, min, max) = if fields.contains_key("latitude_deg") {
            ("latitude_deg", self.latitude_deg, -90.0, 90.0)
        } else if fields.contains_key("longitude_deg") {
            ("longitude_deg", self.longitude_deg, -180.0, 180.0)
        } else {
            return Err(MavlinkMcpError::Validation(ValidationError::InvalidParameter {
                name: "mission_points".to_string(),
                message: errors.to_string(),
            }));
        };

        Err(MavlinkMcpError::Validation(ValidationError::OutOfRange {
            name: name.to_string(),
            value,
            min,
            max,
        }))
    }
}

impl Validate for MissionPoint {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !(-90.0..=90.0).contains(&self.latitude_deg) {
            errors.add("latitude_deg", validator::ValidationError::new("range"));
        }
        if !(-180.0..=180.0).contains(&self.longitude_deg) {
            errors.add("longitude_deg", validator::ValidationError::new("range"));
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Ordered mission items ready for upload
#[derive(Debug, Clone)]
pub struct MissionPlan {
    items: Vec<MISSION_ITEM_INT_DATA>,
    /// Mission point each item belongs to; the RTL item maps past the last point
    point_of_item: Vec<u16>,
    point_count: u16,
}

impl MissionPlan {
    /// Expand points into mission items.
    ///
    /// Appends a return-to-launch item when `return_to_launch` is set.
    pub fn from_points(points: &[MissionPoint], return_to_launch: bool) -> Result<Self> {
        if points.is_empty() {
            return Err(MavlinkMcpError::Validation(ValidationError::InvalidParameter {
                name: "mission_points".to_string(),
                message: "at least one mission point is required".to_string(),
            }));
        }
        let point_count = u16::try_from(points.len()).map_err(|_| {
            MavlinkMcpError::Validation(ValidationError::InvalidParameter {
                name: "mission_points".to_string(),
                message: format!("too many mission points ({})", points.len()),
            })
        })?;

        let mut builder = PlanBuilder::default();
        let mut last_speed: Option<f32> = None;

        for (index, point) in (0..point_count).zip(points) {
            point.check()?;
            builder.point = index;

            if last_speed != Some(point.speed_m_s) {
                builder.command(MavCmd::MAV_CMD_DO_CHANGE_SPEED, [1.0, point.speed_m_s, -1.0, 0.0]);
                last_speed = Some(point.speed_m_s);
            }

            if point.gimbal_pitch_deg.is_some() || point.gimbal_yaw_deg.is_some() {
                builder.push(
                    MavCmd::MAV_CMD_DO_MOUNT_CONTROL,
                    MavFrame::MAV_FRAME_MISSION,
                    [
                        point.gimbal_pitch_deg.unwrap_or(0.0),
                        0.0,
                        point.gimbal_yaw_deg.unwrap_or(0.0),
                        f32::NAN,
                    ],
                    0,
                    0,
                    MOUNT_MODE_MAVLINK_TARGETING,
                );
            }

            let hold = match point.loiter_time_s {
                Some(loiter) => loiter,
                None if point.is_fly_through => 0.0,
                None => DEFAULT_HOLD_TIME_S,
            };
            builder.nav(
                MavCmd::MAV_CMD_NAV_WAYPOINT,
                [
                    hold,
                    point.acceptance_radius_m.unwrap_or(0.0),
                    0.0,
                    point.yaw_deg.unwrap_or(f32::NAN),
                ],
                point,
            );

            builder.camera(point);
            builder.vehicle(point);
        }

        if return_to_launch {
            builder.point = point_count;
            builder.command(MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH, [0.0; 4]);
        }

        Ok(Self {
            items: builder.items,
            point_of_item: builder.point_of_item,
            point_count,
        })
    }

    pub fn items(&self) -> &[MISSION_ITEM_INT_DATA] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of mission points the plan was built from
    pub fn point_count(&self) -> u16 {
        self.point_count
    }

    /// Point index for every item, indexed by item seq
    pub fn point_of_item(&self) -> &[u16] {
        &self.point_of_item
    }

    /// Item for `seq`, addressed to the given target
    pub fn item_for(&self, seq: u16, target_system: u8, target_component: u8) -> Option<MISSION_ITEM_INT_DATA> {
        self.items.get(usize::from(seq)).map(|item| MISSION_ITEM_INT_DATA {
            target_system,
            target_component,
            ..item.clone()
        })
    }
}

#[derive(Default)]
struct PlanBuilder {
    items: Vec<MISSION_ITEM_INT_DATA>,
    point_of_item: Vec<u16>,
    /// Point the next pushed item belongs to
    point: u16,
}

impl PlanBuilder {
    fn push(&mut self, command: MavCmd, frame: MavFrame, params: [f32; 4], x: i32, y: i32, z: f32) {
        let seq = self.items.len() as u16;
        self.items.push(MISSION_ITEM_INT_DATA {
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            x,
            y,
            z,
            seq,
            command,
            frame,
            current: u8::from(seq == 0),
            autocontinue: 1,
            ..Default::default()
        });
        self.point_of_item.push(self.point);
    }

    fn command(&mut self, command: MavCmd, params: [f32; 4]) {
        self.push(command, MavFrame::MAV_FRAME_MISSION, params, 0, 0, f32::NAN);
    }

    fn nav(&mut self, command: MavCmd, params: [f32; 4], point: &MissionPoint) {
        self.push(
            command,
            MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            params,
            to_deg_e7(point.latitude_deg),
            to_deg_e7(point.longitude_deg),
            point.relative_altitude_m,
        );
    }

    fn camera(&mut self, point: &MissionPoint) {
        match point.camera_action {
            CameraAction::None => {}
            CameraAction::TakePhoto => {
                self.command(MavCmd::MAV_CMD_IMAGE_START_CAPTURE, [0.0, 0.0, 1.0, 0.0]);
            }
            CameraAction::StartPhotoInterval => {
                let interval = point.camera_photo_interval_s.unwrap_or(1.0);
                self.command(MavCmd::MAV_CMD_IMAGE_START_CAPTURE, [0.0, interval, 0.0, 0.0]);
            }
            CameraAction::StopPhotoInterval => {
                self.command(MavCmd::MAV_CMD_IMAGE_STOP_CAPTURE, [0.0; 4]);
            }
            CameraAction::StartVideo => {
                self.command(MavCmd::MAV_CMD_VIDEO_START_CAPTURE, [0.0; 4]);
            }
            CameraAction::StopVideo => {
                self.command(MavCmd::MAV_CMD_VIDEO_STOP_CAPTURE, [0.0; 4]);
            }
            CameraAction::StartPhotoDistance => {
                let distance = point.camera_photo_distance_m.unwrap_or(0.0);
                self.command(MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_DIST, [distance, 0.0, 1.0, 0.0]);
            }
            CameraAction::StopPhotoDistance => {
                self.command(MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_DIST, [0.0; 4]);
            }
        }
    }

    fn vehicle(&mut self, point: &MissionPoint) {
        match point.vehicle_action {
            VehicleAction::None => {}
            VehicleAction::Takeoff => {
                self.nav(MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, f32::NAN], point);
            }
            VehicleAction::Land => {
                self.nav(MavCmd::MAV_CMD_NAV_LAND, [0.0, 0.0, 0.0, f32::NAN], point);
            }
            VehicleAction::TransitionToFw => {
                self.command(MavCmd::MAV_CMD_DO_VTOL_TRANSITION, [VTOL_STATE_FW, 0.0, 0.0, 0.0]);
            }
            VehicleAction::TransitionToMc => {
                self.command(MavCmd::MAV_CMD_DO_VTOL_TRANSITION, [VTOL_STATE_MC, 0.0, 0.0, 0.0]);
            }
        }
    }
}

/// Degrees to MAVLink degE7
pub fn to_deg_e7(deg: f64) -> i32 {
    (deg * 1e7).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(lat: f64, lon: f64, speed: f32) -> MissionPoint {
        MissionPoint::from_value(json!({
            "latitude_deg": lat,
            "longitude_deg": lon,
            "relative_altitude_m": 10.0,
            "speed_m_s": speed,
            "is_fly_through": true
        }))
        .unwrap()
    }

    #[test]
    fn test_optional_fields_default() {
        let p = point(47.0, 8.0, 5.0);
        assert_eq!(p.camera_action, CameraAction::None);
        assert_eq!(p.vehicle_action, VehicleAction::None);
        assert!(p.loiter_time_s.is_none());
    }

    #[test]
    fn test_latitude_out_of_range() {
        let err = MissionPoint::from_value(json!({
            "latitude_deg": 91.5,
            "longitude_deg": 8.0,
            "relative_altitude_m": 10.0,
            "speed_m_s": 5.0,
            "is_fly_through": true
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Invalid latitude_deg: 91.5. Must be between -90 and 90."
        );
    }

    #[test]
    fn test_longitude_out_of_range() {
        let err = MissionPoint::from_value(json!({
            "latitude_deg": 10.0,
            "longitude_deg": -180.5,
            "relative_altitude_m": 10.0,
            "speed_m_s": 5.0,
            "is_fly_through": false
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Invalid longitude_deg: -180.5"));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let err = MissionPoint::from_value(json!({
            "latitude_deg": 10.0,
            "longitude_deg": 10.0,
            "relative_altitude_m": 10.0,
            "is_fly_through": true
        }))
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("Missing required field in mission point: speed_m_s"));
    }

    #[test]
    fn test_upper_case_actions_accepted() {
        let p = MissionPoint::from_value(json!({
            "latitude_deg": 10.0,
            "longitude_deg": 10.0,
            "relative_altitude_m": 10.0,
            "speed_m_s": 2.0,
            "is_fly_through": true,
            "camera_action": "TAKE_PHOTO",
            "vehicle_action": "land"
        }))
        .unwrap();
        assert_eq!(p.camera_action, CameraAction::TakePhoto);
        assert_eq!(p.vehicle_action, VehicleAction::Land);
    }

    #[test]
    fn test_plan_sequence_and_rtl() {
        let points = vec![point(47.0, 8.0, 5.0), point(47.001, 8.0, 5.0), point(47.002, 8.0, 7.0)];

        let plan = MissionPlan::from_points(&points, true).unwrap();
        let commands: Vec<MavCmd> = plan.items().iter().map(|i| i.command).collect();
        assert_eq!(
            commands,
            vec![
                MavCmd::MAV_CMD_DO_CHANGE_SPEED,
                MavCmd::MAV_CMD_NAV_WAYPOINT,
                MavCmd::MAV_CMD_NAV_WAYPOINT,
                MavCmd::MAV_CMD_DO_CHANGE_SPEED,
                MavCmd::MAV_CMD_NAV_WAYPOINT,
                MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
            ]
        );

        for (i, item) in plan.items().iter().enumerate() {
            assert_eq!(usize::from(item.seq), i);
            assert_eq!(item.current, u8::from(i == 0));
        }
        assert_eq!(plan.items()[1].x, 470_000_000);

        let without_rtl = MissionPlan::from_points(&points, false).unwrap();
        assert_eq!(without_rtl.len(), plan.len() - 1);
    }

    #[test]
    fn test_hold_time() {
        let mut stop = point(47.0, 8.0, 5.0);
        stop.is_fly_through = false;
        let plan = MissionPlan::from_points(&[stop.clone()], false).unwrap();
        assert_eq!(plan.items()[1].param1, DEFAULT_HOLD_TIME_S);

        stop.loiter_time_s = Some(4.0);
        let plan = MissionPlan::from_points(&[stop], false).unwrap();
        assert_eq!(plan.items()[1].param1, 4.0);
    }

    #[test]
    fn test_points_map_to_items() {
        let points = vec![point(47.0, 8.0, 5.0), point(47.001, 8.0, 5.0)];

        let plan = MissionPlan::from_points(&points, true).unwrap();
        assert_eq!(plan.point_count(), 2);
        // speed, wp0, wp1, rtl
        assert_eq!(plan.point_of_item(), &[0, 0, 1, 2]);
        assert_eq!(plan.point_of_item().len(), plan.len());

        let plan = MissionPlan::from_points(&points, false).unwrap();
        assert_eq!(plan.point_of_item(), &[0, 0, 1]);
    }

    #[test]
    fn test_gimbal_item_uses_mavlink_targeting() {
        let mut p = point(47.0, 8.0, 5.0);
        p.gimbal_pitch_deg = Some(-45.0);
        let plan = MissionPlan::from_points(&[p], false).unwrap();

        let mount = &plan.items()[1];
        assert_eq!(mount.command, MavCmd::MAV_CMD_DO_MOUNT_CONTROL);
        assert_eq!(mount.param1, -45.0);
        assert_eq!(mount.z, 2.0);
        assert_eq!(plan.point_of_item(), &[0, 0, 0]);
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(MissionPlan::from_points(&[], true).is_err());
    }

    #[test]
    fn test_item_for_addresses_target() {
        let plan = MissionPlan::from_points(&[point(47.0, 8.0, 5.0)], true).unwrap();
        let item = plan.item_for(1, 1, 1).unwrap();
        assert_eq!(item.target_system, 1);
        assert_eq!(item.seq, 1);
        assert!(plan.item_for(9, 1, 1).is_none());
    }
}
