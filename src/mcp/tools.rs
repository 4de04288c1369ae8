//! MCP Tool definitions and handlers
//!
//! Defines the drone tools and maps them onto [`Vehicle`] operations.

use std::sync::Arc;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::drone::DEFAULT_TAKEOFF_ALTITUDE_M;
use crate::drone::mission::{MissionPlan, MissionPoint};
use crate::drone::Vehicle;
use crate::error::McpError;
use crate::mcp::types::{CallToolResult, Tool};

/// Tool handler
pub struct ToolHandler {
    vehicle: Arc<Vehicle>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(vehicle: Arc<Vehicle>) -> Self {
        Self { vehicle }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def("arm_drone", "Arm the drone.", no_args_schema()),
            tool_def(
                "get_position",
                "Get the position of the drone. Relative positions are north/east/down meters from home; global positions are latitude, longitude and altitude above mean sea level.",
                schema_for::<GetPositionArgs>(),
            ),
            tool_def(
                "move_to_relative",
                "Move the drone relative to the current position. The drone must be armed. lr: right is positive, fb: front is positive, altitude: change relative to the current point, yaw: heading change in degrees.",
                schema_for::<MoveToRelativeArgs>(),
            ),
            tool_def(
                "takeoff",
                "Command the drone to initiate takeoff and ascend to a specified altitude. The drone must be armed.",
                schema_for::<TakeoffArgs>(),
            ),
            tool_def(
                "land",
                "Command the drone to initiate landing at its current location.",
                no_args_schema(),
            ),
            tool_def(
                "print_status_text",
                "Return the status text messages received from the drone since the last call.",
                no_args_schema(),
            ),
            tool_def(
                "get_imu",
                "Fetch the first n IMU data points from the drone.",
                schema_for::<GetImuArgs>(),
            ),
            tool_def(
                "print_mission_progress",
                "Return the mission progress of the drone.",
                no_args_schema(),
            ),
            tool_def(
                "initiate_mission",
                "Initiate a mission with a list of mission points. The drone must be armed. Each point needs latitude_deg (-90 to 90), longitude_deg (-180 to 180), relative_altitude_m, speed_m_s and is_fly_through; the other fields are optional.",
                schema_for::<InitiateMissionArgs>(),
            ),
            tool_def(
                "get_vehicle_status",
                "Get connection, arming and position health of the drone.",
                no_args_schema(),
            ),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        tracing::debug!("Calling tool {}", name);
        match name {
            "arm_drone" => self.handle_arm().await,
            "get_position" => self.handle_get_position(args),
            "move_to_relative" => self.handle_move_to_relative(args).await,
            "takeoff" => self.handle_takeoff(args).await,
            "land" => self.handle_land().await,
            "print_status_text" => self.handle_print_status_text(),
            "get_imu" => self.handle_get_imu(args).await,
            "print_mission_progress" => self.handle_print_mission_progress().await,
            "initiate_mission" => self.handle_initiate_mission(args).await,
            "get_vehicle_status" => CallToolResult::json(&self.vehicle.status()),
            _ => CallToolResult::error(
                McpError::UnknownTool {
                    name: name.to_string(),
                }
                .to_string(),
            ),
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_arm(&self) -> CallToolResult {
        match self.vehicle.arm().await {
            Ok(()) => CallToolResult::text("true"),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    fn handle_get_position(&self, args: Value) -> CallToolResult {
        let args: GetPositionArgs = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        match self.vehicle.position(args.relative) {
            Ok(position) => CallToolResult::json(&position),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_move_to_relative(&self, args: Value) -> CallToolResult {
        let args: MoveToRelativeArgs = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        let values = [args.lr, args.fb, args.altitude, args.yaw];
        if values.iter().any(|v| !v.is_finite()) {
            return CallToolResult::error(
                McpError::InvalidArguments {
                    message: "lr, fb, altitude and yaw must be finite".to_string(),
                }
                .to_string(),
            );
        }

        match self
            .vehicle
            .move_to_relative(args.lr, args.fb, args.altitude, args.yaw)
            .await
        {
            Ok(()) => CallToolResult::text("true"),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_takeoff(&self, args: Value) -> CallToolResult {
        let args: TakeoffArgs = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        if !args.takeoff_altitude.is_finite() || args.takeoff_altitude <= 0.0 {
            return CallToolResult::error(format!(
                "Invalid takeoff_altitude: {}. Must be greater than 0.",
                args.takeoff_altitude
            ));
        }
        let altitude = args.takeoff_altitude as f32;

        // Autopilots without the takeoff parameter read the altitude from the command
        let in_command = match self.vehicle.set_takeoff_altitude(altitude).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Takeoff altitude parameter not set ({}), passing it in the command", e);
                Some(altitude)
            }
        };

        match self.vehicle.takeoff(in_command).await {
            Ok(()) => CallToolResult::text("true"),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_land(&self) -> CallToolResult {
        match self.vehicle.land().await {
            Ok(()) => CallToolResult::text("true"),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    fn handle_print_status_text(&self) -> CallToolResult {
        let texts = self.vehicle.status_texts();
        if texts.is_empty() {
            return CallToolResult::text("No status text received");
        }

        let lines: Vec<String> = texts
            .iter()
            .map(|t| format!("Status: {}: {}", t.severity, t.text))
            .collect();
        CallToolResult::text(lines.join("\n"))
    }

    async fn handle_get_imu(&self, args: Value) -> CallToolResult {
        let args: GetImuArgs = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        match self.vehicle.imu(args.n).await {
            Ok(samples) => CallToolResult::json(&samples),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_print_mission_progress(&self) -> CallToolResult {
        match self.vehicle.mission_progress().await {
            Ok(Some(progress)) => {
                let text = format!("Mission progress: {}/{}", progress.current, progress.total);
                tracing::info!("{}", text);
                CallToolResult::text(text)
            }
            Ok(None) => CallToolResult::text("No mission progress received"),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }

    async fn handle_initiate_mission(&self, args: Value) -> CallToolResult {
        let args: InitiateMissionArgs = match parse_args(args) {
            Ok(a) => a,
            Err(result) => return result,
        };

        let mut points = Vec::with_capacity(args.mission_points.len());
        for value in args.mission_points {
            match MissionPoint::from_value(value) {
                Ok(point) => points.push(point),
                Err(e) => return CallToolResult::error(e.to_string()),
            }
        }

        let plan = match MissionPlan::from_points(&points, args.return_to_launch) {
            Ok(plan) => plan,
            Err(e) => return CallToolResult::error(e.to_string()),
        };

        if let Err(e) = self.vehicle.upload_mission(&plan).await {
            return CallToolResult::error(e.to_string());
        }

        match self.vehicle.start_mission().await {
            Ok(()) => CallToolResult::text("true"),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }
}

// ==================== Tool Arguments ====================

#[derive(Debug, Deserialize, JsonSchema)]
struct GetPositionArgs {
    /// Whether the position is relative to home or in the global coordinate system
    relative: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MoveToRelativeArgs {
    /// Distance along the left/right axis in meters; right is positive
    lr: f64,
    /// Distance along the front/back axis in meters; front is positive
    fb: f64,
    /// Altitude change relative to the current point in meters
    altitude: f64,
    /// Yaw change in degrees
    yaw: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TakeoffArgs {
    /// The altitude to ascend to after takeoff, in meters
    #[serde(default = "default_takeoff_altitude")]
    takeoff_altitude: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetImuArgs {
    /// The number of IMU data points to fetch
    #[serde(default = "default_imu_count")]
    n: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct InitiateMissionArgs {
    /// Mission points in flight order
    #[schemars(with = "Vec<MissionPoint>")]
    mission_points: Vec<Value>,
    /// Whether to return to launch after completing the mission
    #[serde(default = "default_true")]
    return_to_launch: bool,
}

fn default_takeoff_altitude() -> f64 {
    DEFAULT_TAKEOFF_ALTITUDE_M
}

fn default_imu_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Null arguments count as an empty object
fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, CallToolResult> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        CallToolResult::error(
            McpError::InvalidArguments {
                message: e.to_string(),
            }
            .to_string(),
        )
    })
}

// ==================== Schema Definitions ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn no_args_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

fn schema_for<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or_else(|_| no_args_schema())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_takeoff_defaults() {
        let args: TakeoffArgs = parse_args(Value::Null).unwrap();
        assert_eq!(args.takeoff_altitude, 10.0);

        let args: GetImuArgs = parse_args(json!({})).unwrap();
        assert_eq!(args.n, 1);
    }

    #[test]
    fn test_missing_argument_is_tool_error() {
        let result = parse_args::<GetPositionArgs>(json!({})).unwrap_err();
        assert!(result.is_error);
    }

    #[test]
    fn test_mission_schema_inlines_points() {
        let schema = schema_for::<InitiateMissionArgs>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["mission_points"]));

        let point = &schema["properties"]["mission_points"]["items"];
        assert!(point["properties"]["latitude_deg"].is_object());
        assert!(point["properties"]["camera_action"].is_object());
        assert!(schema.get("definitions").is_none());
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn test_move_schema_requires_all_axes() {
        let schema = schema_for::<MoveToRelativeArgs>();
        let required = schema["required"].as_array().unwrap();
        for axis in ["lr", "fb", "altitude", "yaw"] {
            assert!(required.contains(&json!(axis)));
        }
    }
}
