//! Vehicle session
//!
//! Owns the MAVLink link, keeps the telemetry snapshot current and implements
//! the command, parameter and mission protocols on top of it.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use mavlink::common::{
    MavAutopilot, MavCmd, MavFrame, MavMessage, MavMissionResult, MavModeFlag,
    MavParamType, MavResult, MavState, MavType, COMMAND_INT_DATA, COMMAND_LONG_DATA,
    HEARTBEAT_DATA, MISSION_COUNT_DATA, PARAM_SET_DATA,
};
use mavlink::MavHeader;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::drone::{
    HIGHRES_IMU_MESSAGE_ID, IMU_RATE_HZ, MAX_IMU_SAMPLES, TAKEOFF_ALTITUDE_PARAM,
};
use crate::config::Config;
use crate::drone::link::MavlinkLink;
use crate::drone::mission::{to_deg_e7, MissionPlan};
use crate::drone::telemetry::{
    trim_text, GlobalPosition, Health, HomePosition, ImuSample, MissionProgress, StatusText,
    TelemetrySnapshot, VehicleTarget,
};
use crate::error::{MavlinkMcpError, Result, ValidationError, VehicleError};

/// A received message with its header
pub type Inbound = (MavHeader, MavMessage);

/// Fan-out buffer for received messages
const CHANNEL_CAPACITY: usize = 1024;

/// Pause after a failed receive before trying again
const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// MAV_DO_REPOSITION_FLAGS_CHANGE_MODE
const REPOSITION_CHANGE_MODE: f32 = 1.0;

/// Protocol timing used by a running vehicle session
#[derive(Debug, Clone)]
pub struct VehicleSettings {
    pub command_timeout: Duration,
    pub command_retries: u32,
    pub heartbeat_interval: Duration,
}

impl From<&Config> for VehicleSettings {
    fn from(config: &Config) -> Self {
        Self {
            command_timeout: config.command_timeout,
            command_retries: config.command_retries,
            heartbeat_interval: config.heartbeat_interval,
        }
    }
}

/// Point-in-time summary for agents
#[derive(Debug, Clone, Serialize)]
pub struct VehicleStatus {
    pub connected: bool,
    pub armed: bool,
    pub system_status: Option<String>,
    pub target: Option<VehicleTarget>,
    pub health: Health,
    pub global_position: Option<GlobalPosition>,
    pub home_position: Option<HomePosition>,
    pub mission_progress: Option<MissionProgress>,
}

/// Where a relative move ends up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepositionTarget {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub relative_altitude_m: f32,
    /// None keeps the current yaw behaviour
    pub yaw_deg: Option<f32>,
}

impl RepositionTarget {
    /// Resolve a body-frame move from `origin`.
    ///
    /// `right_m`/`forward_m` are rotated by the current heading, `up_m` is
    /// added to the current relative altitude and `yaw_deg` to the heading.
    pub fn from_body_offset(
        origin: &GlobalPosition,
        right_m: f64,
        forward_m: f64,
        up_m: f64,
        yaw_deg: f64,
    ) -> Self {
        let (latitude_deg, longitude_deg) = origin.offset_body(right_m, forward_m);
        let yaw_deg = match origin.heading_deg {
            Some(heading) => Some((f64::from(heading) + yaw_deg).rem_euclid(360.0) as f32),
            None if yaw_deg == 0.0 => None,
            None => Some(yaw_deg.rem_euclid(360.0) as f32),
        };

        Self {
            latitude_deg,
            longitude_deg,
            relative_altitude_m: origin.relative_altitude_m + up_m as f32,
            yaw_deg,
        }
    }
}

enum MissionEvent {
    Request(u16),
    Ack(MavMissionResult),
}

/// A connected (or connecting) vehicle
pub struct Vehicle {
    link: Arc<MavlinkLink>,
    telemetry: Arc<RwLock<TelemetrySnapshot>>,
    messages: broadcast::Sender<Inbound>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    settings: VehicleSettings,
}

impl Vehicle {
    /// Bind the link, wait for the autopilot and for a position estimate
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let addr = config.bind_addr();
        tracing::info!("Connecting to drone at {}", addr);
        let link =
            MavlinkLink::bind(&addr, config.remote, config.system_id, config.component_id).await?;
        let vehicle = Self::start(link, VehicleSettings::from(config));

        // Port 0 binds an ephemeral port; log the one the autopilot must reach
        let listening = vehicle
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or(addr);
        tracing::info!("Waiting for drone to connect at {}", listening);
        if let Err(e) = vehicle.wait_for_heartbeat(config.connect_timeout).await {
            vehicle.close().await;
            return Err(e);
        }
        tracing::info!("Connected to drone at {}!", listening);

        tracing::info!("Waiting for drone to have a global position estimate...");
        match vehicle.wait_for_position(config.position_timeout).await? {
            Some(health) => tracing::info!(
                "Global position {}, home position {}",
                health.is_global_position_ok,
                health.is_home_position_ok
            ),
            None => tracing::warn!(
                "No position estimate after {}s, continuing without one",
                config.position_timeout.as_secs()
            ),
        }

        Ok(vehicle)
    }

    /// Start the receive and heartbeat tasks on an already bound link
    pub fn start(link: MavlinkLink, settings: VehicleSettings) -> Self {
        let link = Arc::new(link);
        let telemetry = Arc::new(RwLock::new(TelemetrySnapshot::default()));
        let (messages, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&link),
            Arc::clone(&telemetry),
            messages.clone(),
            shutdown.subscribe(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&link),
            settings.heartbeat_interval,
            shutdown.subscribe(),
        ));

        Self {
            link,
            telemetry,
            messages,
            shutdown,
            tasks: Mutex::new(vec![receiver, heartbeat]),
            settings,
        }
    }

    /// Local address of the link
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.link.local_addr()
    }

    /// Wait until an autopilot heartbeat has been seen
    pub async fn wait_for_heartbeat(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.messages.subscribe();
        if self.read(|t| t.is_connected()) {
            return Ok(());
        }

        let seen = self
            .wait_for(&mut rx, timeout, |_, message| match message {
                MavMessage::HEARTBEAT(_) => self.read(|t| t.is_connected()).then_some(()),
                _ => None,
            })
            .await?;

        seen.ok_or_else(|| {
            VehicleError::ConnectTimeout {
                secs: timeout.as_secs(),
            }
            .into()
        })
    }

    /// Wait for a global or home position; `None` on timeout
    pub async fn wait_for_position(&self, timeout: Duration) -> Result<Option<Health>> {
        let ready = |health: Health| health.is_global_position_ok || health.is_home_position_ok;

        let mut rx = self.messages.subscribe();
        let health = self.read(|t| t.health());
        if ready(health) {
            return Ok(Some(health));
        }

        self.wait_for(&mut rx, timeout, |_, _| {
            let health = self.read(|t| t.health());
            ready(health).then_some(health)
        })
        .await
    }

    // ==================== Actions ====================

    /// Arm the motors
    pub async fn arm(&self) -> Result<()> {
        tracing::info!("Arming");
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .await
    }

    /// Set the altitude used by the next takeoff
    pub async fn set_takeoff_altitude(&self, altitude_m: f32) -> Result<()> {
        self.set_param(TAKEOFF_ALTITUDE_PARAM, altitude_m).await
    }

    /// Take off.
    ///
    /// Without an altitude the autopilot uses its takeoff parameter; with one
    /// the altitude travels in the command itself (ArduPilot reads param7).
    pub async fn takeoff(&self, altitude_m: Option<f32>) -> Result<()> {
        tracing::info!("Initiating takeoff");
        self.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, altitude_m.unwrap_or(f32::NAN)],
        )
        .await
    }

    /// Land at the current location
    pub async fn land(&self) -> Result<()> {
        tracing::info!("Initiating landing");
        self.command_long(
            MavCmd::MAV_CMD_NAV_LAND,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, f32::NAN],
        )
        .await
    }

    /// Fly to a body-frame offset from the current position
    pub async fn move_to_relative(&self, right_m: f64, forward_m: f64, up_m: f64, yaw_deg: f64) -> Result<()> {
        let (armed, global) = self.read(|t| (t.armed, t.global));
        if !armed {
            return Err(VehicleError::NotArmed.into());
        }
        let origin = global.ok_or(VehicleError::NoPositionEstimate)?;
        let target = RepositionTarget::from_body_offset(&origin, right_m, forward_m, up_m, yaw_deg);

        tracing::info!(
            "Moving to {:.7}, {:.7} at {:.1} m",
            target.latitude_deg,
            target.longitude_deg,
            target.relative_altitude_m
        );

        let yaw = target.yaw_deg.map(|deg| deg.to_radians()).unwrap_or(f32::NAN);
        self.command_int(
            MavCmd::MAV_CMD_DO_REPOSITION,
            MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            [-1.0, REPOSITION_CHANGE_MODE, 0.0, yaw],
            to_deg_e7(target.latitude_deg),
            to_deg_e7(target.longitude_deg),
            target.relative_altitude_m,
        )
        .await
    }

    // ==================== Telemetry ====================

    /// Current position.
    ///
    /// Relative: north/east/down meters from home. Global: lat, lon, AMSL altitude.
    pub fn position(&self, relative: bool) -> Result<[f64; 3]> {
        let (local, global) = self.read(|t| (t.local, t.global));
        if relative {
            let local = local.ok_or(VehicleError::NoPositionEstimate)?;
            Ok([
                f64::from(local.north_m),
                f64::from(local.east_m),
                f64::from(local.down_m),
            ])
        } else {
            let global = global.ok_or(VehicleError::NoPositionEstimate)?;
            Ok([
                global.latitude_deg,
                global.longitude_deg,
                f64::from(global.absolute_altitude_m),
            ])
        }
    }

    /// Take all buffered status texts
    pub fn status_texts(&self) -> Vec<StatusText> {
        self.write(|t| t.drain_status_texts())
    }

    /// Collect `count` IMU samples at the high-rate stream
    pub async fn imu(&self, count: u32) -> Result<Vec<ImuSample>> {
        if count == 0 || count > MAX_IMU_SAMPLES {
            return Err(MavlinkMcpError::Validation(ValidationError::InvalidParameter {
                name: "n".to_string(),
                message: format!("must be between 1 and {}", MAX_IMU_SAMPLES),
            }));
        }

        let interval_us = 1_000_000.0 / IMU_RATE_HZ;
        if let Err(e) = self
            .command_long(
                MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
                [HIGHRES_IMU_MESSAGE_ID as f32, interval_us, 0.0, 0.0, 0.0, 0.0, 0.0],
            )
            .await
        {
            tracing::warn!("Could not set IMU rate: {}", e);
        }

        let target = self.target()?;
        let mut rx = self.messages.subscribe();
        let mut samples = Vec::with_capacity(count as usize);

        while samples.len() < count as usize {
            let sample = self
                .wait_for(&mut rx, self.settings.command_timeout, |header, message| {
                    match message {
                        MavMessage::HIGHRES_IMU(data) if header.system_id == target.system_id => {
                            Some(ImuSample::from(data))
                        }
                        _ => None,
                    }
                })
                .await?;

            match sample {
                Some(sample) => samples.push(sample),
                None => {
                    return Err(VehicleError::TelemetryTimeout {
                        stream: "IMU".to_string(),
                    }
                    .into())
                }
            }
        }

        Ok(samples)
    }

    /// Latest mission progress, waiting briefly for a first report
    pub async fn mission_progress(&self) -> Result<Option<MissionProgress>> {
        let mut rx = self.messages.subscribe();
        if let Some(progress) = self.read(|t| t.mission_progress) {
            return Ok(Some(progress));
        }

        self.wait_for(&mut rx, self.settings.command_timeout, |_, message| match message {
            MavMessage::MISSION_CURRENT(_) | MavMessage::MISSION_ITEM_REACHED(_) => {
                self.read(|t| t.mission_progress)
            }
            _ => None,
        })
        .await
    }

    /// Summary of connection and position state
    pub fn status(&self) -> VehicleStatus {
        self.read(|t| VehicleStatus {
            connected: t.is_connected(),
            armed: t.armed,
            system_status: t
                .system_status
                .map(|s| format!("{:?}", s).trim_start_matches("MAV_STATE_").to_string()),
            target: t.target,
            health: t.health(),
            global_position: t.global,
            home_position: t.home,
            mission_progress: t.mission_progress,
        })
    }

    // ==================== Missions ====================

    /// Upload a mission plan using the MISSION_COUNT / MISSION_REQUEST handshake
    pub async fn upload_mission(&self, plan: &MissionPlan) -> Result<()> {
        let target = self.target()?;
        let count = u16::try_from(plan.len()).map_err(|_| {
            MavlinkMcpError::Validation(ValidationError::InvalidParameter {
                name: "mission_points".to_string(),
                message: format!("mission has too many items ({})", plan.len()),
            })
        })?;

        let mut rx = self.messages.subscribe();
        let mission_count = MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            count,
            target_system: target.system_id,
            target_component: target.component_id,
            ..Default::default()
        });

        tracing::info!("Uploading mission");
        self.send(mission_count.clone()).await?;

        let mut count_resends = 0;
        let mut last_seq: Option<u16> = None;

        loop {
            let event = self
                .wait_for(&mut rx, self.settings.command_timeout, |header, message| {
                    if header.system_id != target.system_id {
                        return None;
                    }
                    match message {
                        MavMessage::MISSION_REQUEST_INT(request) => Some(MissionEvent::Request(request.seq)),
                        MavMessage::MISSION_REQUEST(request) => Some(MissionEvent::Request(request.seq)),
                        MavMessage::MISSION_ACK(ack) => Some(MissionEvent::Ack(ack.mavtype)),
                        _ => None,
                    }
                })
                .await?;

            match event {
                Some(MissionEvent::Request(seq)) => {
                    let item = plan
                        .item_for(seq, target.system_id, target.component_id)
                        .ok_or_else(|| VehicleError::MissionRejected {
                            result: format!("autopilot requested unknown item {}", seq),
                        })?;
                    tracing::debug!("Sending mission item {}/{}", seq + 1, count);
                    self.send(MavMessage::MISSION_ITEM_INT(item)).await?;
                    last_seq = Some(seq);
                }
                Some(MissionEvent::Ack(MavMissionResult::MAV_MISSION_ACCEPTED)) => break,
                Some(MissionEvent::Ack(result)) => {
                    return Err(VehicleError::MissionRejected {
                        result: format!("{:?}", result),
                    }
                    .into());
                }
                None if last_seq.is_none() && count_resends < self.settings.command_retries => {
                    count_resends += 1;
                    tracing::debug!("Resending MISSION_COUNT ({})", count_resends);
                    self.send(mission_count.clone()).await?;
                }
                None => {
                    let stage = match last_seq {
                        None => "waiting for the first item request".to_string(),
                        Some(seq) => format!("after item {}", seq),
                    };
                    return Err(VehicleError::MissionTimeout { stage }.into());
                }
            }
        }

        self.write(|t| t.begin_mission(plan));
        Ok(())
    }

    /// Start the uploaded mission
    pub async fn start_mission(&self) -> Result<()> {
        tracing::info!("Starting mission");
        self.command_long(MavCmd::MAV_CMD_MISSION_START, [0.0; 7]).await
    }

    /// Stop background tasks
    pub async fn close(&self) {
        tracing::info!("Disconnecting drone");
        let _ = self.shutdown.send(true);

        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            let _ = task.await;
        }
    }

    // ==================== Protocol plumbing ====================

    /// Send COMMAND_LONG and wait for an accepting COMMAND_ACK
    pub async fn command_long(&self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        let target = self.target()?;
        self.send_command(command, target, |confirmation| {
            MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
                param1: params[0],
                param2: params[1],
                param3: params[2],
                param4: params[3],
                param5: params[4],
                param6: params[5],
                param7: params[6],
                command,
                target_system: target.system_id,
                target_component: target.component_id,
                confirmation,
            })
        })
        .await
    }

    /// Send COMMAND_INT and wait for an accepting COMMAND_ACK
    pub async fn command_int(
        &self,
        command: MavCmd,
        frame: MavFrame,
        params: [f32; 4],
        x: i32,
        y: i32,
        z: f32,
    ) -> Result<()> {
        let target = self.target()?;
        self.send_command(command, target, |_| {
            MavMessage::COMMAND_INT(COMMAND_INT_DATA {
                param1: params[0],
                param2: params[1],
                param3: params[2],
                param4: params[3],
                x,
                y,
                z,
                command,
                target_system: target.system_id,
                target_component: target.component_id,
                frame,
                current: 0,
                autocontinue: 0,
            })
        })
        .await
    }

    async fn send_command(
        &self,
        command: MavCmd,
        target: VehicleTarget,
        build: impl Fn(u8) -> MavMessage,
    ) -> Result<()> {
        let attempts = self.settings.command_retries + 1;
        let mut rx = self.messages.subscribe();

        for attempt in 0..attempts {
            let confirmation = u8::try_from(attempt).unwrap_or(u8::MAX);
            self.send(build(confirmation)).await?;

            if self.await_ack(&mut rx, command, target).await? {
                return Ok(());
            }
            tracing::debug!("No ack for {:?} (attempt {}/{})", command, attempt + 1, attempts);
        }

        Err(VehicleError::CommandTimeout {
            command: format!("{:?}", command),
            attempts,
        }
        .into())
    }

    /// `Ok(false)` when no final ack arrived in time
    async fn await_ack(
        &self,
        rx: &mut broadcast::Receiver<Inbound>,
        command: MavCmd,
        target: VehicleTarget,
    ) -> Result<bool> {
        loop {
            let result = self
                .wait_for(rx, self.settings.command_timeout, |header, message| match message {
                    MavMessage::COMMAND_ACK(ack)
                        if ack.command == command && header.system_id == target.system_id =>
                    {
                        Some(ack.result)
                    }
                    _ => None,
                })
                .await?;

            match result {
                None => return Ok(false),
                Some(MavResult::MAV_RESULT_ACCEPTED) => return Ok(true),
                Some(MavResult::MAV_RESULT_IN_PROGRESS) => continue,
                Some(other) => {
                    return Err(VehicleError::CommandRejected {
                        command: format!("{:?}", command),
                        result: format!("{:?}", other),
                    }
                    .into())
                }
            }
        }
    }

    /// PARAM_SET a REAL32 parameter and wait for the PARAM_VALUE echo
    async fn set_param(&self, name: &str, value: f32) -> Result<()> {
        let target = self.target()?;
        let mut param_id = [0u8; 16];
        let len = name.len().min(param_id.len());
        param_id[..len].copy_from_slice(&name.as_bytes()[..len]);

        let mut rx = self.messages.subscribe();
        for _ in 0..=self.settings.command_retries {
            self.send(MavMessage::PARAM_SET(PARAM_SET_DATA {
                param_value: value,
                target_system: target.system_id,
                target_component: target.component_id,
                param_id: param_id.into(),
                param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
            }))
            .await?;

            let echoed = self
                .wait_for(&mut rx, self.settings.command_timeout, |header, message| match message {
                    MavMessage::PARAM_VALUE(param)
                        if header.system_id == target.system_id
                            && trim_text(&param.param_id[..]) == name =>
                    {
                        Some(param.param_value)
                    }
                    _ => None,
                })
                .await?;

            match echoed {
                Some(actual) if (actual - value).abs() <= f32::EPSILON * value.abs().max(1.0) => {
                    tracing::debug!("{} set to {}", name, actual);
                    return Ok(());
                }
                Some(actual) => {
                    return Err(VehicleError::CommandRejected {
                        command: format!("PARAM_SET {}", name),
                        result: format!("vehicle kept {}", actual),
                    }
                    .into())
                }
                None => continue,
            }
        }

        Err(VehicleError::ParameterTimeout {
            name: name.to_string(),
        }
        .into())
    }

    async fn send(&self, message: MavMessage) -> Result<()> {
        if self.link.send(&message).await? {
            Ok(())
        } else {
            Err(VehicleError::Disconnected.into())
        }
    }

    fn target(&self) -> Result<VehicleTarget> {
        self.read(|t| t.target)
            .ok_or_else(|| VehicleError::Disconnected.into())
    }

    /// Wait for the first message `accept` maps to a value; `None` on timeout
    async fn wait_for<T>(
        &self,
        rx: &mut broadcast::Receiver<Inbound>,
        timeout: Duration,
        mut accept: impl FnMut(&MavHeader, &MavMessage) -> Option<T>,
    ) -> Result<Option<T>> {
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok((header, message)) => {
                        if let Some(value) = accept(&header, &message) {
                            return Ok(value);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Skipped {} messages while waiting", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(MavlinkMcpError::Vehicle(VehicleError::Disconnected));
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&TelemetrySnapshot) -> R) -> R {
        let guard = self.telemetry.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut TelemetrySnapshot) -> R) -> R {
        let mut guard = self.telemetry.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Drop for Vehicle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn receive_loop(
    link: Arc<MavlinkLink>,
    telemetry: Arc<RwLock<TelemetrySnapshot>>,
    messages: broadcast::Sender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = link.recv() => match received {
                Ok((header, message)) => {
                    telemetry
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .apply(&header, &message);
                    // No subscribers is fine
                    let _ = messages.send((header, message));
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    tokio::time::sleep(RECEIVE_BACKOFF).await;
                }
            },
        }
    }
    tracing::debug!("Receive loop stopped");
}

async fn heartbeat_loop(link: Arc<MavlinkLink>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    let heartbeat = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    });

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = link.send(&heartbeat).await {
                    tracing::debug!("Heartbeat not sent: {}", e);
                }
            }
        }
    }
}
