// Message types exchanged between the runtime, the teleop station and the hardware bridge

use serde::{Deserialize, Serialize};

use crate::devices::{DeviceStatus, Pose2D, RunMode};

/// One controller's state for a single tick
// Sticks and triggers are in [-1, 1] / [0, 1]; anything missing on the wire reads as released
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamepadState {
    pub left_stick_x: f64,
    pub left_stick_y: f64,
    pub right_stick_x: f64,
    pub right_stick_y: f64,
    pub left_trigger: f64,
    pub right_trigger: f64,
    pub left_bumper: bool,
    pub right_bumper: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub cross: bool,
    pub circle: bool,
    pub square: bool,
    pub triangle: bool,
}

/// Snapshot of both controllers, teleop -> runtime.
/// `driver` steers the base, `operator` runs the mechanisms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSnapshot {
    pub driver: GamepadState,
    pub operator: GamepadState,
}

/// Start/stop signal from the driver station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSignal {
    pub active: bool,
}

/// Velocity-controlled motor channels on the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorChannel {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
    Intake,
    Lift,
    Launcher1,
    Launcher2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServoChannel {
    PrimaryArm,
    SecondaryArm,
}

/// What a motor was last told to do
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum MotorCommand {
    /// Closed-loop target in encoder ticks per second
    Velocity(f64),
    /// Open-loop power in [-1, 1]
    Power(f64),
}

impl MotorCommand {
    pub fn is_stop(&self) -> bool {
        matches!(self, MotorCommand::Velocity(v) if *v == 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorOutput {
    pub channel: MotorChannel,
    pub command: MotorCommand,
}

/// One-time motor setup, sent ahead of the first command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorSetup {
    pub channel: MotorChannel,
    pub run_mode: RunMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoOutput {
    pub channel: ServoChannel,
    pub position: f64,
}

/// Actuation output from runtime -> hardware bridge.
/// Only channels commanded this tick are present; absent channels hold their last command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorFrame {
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<MotorSetup>,
    pub motors: Vec<MotorOutput>,
    pub servos: Vec<ServoOutput>,
}

impl ActuatorFrame {
    pub fn is_empty(&self) -> bool {
        self.setup.is_empty() && self.motors.is_empty() && self.servos.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorReading {
    pub channel: MotorChannel,
    pub velocity: f64,
}

/// Measured velocities reported by the hardware bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorFeedback {
    pub motors: Vec<MotorReading>,
}

/// Sample from the odometry computer, in inches and degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub pose: Pose2D,
    pub status: DeviceStatus,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Waiting,
    Ok,
    InputStale,
    Stopped,
}
