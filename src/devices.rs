// Capability interfaces for everything the control loop drives or reads.
//
// The loop only ever sees these traits, so the same code runs against the
// zenoh hardware bridge (`bridge`) or simulated devices (`sim`).

use serde::{Deserialize, Serialize};

use crate::config::EncoderDirection;

/// Mounting direction of a motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Sign applied to commands sent to hardware
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    WithoutEncoder,
    UsingEncoder,
}

/// A motor that accepts velocity (and open-loop power) targets.
/// Direction and run mode are configured once before the loop starts.
pub trait VelocityActuator {
    fn set_direction(&mut self, direction: Direction);
    fn set_run_mode(&mut self, mode: RunMode);
    /// Target in encoder ticks per second
    fn set_target_velocity(&mut self, velocity: f64);
    fn set_power(&mut self, power: f64);
    fn current_velocity(&self) -> f64;
}

pub trait ServoActuator {
    fn set_position(&mut self, position: f64);
    fn position(&self) -> f64;
}

/// Planar pose: x/y in inches, heading in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2D {
    pub const ORIGIN: Pose2D = Pose2D {
        x: 0.0,
        y: 0.0,
        heading: 0.0,
    };

    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// Express `self` in the frame whose origin sits at `origin`
    pub fn relative_to(&self, origin: &Pose2D) -> Pose2D {
        let (sin, cos) = (-origin.heading.to_radians()).sin_cos();
        let dx = self.x - origin.x;
        let dy = self.y - origin.y;
        Pose2D {
            x: dx * cos - dy * sin,
            y: dx * sin + dy * cos,
            heading: normalize_degrees(self.heading - origin.heading),
        }
    }
}

/// Wrap an angle into (-180, 180]
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

/// Status reported by the odometry computer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Ready,
    Calibrating,
    NotReady,
    FaultXPodNotDetected,
    FaultYPodNotDetected,
    FaultNoPodsDetected,
    FaultImuRunaway,
    FaultBadRead,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DeviceStatus::Ready => "READY",
            DeviceStatus::Calibrating => "CALIBRATING",
            DeviceStatus::NotReady => "NOT_READY",
            DeviceStatus::FaultXPodNotDetected => "FAULT_X_POD_NOT_DETECTED",
            DeviceStatus::FaultYPodNotDetected => "FAULT_Y_POD_NOT_DETECTED",
            DeviceStatus::FaultNoPodsDetected => "FAULT_NO_PODS_DETECTED",
            DeviceStatus::FaultImuRunaway => "FAULT_IMU_RUNAWAY",
            DeviceStatus::FaultBadRead => "FAULT_BAD_READ",
        };
        f.write_str(text)
    }
}

/// Error types for the pose sensor
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("Pose sensor not found: {0}")]
    Absent(String),

    #[error("Pose sensor disabled")]
    Disabled,

    #[error("Pose sensor rejected configuration: {0}")]
    Configuration(String),

    #[error("Pose sensor communication failed: {0}")]
    Communication(String),
}

/// Odometry computer contract
pub trait PoseSensor {
    /// Pod offsets from the tracking center, in millimeters
    fn configure_offsets(&mut self, x_offset_mm: f64, y_offset_mm: f64) -> Result<(), SensorError>;
    fn configure_encoder_resolution(&mut self, ticks_per_mm: f64) -> Result<(), SensorError>;
    fn configure_encoder_directions(
        &mut self,
        x: EncoderDirection,
        y: EncoderDirection,
    ) -> Result<(), SensorError>;
    fn reset_position_and_orientation(&mut self) -> Result<(), SensorError>;
    /// Refresh the pose from the device; must not block past one tick
    fn update(&mut self) -> Result<(), SensorError>;
    fn position(&self) -> Pose2D;
    fn device_status(&self) -> DeviceStatus;
}
