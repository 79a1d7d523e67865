// Loop timing, topics, drive and mechanism tuning
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Shortest tick period, whatever loop_hz asks for
pub const MIN_LOOP_PERIOD: Duration = Duration::from_micros(100);

// Gamepad input older than this is replaced by a neutral snapshot
pub const INPUT_TIMEOUT: Duration = Duration::from_millis(250);

// How long to wait for the odometry computer's first sample at startup
pub const POSE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

// Odometry samples older than this are treated as a failed read
pub const POSE_STALE_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_INPUT: &str = "robot/cmd/gamepad"; // gamepad snapshots
pub const TOPIC_ACTIVE: &str = "robot/cmd/active"; // start/stop signal
pub const TOPIC_POSE: &str = "robot/sensor/pose"; // odometry computer samples
pub const TOPIC_POSE_CONFIG: &str = "robot/sensor/pose/config"; // pod configuration
pub const TOPIC_MOTOR_FEEDBACK: &str = "robot/state/motors"; // measured velocities
pub const TOPIC_ACTUATORS: &str = "robot/rt/actuators"; // actuation
pub const TOPIC_TELEMETRY: &str = "robot/state/telemetry"; // telemetry report
pub const TOPIC_HEALTH: &str = "robot/state/health"; // health status

// Input shaping
pub const STICK_DEADZONE: f64 = 0.05;
pub const LOCKOUT_ROTATE_THRESHOLD: f64 = 0.2;
pub const LOCKOUT_TRANSLATE_THRESHOLD: f64 = 0.1;

// Drive: rated wheel speed in encoder ticks per second
pub const MAX_RATED_SPEED: f64 = 2000.0;

// Mechanisms
pub const INTAKE_SPEED: f64 = 3000.0;
pub const LIFT_SPEED: f64 = 3000.0;
pub const SHOOTER_POWER: f64 = 0.45;
pub const TRIGGER_THRESHOLD: f64 = 0.5;

// Servo positions (servo range is [0, 1])
pub const ARM_REST_POS: f64 = 0.7;
pub const ARM_DEPLOYED_POS: f64 = 0.0;
pub const SECONDARY_HOME_POS: f64 = 0.03;
pub const SECONDARY_RAISED_POS: f64 = 0.5;
pub const SECONDARY_LOWERED_POS: f64 = 0.0;

// Odometry pods, measured from the tracking center
pub const POD_X_OFFSET_MM: f64 = -84.0;
pub const POD_Y_OFFSET_MM: f64 = -168.0;
pub const GOBILDA_4_BAR_POD_TICKS_PER_MM: f64 = 19.894_367_89;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Thresholds applied to the driver's sticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    pub deadzone: f64,
    pub lockout_rotate: f64,
    pub lockout_translate: f64,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            deadzone: STICK_DEADZONE,
            lockout_rotate: LOCKOUT_ROTATE_THRESHOLD,
            lockout_translate: LOCKOUT_TRANSLATE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanismConfig {
    pub intake_speed: f64,
    pub lift_speed: f64,
    pub shooter_power: f64,
    pub trigger_threshold: f64,
    pub arm_rest: f64,
    pub arm_deployed: f64,
    pub secondary_home: f64,
    pub secondary_raised: f64,
    pub secondary_lowered: f64,
}

impl Default for MechanismConfig {
    fn default() -> Self {
        Self {
            intake_speed: INTAKE_SPEED,
            lift_speed: LIFT_SPEED,
            shooter_power: SHOOTER_POWER,
            trigger_threshold: TRIGGER_THRESHOLD,
            arm_rest: ARM_REST_POS,
            arm_deployed: ARM_DEPLOYED_POS,
            secondary_home: SECONDARY_HOME_POS,
            secondary_raised: SECONDARY_RAISED_POS,
            secondary_lowered: SECONDARY_LOWERED_POS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderDirection {
    Forward,
    Reversed,
}

/// Odometry pod geometry handed to the pose sensor at startup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryConfig {
    pub x_offset_mm: f64,
    pub y_offset_mm: f64,
    pub ticks_per_mm: f64,
    pub x_direction: EncoderDirection,
    pub y_direction: EncoderDirection,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            x_offset_mm: POD_X_OFFSET_MM,
            y_offset_mm: POD_Y_OFFSET_MM,
            ticks_per_mm: GOBILDA_4_BAR_POD_TICKS_PER_MM,
            x_direction: EncoderDirection::Forward,
            y_direction: EncoderDirection::Forward,
        }
    }
}

/// Everything tunable about the control loop, loadable from JSON.
/// Missing fields fall back to the constants above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub loop_hz: u64,
    pub input_timeout_ms: u64,
    pub max_drive_speed: f64,
    pub shaping: ShapingConfig,
    pub mechanisms: MechanismConfig,
    pub odometry: OdometryConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            loop_hz: LOOP_HZ,
            input_timeout_ms: INPUT_TIMEOUT.as_millis() as u64,
            max_drive_speed: MAX_RATED_SPEED,
            shaping: ShapingConfig::default(),
            mechanisms: MechanismConfig::default(),
            odometry: OdometryConfig::default(),
        }
    }
}

impl ControlConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Never zero, however high the configured rate
    pub fn loop_period(&self) -> Duration {
        let hz = self.loop_hz.max(1) as f64;
        Duration::from_secs_f64(1.0 / hz).max(MIN_LOOP_PERIOD)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = ControlConfig::from_json(r#"{ "max_drive_speed": 1500.0, "shaping": { "deadzone": 0.1 } }"#)
            .unwrap();
        assert_eq!(cfg.max_drive_speed, 1500.0);
        assert_eq!(cfg.shaping.deadzone, 0.1);
        assert_eq!(cfg.shaping.lockout_rotate, LOCKOUT_ROTATE_THRESHOLD);
        assert_eq!(cfg.loop_hz, LOOP_HZ);
        assert_eq!(cfg.mechanisms, MechanismConfig::default());
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = ControlConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_loop_period() {
        let cfg = ControlConfig::default();
        assert_eq!(cfg.loop_period(), Duration::from_millis(20));
        assert_eq!(cfg.input_timeout(), INPUT_TIMEOUT);
    }

    #[test]
    fn test_loop_period_above_1khz() {
        let cfg = ControlConfig::from_json(r#"{ "loop_hz": 2000 }"#).unwrap();
        assert_eq!(cfg.loop_period(), Duration::from_micros(500));

        let cfg = ControlConfig::from_json(r#"{ "loop_hz": 0 }"#).unwrap();
        assert_eq!(cfg.loop_period(), Duration::from_secs(1));

        let cfg = ControlConfig {
            loop_hz: u64::MAX,
            ..Default::default()
        };
        assert_eq!(cfg.loop_period(), MIN_LOOP_PERIOD);
    }
}
