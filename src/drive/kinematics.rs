// Mecanum inverse kinematics for the four-wheel base
// Converts a shaped (x, y, rotate) command into per-wheel velocity targets.

use serde::{Deserialize, Serialize};

use crate::config::MAX_RATED_SPEED;
use crate::input::ShapedCommand;

/// Velocity targets for the four drive wheels, in encoder ticks per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelCommand {
    pub front_left: f64,
    pub front_right: f64,
    pub back_left: f64,
    pub back_right: f64,
}

impl WheelCommand {
    pub fn new(front_left: f64, front_right: f64, back_left: f64, back_right: f64) -> Self {
        Self {
            front_left,
            front_right,
            back_left,
            back_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns velocities as array [front_left, front_right, back_left, back_right]
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }

    pub fn max_magnitude(&self) -> f64 {
        self.as_array().iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }
}

/// Convert a shaped command to wheel targets at the rated speed
pub fn compute_wheel_command(cmd: ShapedCommand, speed_scale: f64) -> WheelCommand {
    compute_wheel_command_with_max(cmd, speed_scale, MAX_RATED_SPEED)
}

/// Convert a shaped command to wheel targets with a custom rated speed
///
/// `speed_scale` is clamped to [0, 1] so no target exceeds `max_rated_speed`.
pub fn compute_wheel_command_with_max(
    cmd: ShapedCommand,
    speed_scale: f64,
    max_rated_speed: f64,
) -> WheelCommand {
    let x = cmd.translate_x;
    let y = cmd.translate_y;
    let r = cmd.rotate;

    let front_left = y + x + r;
    let back_left = y - x + r;
    let front_right = y - x - r;
    let back_right = y + x - r;

    // Only scale down: small commands are never boosted, and m >= 1 avoids dividing by zero
    let m = [front_left, back_left, front_right, back_right]
        .iter()
        .fold(1.0f64, |m, v| m.max(v.abs()));

    let ticks_per_sec = max_rated_speed * speed_scale.clamp(0.0, 1.0);

    WheelCommand {
        front_left: front_left / m * ticks_per_sec,
        front_right: front_right / m * ticks_per_sec,
        back_left: back_left / m * ticks_per_sec,
        back_right: back_right / m * ticks_per_sec,
    }
}
