// Driver stick shaping: deadzone and rotate-in-place lockout

use crate::config::ShapingConfig;
use crate::messages::GamepadState;

/// Raw drive axes for one tick, after the sign convention is applied.
///
/// Convention: `translate_x = -left_stick_x`, `translate_y = left_stick_y`,
/// `rotate = right_stick_x`. The kinematics assume this pre-negated strafe axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickInput {
    pub translate_x: f64,
    pub translate_y: f64,
    pub rotate: f64,
}

impl StickInput {
    pub fn new(translate_x: f64, translate_y: f64, rotate: f64) -> Self {
        Self {
            translate_x,
            translate_y,
            rotate,
        }
    }

    pub fn from_gamepad(pad: &GamepadState) -> Self {
        Self {
            translate_x: -pad.left_stick_x,
            translate_y: pad.left_stick_y,
            rotate: pad.right_stick_x,
        }
    }
}

/// Drive command after shaping; same ranges as [`StickInput`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShapedCommand {
    pub translate_x: f64,
    pub translate_y: f64,
    pub rotate: f64,
}

impl ShapedCommand {
    pub fn new(translate_x: f64, translate_y: f64, rotate: f64) -> Self {
        Self {
            translate_x,
            translate_y,
            rotate,
        }
    }
}

impl ShapingConfig {
    pub fn shape(&self, raw: StickInput) -> ShapedCommand {
        let mut x = apply_deadzone(raw.translate_x, self.deadzone);
        let mut y = apply_deadzone(raw.translate_y, self.deadzone);
        let r = apply_deadzone(raw.rotate, self.deadzone);

        // Rotating in place: drop translate drift from an off-center stick
        if r.abs() > self.lockout_rotate && x.hypot(y) < self.lockout_translate {
            x = 0.0;
            y = 0.0;
        }

        ShapedCommand {
            translate_x: x,
            translate_y: y,
            rotate: r,
        }
    }
}

/// Shape with the default thresholds
pub fn shape(raw: StickInput) -> ShapedCommand {
    ShapingConfig::default().shape(raw)
}

fn apply_deadzone(value: f64, deadzone: f64) -> f64 {
    if value.abs() < deadzone { 0.0 } else { value }
}
