// Turbo / normal speed toggle driven by button rising edges

use serde::{Deserialize, Serialize};
use tracing::info;

pub const NORMAL_SCALE: f64 = 0.2;
pub const TURBO_SCALE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMode {
    Normal,
    Turbo,
}

impl SpeedMode {
    pub fn scale(self) -> f64 {
        match self {
            SpeedMode::Normal => NORMAL_SCALE,
            SpeedMode::Turbo => TURBO_SCALE,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SpeedMode::Normal => SpeedMode::Turbo,
            SpeedMode::Turbo => SpeedMode::Normal,
        }
    }
}

/// Remembers whether a button was held on the previous tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDetector {
    was_pressed: bool,
}

impl EdgeDetector {
    /// True only on the tick the button goes from released to pressed
    pub fn rising(&mut self, pressed: bool) -> bool {
        let edge = pressed && !self.was_pressed;
        self.was_pressed = pressed;
        edge
    }
}

/// Speed mode state machine; starts in turbo and only changes on a toggle press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedController {
    mode: SpeedMode,
    toggle: EdgeDetector,
}

impl Default for SpeedController {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedController {
    pub fn new() -> Self {
        Self {
            mode: SpeedMode::Turbo,
            toggle: EdgeDetector::default(),
        }
    }

    /// Feed this tick's toggle button; returns the new mode if it changed
    pub fn update(&mut self, toggle_pressed: bool) -> Option<SpeedMode> {
        if self.toggle.rising(toggle_pressed) {
            self.mode = self.mode.toggled();
            info!(
                "Speed mode: {:?} ({:.0}%)",
                self.mode,
                self.mode.scale() * 100.0
            );
            Some(self.mode)
        } else {
            None
        }
    }

    pub fn mode(&self) -> SpeedMode {
        self.mode
    }

    pub fn scale(&self) -> f64 {
        self.mode.scale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_turbo() {
        let speed = SpeedController::new();
        assert_eq!(speed.mode(), SpeedMode::Turbo);
        assert_eq!(speed.scale(), 1.0);
    }

    #[test]
    fn test_toggle_on_rising_edges() {
        let mut speed = SpeedController::new();

        assert_eq!(speed.update(true), Some(SpeedMode::Normal));
        assert_eq!(speed.scale(), 0.2);

        // Holding the button does nothing more
        for _ in 0..5 {
            assert_eq!(speed.update(true), None);
        }
        assert_eq!(speed.scale(), 0.2);

        assert_eq!(speed.update(false), None);
        assert_eq!(speed.update(true), Some(SpeedMode::Turbo));
        assert_eq!(speed.scale(), 1.0);
    }

    #[test]
    fn test_released_button_never_toggles() {
        let mut speed = SpeedController::new();
        for _ in 0..10 {
            assert_eq!(speed.update(false), None);
        }
        assert_eq!(speed.mode(), SpeedMode::Turbo);
    }

    #[test]
    fn test_edge_detector() {
        let mut edge = EdgeDetector::default();
        let seen: Vec<bool> = [false, true, true, false, true]
            .iter()
            .map(|&p| edge.rising(p))
            .collect();
        assert_eq!(seen, vec![false, true, false, false, true]);
    }
}
