// Observability: a per-tick report plus a human-readable page for the driver station

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actuators::MechanismReadout;
use crate::devices::DeviceStatus;
use crate::drive::{SpeedMode, WheelCommand};
use crate::pose::PoseReading;

/// Fire-and-forget display sink. Lines accumulate until `update` publishes the page.
pub trait TelemetrySink {
    fn add_data(&mut self, key: &str, value: &str);
    fn add_line(&mut self, line: &str);
    fn update(&mut self);
}

/// Everything observable about one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub tick: u64,
    pub speed_mode: SpeedMode,
    pub speed_scale: f64,
    /// None when odometry is unavailable or failed this tick
    pub pose: Option<PoseReading>,
    pub wheel_targets: WheelCommand,
    pub wheel_velocities: WheelCommand,
    pub mechanisms: MechanismReadout,
}

impl TelemetryReport {
    pub fn write_page(&self, sink: &mut dyn TelemetrySink) {
        sink.add_line("=== DRIVE SPEED ===");
        sink.add_data(
            "Speed",
            &format!("{:.0}% ({:.2})", self.speed_scale * 100.0, self.speed_scale),
        );
        sink.add_line("");

        match &self.pose {
            Some(reading) => {
                sink.add_line("=== ROBOT POSITION ===");
                sink.add_data("X Position (inches)", &format!("{:.2}", reading.pose.x));
                sink.add_data("Y Position (inches)", &format!("{:.2}", reading.pose.y));
                sink.add_data("Heading (degrees)", &format!("{:.2}", reading.pose.heading));
                sink.add_data("Status", &reading.status.to_string());
            }
            None => sink.add_line("=== ODOMETRY NOT AVAILABLE ==="),
        }
        sink.add_line("");

        sink.add_line("Drive Velocity:");
        let w = &self.wheel_velocities;
        sink.add_data("FL", &format!("{:.2}", w.front_left));
        sink.add_data("FR", &format!("{:.2}", w.front_right));
        sink.add_data("BL", &format!("{:.2}", w.back_left));
        sink.add_data("BR", &format!("{:.2}", w.back_right));
        sink.add_line("");

        let m = &self.mechanisms;
        sink.add_data("Intake Velocity", &format!("{:.2}", m.intake_velocity));
        sink.add_data("Launcher1 Velocity", &format!("{:.2}", m.launcher1_velocity));
        sink.add_data("Launcher2 Velocity", &format!("{:.2}", m.launcher2_velocity));
        sink.add_data("Lift Velocity", &format!("{:.2}", m.lift_velocity));
        sink.add_data("Servo Pos", &format!("{:.2}", m.primary_arm_position));
        sink.update();
    }
}

/// Startup page: controls and odometry state
pub fn write_startup_page(
    sink: &mut dyn TelemetrySink,
    speed_scale: f64,
    arm_rest: f64,
    pose_status: Result<DeviceStatus, String>,
) {
    sink.add_line(&format!("Initialized and ready! Servo resting at {}", arm_rest));
    sink.add_data("Drive Speed", &format!("{:.0}%", speed_scale * 100.0));
    match pose_status {
        Ok(status) => sink.add_data("Pinpoint Status", &status.to_string()),
        Err(reason) => {
            sink.add_data("Pinpoint Status", "FAILED - Check Configuration!");
            sink.add_data("Error", &reason);
        }
    }
    sink.add_line("");
    sink.add_line("--- SPEED CONTROLS ---");
    sink.add_data("Circle (B)", "Toggle Turbo/Normal");
    sink.update();
}

/// Sends each completed page to `tracing` at debug level
#[derive(Debug, Default)]
pub struct LogTelemetry {
    lines: Vec<String>,
}

impl LogTelemetry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetrySink for LogTelemetry {
    fn add_data(&mut self, key: &str, value: &str) {
        self.lines.push(format!("{}: {}", key, value));
    }

    fn add_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn update(&mut self) {
        debug!("telemetry\n{}", self.lines.join("\n"));
        self.lines.clear();
    }
}

/// Keeps published pages in memory; the handle stays readable after the sink is boxed
#[derive(Debug, Clone, Default)]
pub struct MemoryTelemetry {
    pending: Vec<String>,
    pages: Rc<RefCell<Vec<Vec<String>>>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> Rc<RefCell<Vec<Vec<String>>>> {
        Rc::clone(&self.pages)
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn add_data(&mut self, key: &str, value: &str) {
        self.pending.push(format!("{}: {}", key, value));
    }

    fn add_line(&mut self, line: &str) {
        self.pending.push(line.to_string());
    }

    fn update(&mut self) {
        let page = std::mem::take(&mut self.pending);
        self.pages.borrow_mut().push(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Pose2D;

    fn report(pose: Option<PoseReading>) -> TelemetryReport {
        TelemetryReport {
            tick: 1,
            speed_mode: SpeedMode::Normal,
            speed_scale: 0.2,
            pose,
            wheel_targets: WheelCommand::zero(),
            wheel_velocities: WheelCommand::new(1.0, 2.0, 3.0, 4.0),
            mechanisms: MechanismReadout::default(),
        }
    }

    #[test]
    fn test_page_with_pose() {
        let mut sink = MemoryTelemetry::new();
        let pages = sink.pages();
        report(Some(PoseReading {
            pose: Pose2D::new(12.5, -3.0, 90.0),
            status: DeviceStatus::Ready,
            seq: 7,
        }))
        .write_page(&mut sink);

        let pages = pages.borrow();
        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert!(page.contains(&"Speed: 20% (0.20)".to_string()));
        assert!(page.contains(&"X Position (inches): 12.50".to_string()));
        assert!(page.contains(&"Status: READY".to_string()));
        assert!(page.contains(&"BR: 4.00".to_string()));
    }

    #[test]
    fn test_page_without_pose() {
        let mut sink = MemoryTelemetry::new();
        let pages = sink.pages();
        report(None).write_page(&mut sink);

        let pages = pages.borrow();
        let page = &pages[0];
        assert!(page.contains(&"=== ODOMETRY NOT AVAILABLE ===".to_string()));
        assert!(!page.iter().any(|l| l.starts_with("X Position")));
    }

    #[test]
    fn test_startup_page_reports_failure() {
        let mut sink = MemoryTelemetry::new();
        let pages = sink.pages();
        write_startup_page(&mut sink, 1.0, 0.7, Err("Pose sensor not found: odometryComputer".into()));

        let pages = pages.borrow();
        let page = &pages[0];
        assert!(page.contains(&"Drive Speed: 100%".to_string()));
        assert!(page.contains(&"Pinpoint Status: FAILED - Check Configuration!".to_string()));
    }

    #[test]
    fn test_report_serializes_missing_pose_as_null() {
        let json = serde_json::to_value(report(None)).unwrap();
        assert!(json["pose"].is_null());
        assert_eq!(json["speed_mode"], "normal");
    }
}
