// Per-tick control loop: input -> speed toggle -> shaping -> kinematics -> actuators -> telemetry
//
// The loop never waits on anything. The caller drives it at a fixed cadence and
// passes in whether the run is active; going inactive (or dropping the loop)
// issues the all-stop exactly once.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::actuators::{ActuatorCommands, ActuatorController, MechanismDevices, Mechanisms};
use crate::config::ControlConfig;
use crate::devices::{PoseSensor, SensorError};
use crate::drive::{compute_wheel_command_with_max, DriveMotors, MecanumDrive, SpeedController, SpeedMode, WheelCommand};
use crate::input::StickInput;
use crate::messages::InputSnapshot;
use crate::pose::PoseTracker;
use crate::telemetry::{write_startup_page, TelemetryReport, TelemetrySink};

/// Everything the loop talks to
pub struct Hardware {
    pub drive: DriveMotors,
    pub mechanisms: MechanismDevices,
    pub pose_sensor: Result<Box<dyn PoseSensor>, SensorError>,
    pub telemetry: Box<dyn TelemetrySink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// Configured, waiting for the active signal
    Waiting,
    Running,
    /// All-stop issued; further ticks do nothing
    Stopped,
}

/// State carried from one tick to the next
#[derive(Debug, Clone, Default)]
pub struct DriverState {
    pub speed: SpeedController,
}

/// What one tick produced. Commands and report are present only while running.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub phase: LoopPhase,
    pub wheels: Option<WheelCommand>,
    pub actuators: Option<ActuatorCommands>,
    pub report: Option<TelemetryReport>,
}

impl TickOutcome {
    fn idle(phase: LoopPhase) -> Self {
        Self {
            phase,
            wheels: None,
            actuators: None,
            report: None,
        }
    }
}

pub struct ControlLoop {
    config: ControlConfig,
    drive: MecanumDrive,
    mechanisms: Mechanisms,
    actuators: ActuatorController,
    pose: PoseTracker,
    telemetry: Box<dyn TelemetrySink>,
    state: DriverState,
    phase: LoopPhase,
    ticks: u64,
}

impl ControlLoop {
    /// Configure every device and bring up odometry (degraded if it fails)
    pub fn new(config: ControlConfig, hardware: Hardware) -> Self {
        let Hardware {
            drive,
            mechanisms,
            pose_sensor,
            mut telemetry,
        } = hardware;

        let mut drive = MecanumDrive::new(drive);
        drive.configure();
        drive.stop();

        let mut mechanisms = Mechanisms::new(mechanisms, config.mechanisms);
        mechanisms.configure();

        let pose = PoseTracker::try_init(pose_sensor, &config.odometry);
        let state = DriverState::default();

        let pose_status = match (pose.status(), pose.failure()) {
            (Some(status), _) => Ok(status),
            (None, Some(e)) => Err(e.to_string()),
            (None, None) => Err("unknown".to_string()),
        };
        write_startup_page(
            telemetry.as_mut(),
            state.speed.scale(),
            config.mechanisms.arm_rest,
            pose_status,
        );

        Self {
            actuators: ActuatorController::new(config.mechanisms),
            config,
            drive,
            mechanisms,
            pose,
            telemetry,
            state,
            phase: LoopPhase::Waiting,
            ticks: 0,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn speed_mode(&self) -> SpeedMode {
        self.state.speed.mode()
    }

    pub fn pose_available(&self) -> bool {
        self.pose.is_available()
    }

    /// Run one control cycle
    pub fn tick(&mut self, input: &InputSnapshot, active: bool) -> TickOutcome {
        match (self.phase, active) {
            (LoopPhase::Stopped, _) | (LoopPhase::Waiting, false) => {
                return TickOutcome::idle(self.phase);
            }
            (LoopPhase::Running, false) => {
                self.shutdown();
                return TickOutcome::idle(self.phase);
            }
            (LoopPhase::Waiting, true) => self.start(),
            (LoopPhase::Running, true) => {}
        }

        // Snapshot is copied once; nothing below sees a later input
        let input = *input;
        self.ticks += 1;

        self.state.speed.update(input.driver.circle);
        let speed_scale = self.state.speed.scale();

        let shaped = self.config.shaping.shape(StickInput::from_gamepad(&input.driver));
        let wheels = compute_wheel_command_with_max(shaped, speed_scale, self.config.max_drive_speed);

        let pose = self.pose.update();

        let actuators = self.actuators.evaluate(&input.operator);

        self.drive.set_wheel_velocities(&wheels);
        self.mechanisms.apply(&actuators);

        let report = TelemetryReport {
            tick: self.ticks,
            speed_mode: self.state.speed.mode(),
            speed_scale,
            pose,
            wheel_targets: wheels,
            wheel_velocities: self.drive.wheel_velocities(),
            mechanisms: self.mechanisms.readout(),
        };
        report.write_page(self.telemetry.as_mut());

        TickOutcome {
            phase: self.phase,
            wheels: Some(wheels),
            actuators: Some(actuators),
            report: Some(report),
        }
    }

    /// Command zero velocity on every motor and stop the loop.
    /// Returns false if the all-stop was already issued.
    pub fn shutdown(&mut self) -> bool {
        if self.phase == LoopPhase::Stopped {
            return false;
        }
        info!("Stopping all motors");
        self.drive.stop();
        self.mechanisms.stop();
        self.phase = LoopPhase::Stopped;
        true
    }

    fn start(&mut self) {
        info!("Control loop started");
        if !self.pose.is_available() {
            warn!("Running without odometry");
        }
        self.pose.reset_to_origin();
        self.phase = LoopPhase::Running;
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        // Covers early returns and panics mid-tick
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::actuators::ShooterCommand;
    use crate::devices::Pose2D;
    use crate::messages::{GamepadState, MotorCommand};
    use crate::sim::{SimMotor, SimMotorState, SimPoseSensor, SimServo};
    use crate::telemetry::MemoryTelemetry;

    struct Rig {
        control: ControlLoop,
        motors: Vec<Rc<RefCell<SimMotorState>>>,
        pages: Rc<RefCell<Vec<Vec<String>>>>,
    }

    fn rig(pose_sensor: Result<Box<dyn PoseSensor>, SensorError>) -> Rig {
        let motors: Vec<SimMotor> = (0..8).map(|_| SimMotor::new()).collect();
        let handles = motors.iter().map(|m| m.handle()).collect();
        let mut it = motors.into_iter();
        let mut next = || Box::new(it.next().unwrap());
        let drive = DriveMotors {
            front_left: next(),
            front_right: next(),
            back_left: next(),
            back_right: next(),
        };
        let mechanisms = MechanismDevices {
            intake: next(),
            lift: next(),
            launcher1: next(),
            launcher2: next(),
            primary_arm: Box::new(SimServo::new()),
            secondary_arm: Box::new(SimServo::new()),
        };
        let telemetry = MemoryTelemetry::new();
        let pages = telemetry.pages();
        let control = ControlLoop::new(
            ControlConfig::default(),
            Hardware {
                drive,
                mechanisms,
                pose_sensor,
                telemetry: Box::new(telemetry),
            },
        );
        Rig {
            control,
            motors: handles,
            pages,
        }
    }

    fn forward(y: f64) -> InputSnapshot {
        InputSnapshot {
            driver: GamepadState {
                left_stick_y: y,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn stop_counts(motors: &[Rc<RefCell<SimMotorState>>]) -> Vec<usize> {
        motors.iter().map(|m| m.borrow().stop_count()).collect()
    }

    #[test]
    fn test_waits_for_active() {
        let mut rig = rig(Ok(Box::new(SimPoseSensor::new())));
        let outcome = rig.control.tick(&forward(1.0), false);
        assert_eq!(outcome.phase, LoopPhase::Waiting);
        assert_eq!(outcome.wheels, None);

        let outcome = rig.control.tick(&forward(1.0), true);
        assert_eq!(outcome.phase, LoopPhase::Running);
        assert_eq!(outcome.wheels, Some(WheelCommand::new(2000.0, 2000.0, 2000.0, 2000.0)));
        assert_eq!(rig.motors[0].borrow().last_command(), Some(MotorCommand::Velocity(2000.0)));
    }

    #[test]
    fn test_speed_toggle_scales_drive() {
        let mut rig = rig(Ok(Box::new(SimPoseSensor::new())));
        let mut input = forward(1.0);
        input.driver.circle = true;

        let outcome = rig.control.tick(&input, true);
        assert_eq!(rig.control.speed_mode(), SpeedMode::Normal);
        let wheels = outcome.wheels.unwrap();
        assert!((wheels.front_left - 400.0).abs() < 1e-9);

        // Still held: no further change
        rig.control.tick(&input, true);
        assert_eq!(rig.control.speed_mode(), SpeedMode::Normal);

        input.driver.circle = false;
        rig.control.tick(&input, true);
        input.driver.circle = true;
        let outcome = rig.control.tick(&input, true);
        assert_eq!(rig.control.speed_mode(), SpeedMode::Turbo);
        assert_eq!(outcome.wheels.unwrap().front_left, 2000.0);
    }

    #[test]
    fn test_pose_reported_when_available() {
        let sensor = SimPoseSensor::with_motion(Pose2D::new(0.5, 0.0, 0.0));
        let handle = sensor.handle();
        let mut rig = rig(Ok(Box::new(sensor)));

        let first = rig.control.tick(&forward(0.0), true).report.unwrap();
        let second = rig.control.tick(&forward(0.0), true).report.unwrap();
        assert_eq!(first.pose.unwrap().pose.x, 0.5);
        assert_eq!(second.pose.unwrap().pose.x, 1.0);
        // Reset once at init, once at start
        assert_eq!(handle.borrow().resets, 2);
    }

    #[test]
    fn test_degraded_pose_leaves_drive_alone() {
        let mut healthy = rig(Ok(Box::new(SimPoseSensor::new())));
        let mut degraded = rig(Err(SensorError::Absent("odometryComputer".into())));
        assert!(!degraded.control.pose_available());

        let mut input = forward(0.6);
        input.driver.left_stick_x = 0.3;
        input.driver.right_stick_x = -0.4;
        input.operator.right_trigger = 1.0;
        input.operator.dpad_down = true;

        for _ in 0..3 {
            let a = healthy.control.tick(&input, true);
            let b = degraded.control.tick(&input, true);
            assert_eq!(a.wheels, b.wheels);
            assert_eq!(a.actuators, b.actuators);
            assert!(b.report.unwrap().pose.is_none());
        }

        let pages = degraded.pages.borrow();
        assert!(pages[0].contains(&"Pinpoint Status: FAILED - Check Configuration!".to_string()));
        assert!(pages.last().unwrap().contains(&"=== ODOMETRY NOT AVAILABLE ===".to_string()));
    }

    #[test]
    fn test_actuators_follow_operator_pad() {
        let mut rig = rig(Ok(Box::new(SimPoseSensor::new())));
        let mut input = InputSnapshot::default();
        input.operator.right_trigger = 0.8;
        input.operator.left_trigger = 0.9;

        let outcome = rig.control.tick(&input, true);
        let actuators = outcome.actuators.unwrap();
        assert_eq!(actuators.shooter, ShooterCommand::Spin { power: 0.45 });
        assert_eq!(actuators.lift, 3000.0);
        assert_eq!(rig.motors[6].borrow().last_command(), Some(MotorCommand::Power(-0.45)));
        assert_eq!(rig.motors[7].borrow().last_command(), Some(MotorCommand::Power(0.45)));
        assert_eq!(rig.motors[5].borrow().last_command(), Some(MotorCommand::Velocity(3000.0)));
    }

    #[test]
    fn test_stop_signal_issues_single_all_stop() {
        let mut rig = rig(Ok(Box::new(SimPoseSensor::new())));
        let mut input = forward(1.0);
        input.operator.right_trigger = 1.0;
        input.operator.dpad_up = true;
        rig.control.tick(&input, true);
        rig.control.tick(&input, true);
        let before = stop_counts(&rig.motors);

        let outcome = rig.control.tick(&input, false);
        assert_eq!(outcome.phase, LoopPhase::Stopped);
        let after = stop_counts(&rig.motors);
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(a - b, 1);
        }
        for m in &rig.motors {
            assert_eq!(m.borrow().last_command(), Some(MotorCommand::Velocity(0.0)));
        }

        // Later ticks and the drop add nothing
        rig.control.tick(&input, true);
        rig.control.tick(&input, false);
        assert!(!rig.control.shutdown());
        let motors = rig.motors.clone();
        drop(rig);
        assert_eq!(stop_counts(&motors), after);
    }

    #[test]
    fn test_drop_while_running_stops_motors() {
        let rig = rig(Ok(Box::new(SimPoseSensor::new())));
        let Rig {
            mut control, motors, ..
        } = rig;
        control.tick(&forward(1.0), true);
        let before = stop_counts(&motors);

        drop(control);
        let after = stop_counts(&motors);
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(a - b, 1);
        }
    }
}
