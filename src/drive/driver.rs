// High-level driver for the mecanum base
//
// Owns the four wheel motors and forwards WheelCommands to them.

use tracing::{debug, info};

use super::kinematics::WheelCommand;
use crate::devices::{Direction, RunMode, VelocityActuator};

/// The four drive motors, in [front_left, front_right, back_left, back_right] order
pub struct DriveMotors {
    pub front_left: Box<dyn VelocityActuator>,
    pub front_right: Box<dyn VelocityActuator>,
    pub back_left: Box<dyn VelocityActuator>,
    pub back_right: Box<dyn VelocityActuator>,
}

pub struct MecanumDrive {
    motors: DriveMotors,
}

impl MecanumDrive {
    pub fn new(motors: DriveMotors) -> Self {
        Self { motors }
    }

    /// One-time motor setup
    ///
    /// The left side is mounted mirrored, so it is reversed to make positive
    /// targets drive every wheel forward. All wheels run closed-loop on encoders.
    pub fn configure(&mut self) {
        info!("Configuring drive motors: left side reversed, encoder velocity mode");
        self.motors.front_left.set_direction(Direction::Reverse);
        self.motors.back_left.set_direction(Direction::Reverse);
        self.motors.front_right.set_direction(Direction::Forward);
        self.motors.back_right.set_direction(Direction::Forward);

        for motor in self.motors_mut() {
            motor.set_run_mode(RunMode::UsingEncoder);
        }
    }

    /// Send velocity targets to all four wheels
    pub fn set_wheel_velocities(&mut self, wheels: &WheelCommand) {
        debug!(
            "Setting wheel velocities: fl={:.1}, fr={:.1}, bl={:.1}, br={:.1}",
            wheels.front_left, wheels.front_right, wheels.back_left, wheels.back_right
        );
        self.motors.front_left.set_target_velocity(wheels.front_left);
        self.motors.front_right.set_target_velocity(wheels.front_right);
        self.motors.back_left.set_target_velocity(wheels.back_left);
        self.motors.back_right.set_target_velocity(wheels.back_right);
    }

    /// Command zero velocity on every wheel
    pub fn stop(&mut self) {
        self.set_wheel_velocities(&WheelCommand::zero());
    }

    /// Measured wheel velocities as reported by the motors
    pub fn wheel_velocities(&self) -> WheelCommand {
        WheelCommand::new(
            self.motors.front_left.current_velocity(),
            self.motors.front_right.current_velocity(),
            self.motors.back_left.current_velocity(),
            self.motors.back_right.current_velocity(),
        )
    }

    fn motors_mut(&mut self) -> [&mut Box<dyn VelocityActuator>; 4] {
        [
            &mut self.motors.front_left,
            &mut self.motors.front_right,
            &mut self.motors.back_left,
            &mut self.motors.back_right,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MotorCommand;
    use crate::sim::SimMotor;

    #[test]
    fn test_configure_reverses_left_side() {
        let motors = [SimMotor::new(), SimMotor::new(), SimMotor::new(), SimMotor::new()];
        let handles: Vec<_> = motors.iter().map(|m| m.handle()).collect();
        let [fl, fr, bl, br] = motors;
        let mut drive = MecanumDrive::new(DriveMotors {
            front_left: Box::new(fl),
            front_right: Box::new(fr),
            back_left: Box::new(bl),
            back_right: Box::new(br),
        });

        drive.configure();

        let directions: Vec<_> = handles.iter().map(|h| h.borrow().direction).collect();
        assert_eq!(
            directions,
            vec![Direction::Reverse, Direction::Forward, Direction::Reverse, Direction::Forward]
        );
        assert!(handles.iter().all(|h| h.borrow().run_mode == RunMode::UsingEncoder));
    }

    #[test]
    fn test_targets_reach_matching_motors() {
        let motors = [SimMotor::new(), SimMotor::new(), SimMotor::new(), SimMotor::new()];
        let handles: Vec<_> = motors.iter().map(|m| m.handle()).collect();
        let [fl, fr, bl, br] = motors;
        let mut drive = MecanumDrive::new(DriveMotors {
            front_left: Box::new(fl),
            front_right: Box::new(fr),
            back_left: Box::new(bl),
            back_right: Box::new(br),
        });

        let wheels = WheelCommand::new(100.0, -200.0, 300.0, -400.0);
        drive.set_wheel_velocities(&wheels);
        assert_eq!(drive.wheel_velocities(), wheels);

        drive.stop();
        for handle in &handles {
            assert_eq!(handle.borrow().last_command(), Some(MotorCommand::Velocity(0.0)));
        }
    }
}
