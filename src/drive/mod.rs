// Drive module for the mecanum base
//
// Provides:
// - Mecanum inverse kinematics (shaped command -> wheel velocity targets)
// - Turbo/normal speed toggle
// - High-level drive API over four velocity actuators

mod driver;
pub mod kinematics;
pub mod speed;

pub use driver::{DriveMotors, MecanumDrive};
pub use kinematics::{compute_wheel_command, compute_wheel_command_with_max, WheelCommand};
pub use speed::{EdgeDetector, SpeedController, SpeedMode};
