// Simulated run: drives the control loop against sim devices for a few seconds
//
// Usage: RUST_LOG=debug cargo run --example sim_drive            (telemetry pages)
//        cargo run --example sim_drive -- --no-pose              (degraded odometry)

use mecanum_teleop_runtime::actuators::MechanismDevices;
use mecanum_teleop_runtime::config::ControlConfig;
use mecanum_teleop_runtime::control::{ControlLoop, Hardware};
use mecanum_teleop_runtime::devices::{Pose2D, PoseSensor, SensorError};
use mecanum_teleop_runtime::drive::DriveMotors;
use mecanum_teleop_runtime::messages::InputSnapshot;
use mecanum_teleop_runtime::sim::{SimMotor, SimPoseSensor, SimServo};
use mecanum_teleop_runtime::telemetry::LogTelemetry;

const TICKS: u64 = 150; // 3 s at 50 Hz

/// Scripted driver: forward, toggle to normal speed, strafe, spin, then shoot
fn script(tick: u64) -> InputSnapshot {
    let mut snap = InputSnapshot::default();
    match tick {
        0..=29 => snap.driver.left_stick_y = 1.0,
        30 => snap.driver.circle = true,
        31..=59 => snap.driver.left_stick_y = 1.0,
        60..=89 => snap.driver.left_stick_x = -0.8,
        90..=119 => {
            snap.driver.right_stick_x = 0.6;
            snap.driver.left_stick_x = 0.03; // drift, locked out
        }
        _ => {
            snap.operator.right_trigger = 1.0;
            snap.operator.dpad_down = true;
            snap.operator.left_bumper = true;
        }
    }
    snap
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let no_pose = std::env::args().any(|a| a == "--no-pose");
    let pose_sensor: Result<Box<dyn PoseSensor>, SensorError> = if no_pose {
        Err(SensorError::Disabled)
    } else {
        Ok(Box::new(SimPoseSensor::with_motion(Pose2D::new(0.2, 0.0, 0.5))))
    };

    let front_left = SimMotor::new();
    let fl_handle = front_left.handle();

    let mut control = ControlLoop::new(
        ControlConfig::default(),
        Hardware {
            drive: DriveMotors {
                front_left: Box::new(front_left),
                front_right: Box::new(SimMotor::new()),
                back_left: Box::new(SimMotor::new()),
                back_right: Box::new(SimMotor::new()),
            },
            mechanisms: MechanismDevices {
                intake: Box::new(SimMotor::new()),
                lift: Box::new(SimMotor::new()),
                launcher1: Box::new(SimMotor::new()),
                launcher2: Box::new(SimMotor::new()),
                primary_arm: Box::new(SimServo::new()),
                secondary_arm: Box::new(SimServo::new()),
            },
            pose_sensor,
            telemetry: Box::new(LogTelemetry::new()),
        },
    );

    for tick in 0..TICKS {
        let outcome = control.tick(&script(tick), true);
        if tick % 30 == 29 {
            if let Some(report) = outcome.report {
                let pose = match report.pose {
                    Some(reading) => format!(
                        "({:.1}, {:.1}) {:.1}°",
                        reading.pose.x, reading.pose.y, reading.pose.heading
                    ),
                    None => "unavailable".to_string(),
                };
                println!(
                    "tick {:>3}: speed {:?}, wheels {:?}, pose {}",
                    tick,
                    report.speed_mode,
                    report.wheel_targets.as_array(),
                    pose
                );
            }
        }
    }

    control.tick(&InputSnapshot::default(), false);
    println!(
        "front-left commands: {}, stops: {}",
        fl_handle.borrow().commands.len(),
        fl_handle.borrow().stop_count()
    );
}
