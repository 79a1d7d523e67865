// Operator-side mechanisms: intake, lift, shooter pair and the two servo arms.
//
// Every rule reads only this tick's operator gamepad; nothing is remembered
// between ticks. Servos with no button held get no command and stay put.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::MechanismConfig;
use crate::devices::{RunMode, ServoActuator, VelocityActuator};
use crate::messages::{GamepadState, ServoChannel};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShooterCommand {
    /// Open-loop spin; the second launcher is mounted mirrored and gets the opposite sign
    Spin { power: f64 },
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoCommand {
    pub channel: ServoChannel,
    pub position: f64,
}

/// Mechanism targets for one tick. `None` means "leave as is".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommands {
    pub intake: Option<f64>,
    pub lift: f64,
    pub shooter: ShooterCommand,
    pub servo: Option<ServoCommand>,
}

pub struct ActuatorController {
    config: MechanismConfig,
}

impl ActuatorController {
    pub fn new(config: MechanismConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, pad: &GamepadState) -> ActuatorCommands {
        ActuatorCommands {
            intake: self.intake(pad),
            lift: self.lift(pad),
            shooter: self.shooter(pad),
            servo: self.servo(pad),
        }
    }

    // Checked in control-layout order: reverse, forward, stop
    fn intake(&self, pad: &GamepadState) -> Option<f64> {
        if pad.dpad_up {
            Some(-self.config.intake_speed)
        } else if pad.dpad_down {
            Some(self.config.intake_speed)
        } else if pad.cross {
            Some(0.0)
        } else {
            None
        }
    }

    fn lift(&self, pad: &GamepadState) -> f64 {
        if pad.left_trigger > self.config.trigger_threshold {
            self.config.lift_speed
        } else {
            0.0
        }
    }

    fn shooter(&self, pad: &GamepadState) -> ShooterCommand {
        if pad.right_trigger > self.config.trigger_threshold {
            ShooterCommand::Spin {
                power: self.config.shooter_power,
            }
        } else {
            ShooterCommand::Idle
        }
    }

    fn servo(&self, pad: &GamepadState) -> Option<ServoCommand> {
        let (channel, position) = if pad.left_bumper {
            (ServoChannel::PrimaryArm, self.config.arm_deployed)
        } else if pad.right_bumper {
            (ServoChannel::PrimaryArm, self.config.arm_rest)
        } else if pad.dpad_right {
            (ServoChannel::SecondaryArm, self.config.secondary_raised)
        } else if pad.dpad_left {
            (ServoChannel::SecondaryArm, self.config.secondary_lowered)
        } else {
            return None;
        };
        Some(ServoCommand { channel, position })
    }
}

/// Measured mechanism state for telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MechanismReadout {
    pub intake_velocity: f64,
    pub lift_velocity: f64,
    pub launcher1_velocity: f64,
    pub launcher2_velocity: f64,
    pub primary_arm_position: f64,
    pub secondary_arm_position: f64,
}

pub struct MechanismDevices {
    pub intake: Box<dyn VelocityActuator>,
    pub lift: Box<dyn VelocityActuator>,
    pub launcher1: Box<dyn VelocityActuator>,
    pub launcher2: Box<dyn VelocityActuator>,
    pub primary_arm: Box<dyn ServoActuator>,
    pub secondary_arm: Box<dyn ServoActuator>,
}

/// Mechanism hardware; applies ActuatorCommands to the devices
pub struct Mechanisms {
    devices: MechanismDevices,
    config: MechanismConfig,
}

impl Mechanisms {
    pub fn new(devices: MechanismDevices, config: MechanismConfig) -> Self {
        Self { devices, config }
    }

    /// One-time setup: encoder mode on every motor, everything stopped, servos home
    pub fn configure(&mut self) {
        info!(
            "Configuring mechanisms, arm resting at {:.2}",
            self.config.arm_rest
        );
        for motor in self.motors_mut() {
            motor.set_run_mode(RunMode::UsingEncoder);
        }
        self.stop();
        self.devices.primary_arm.set_position(self.config.arm_rest);
        self.devices
            .secondary_arm
            .set_position(self.config.secondary_home);
    }

    pub fn apply(&mut self, commands: &ActuatorCommands) {
        if let Some(velocity) = commands.intake {
            self.devices.intake.set_target_velocity(velocity);
        }

        self.devices.lift.set_target_velocity(commands.lift);

        match commands.shooter {
            ShooterCommand::Spin { power } => {
                self.devices.launcher1.set_power(-power);
                self.devices.launcher2.set_power(power);
            }
            ShooterCommand::Idle => {
                self.devices.launcher1.set_target_velocity(0.0);
                self.devices.launcher2.set_target_velocity(0.0);
            }
        }

        if let Some(servo) = commands.servo {
            match servo.channel {
                ServoChannel::PrimaryArm => self.devices.primary_arm.set_position(servo.position),
                ServoChannel::SecondaryArm => {
                    self.devices.secondary_arm.set_position(servo.position)
                }
            }
        }
    }

    /// Zero velocity on every mechanism motor. Servos hold position.
    pub fn stop(&mut self) {
        for motor in self.motors_mut() {
            motor.set_target_velocity(0.0);
        }
    }

    pub fn readout(&self) -> MechanismReadout {
        MechanismReadout {
            intake_velocity: self.devices.intake.current_velocity(),
            lift_velocity: self.devices.lift.current_velocity(),
            launcher1_velocity: self.devices.launcher1.current_velocity(),
            launcher2_velocity: self.devices.launcher2.current_velocity(),
            primary_arm_position: self.devices.primary_arm.position(),
            secondary_arm_position: self.devices.secondary_arm.position(),
        }
    }

    fn motors_mut(&mut self) -> [&mut Box<dyn VelocityActuator>; 4] {
        [
            &mut self.devices.intake,
            &mut self.devices.lift,
            &mut self.devices.launcher1,
            &mut self.devices.launcher2,
        ]
    }
}
