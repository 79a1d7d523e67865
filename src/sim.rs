// Simulated devices for tests and the sim_drive demo.
//
// Each device keeps its state behind an `Rc<RefCell<..>>` so callers can hold a
// handle and inspect what the control loop commanded after the device has been
// boxed and handed over.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::EncoderDirection;
use crate::devices::{
    DeviceStatus, Direction, Pose2D, PoseSensor, RunMode, SensorError, ServoActuator,
    VelocityActuator,
};
use crate::messages::MotorCommand;

/// Free speed reached at full open-loop power, in ticks per second
pub const SIM_FREE_SPEED: f64 = 2800.0;

#[derive(Debug, Default)]
pub struct SimMotorState {
    pub direction: Direction,
    pub run_mode: RunMode,
    pub commands: Vec<MotorCommand>,
    pub velocity: f64,
}

impl SimMotorState {
    pub fn last_command(&self) -> Option<MotorCommand> {
        self.commands.last().copied()
    }

    pub fn stop_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_stop()).count()
    }
}

/// Ideal motor: reaches any commanded velocity instantly
#[derive(Debug, Clone, Default)]
pub struct SimMotor {
    state: Rc<RefCell<SimMotorState>>,
}

impl SimMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Rc<RefCell<SimMotorState>> {
        Rc::clone(&self.state)
    }
}

impl VelocityActuator for SimMotor {
    fn set_direction(&mut self, direction: Direction) {
        self.state.borrow_mut().direction = direction;
    }

    fn set_run_mode(&mut self, mode: RunMode) {
        self.state.borrow_mut().run_mode = mode;
    }

    fn set_target_velocity(&mut self, velocity: f64) {
        let mut state = self.state.borrow_mut();
        state.commands.push(MotorCommand::Velocity(velocity));
        state.velocity = velocity;
    }

    fn set_power(&mut self, power: f64) {
        let mut state = self.state.borrow_mut();
        state.commands.push(MotorCommand::Power(power));
        state.velocity = power.clamp(-1.0, 1.0) * SIM_FREE_SPEED;
    }

    fn current_velocity(&self) -> f64 {
        self.state.borrow().velocity
    }
}

#[derive(Debug, Default)]
pub struct SimServoState {
    pub positions: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct SimServo {
    state: Rc<RefCell<SimServoState>>,
}

impl SimServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Rc<RefCell<SimServoState>> {
        Rc::clone(&self.state)
    }
}

impl ServoActuator for SimServo {
    fn set_position(&mut self, position: f64) {
        // Real servos saturate at the ends of their range
        self.state.borrow_mut().positions.push(position.clamp(0.0, 1.0));
    }

    fn position(&self) -> f64 {
        self.state.borrow().positions.last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug)]
pub struct SimPoseState {
    /// Pose in the sensor's own frame, advanced by `motion` on every update
    pub raw: Pose2D,
    pub motion: Pose2D,
    pub origin: Pose2D,
    pub reported: Pose2D,
    pub status: DeviceStatus,
    pub offsets_mm: Option<(f64, f64)>,
    pub ticks_per_mm: Option<f64>,
    pub directions: Option<(EncoderDirection, EncoderDirection)>,
    pub resets: u32,
    pub updates: u32,
    pub fail_configuration: Option<SensorError>,
    pub fail_update: Option<SensorError>,
}

impl Default for SimPoseState {
    fn default() -> Self {
        Self {
            raw: Pose2D::ORIGIN,
            motion: Pose2D::ORIGIN,
            origin: Pose2D::ORIGIN,
            reported: Pose2D::ORIGIN,
            status: DeviceStatus::Ready,
            offsets_mm: None,
            ticks_per_mm: None,
            directions: None,
            resets: 0,
            updates: 0,
            fail_configuration: None,
            fail_update: None,
        }
    }
}

/// Odometry computer that moves by a fixed step per update
#[derive(Debug, Clone, Default)]
pub struct SimPoseSensor {
    state: Rc<RefCell<SimPoseState>>,
}

impl SimPoseSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_motion(motion: Pose2D) -> Self {
        let sensor = Self::default();
        sensor.state.borrow_mut().motion = motion;
        sensor
    }

    pub fn handle(&self) -> Rc<RefCell<SimPoseState>> {
        Rc::clone(&self.state)
    }

    fn check_configuration(&self) -> Result<(), SensorError> {
        match &self.state.borrow().fail_configuration {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl PoseSensor for SimPoseSensor {
    fn configure_offsets(&mut self, x_offset_mm: f64, y_offset_mm: f64) -> Result<(), SensorError> {
        self.check_configuration()?;
        self.state.borrow_mut().offsets_mm = Some((x_offset_mm, y_offset_mm));
        Ok(())
    }

    fn configure_encoder_resolution(&mut self, ticks_per_mm: f64) -> Result<(), SensorError> {
        self.check_configuration()?;
        self.state.borrow_mut().ticks_per_mm = Some(ticks_per_mm);
        Ok(())
    }

    fn configure_encoder_directions(
        &mut self,
        x: EncoderDirection,
        y: EncoderDirection,
    ) -> Result<(), SensorError> {
        self.check_configuration()?;
        self.state.borrow_mut().directions = Some((x, y));
        Ok(())
    }

    fn reset_position_and_orientation(&mut self) -> Result<(), SensorError> {
        let state = &mut *self.state.borrow_mut();
        state.origin = state.raw;
        state.reported = Pose2D::ORIGIN;
        state.resets += 1;
        Ok(())
    }

    fn update(&mut self) -> Result<(), SensorError> {
        let state = &mut *self.state.borrow_mut();
        if let Some(err) = &state.fail_update {
            return Err(err.clone());
        }
        let motion = state.motion;
        state.raw.x += motion.x;
        state.raw.y += motion.y;
        state.raw.heading += motion.heading;
        state.reported = state.raw.relative_to(&state.origin);
        state.updates += 1;
        Ok(())
    }

    fn position(&self) -> Pose2D {
        self.state.borrow().reported
    }

    fn device_status(&self) -> DeviceStatus {
        self.state.borrow().status
    }
}
