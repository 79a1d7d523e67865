// Devices backed by the zenoh hardware bridge.
//
// Motors and servos write into a shared ActuatorBus that the runtime turns into
// one ActuatorFrame per tick. The pose sensor reads the latest sample the
// runtime drained from the odometry topic. Nothing here blocks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{EncoderDirection, OdometryConfig};
use crate::devices::{
    DeviceStatus, Direction, Pose2D, PoseSensor, RunMode, SensorError, ServoActuator,
    VelocityActuator,
};
use crate::messages::{
    ActuatorFrame, MotorChannel, MotorCommand, MotorFeedback, MotorOutput, MotorSetup,
    PoseSample, ServoChannel, ServoOutput,
};

/// Commands collected during a tick plus the latest feedback from the bridge
#[derive(Debug, Default)]
pub struct ActuatorBus {
    pending: ActuatorFrame,
    seq: u64,
    measured: HashMap<MotorChannel, f64>,
    servo_positions: HashMap<ServoChannel, f64>,
}

pub type SharedBus = Rc<RefCell<ActuatorBus>>;

impl ActuatorBus {
    pub fn shared() -> SharedBus {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Queue a motor command; a later command for the same channel replaces it
    pub fn command_motor(&mut self, channel: MotorChannel, command: MotorCommand) {
        let motors = &mut self.pending.motors;
        match motors.iter_mut().find(|m| m.channel == channel) {
            Some(existing) => existing.command = command,
            None => motors.push(MotorOutput { channel, command }),
        }
    }

    pub fn command_servo(&mut self, channel: ServoChannel, position: f64) {
        let position = position.clamp(0.0, 1.0);
        self.servo_positions.insert(channel, position);
        let servos = &mut self.pending.servos;
        match servos.iter_mut().find(|s| s.channel == channel) {
            Some(existing) => existing.position = position,
            None => servos.push(ServoOutput { channel, position }),
        }
    }

    pub fn setup_motor(&mut self, channel: MotorChannel, run_mode: RunMode) {
        let setup = &mut self.pending.setup;
        setup.retain(|s| s.channel != channel);
        setup.push(MotorSetup { channel, run_mode });
    }

    /// Hand out everything queued since the last call
    pub fn take_frame(&mut self) -> ActuatorFrame {
        self.seq += 1;
        let mut frame = std::mem::take(&mut self.pending);
        frame.seq = self.seq;
        frame
    }

    pub fn apply_feedback(&mut self, feedback: &MotorFeedback) {
        for reading in &feedback.motors {
            self.measured.insert(reading.channel, reading.velocity);
        }
    }

    fn measured(&self, channel: MotorChannel) -> f64 {
        self.measured.get(&channel).copied().unwrap_or(0.0)
    }
}

/// Motor on the bridge. Direction is applied here; the bridge sees raw signs.
pub struct BusMotor {
    channel: MotorChannel,
    direction: Direction,
    bus: SharedBus,
}

impl BusMotor {
    pub fn new(channel: MotorChannel, bus: &SharedBus) -> Self {
        Self {
            channel,
            direction: Direction::Forward,
            bus: Rc::clone(bus),
        }
    }
}

impl VelocityActuator for BusMotor {
    fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    fn set_run_mode(&mut self, mode: RunMode) {
        self.bus.borrow_mut().setup_motor(self.channel, mode);
    }

    fn set_target_velocity(&mut self, velocity: f64) {
        let raw = velocity * self.direction.sign();
        self.bus
            .borrow_mut()
            .command_motor(self.channel, MotorCommand::Velocity(raw));
    }

    fn set_power(&mut self, power: f64) {
        let raw = power.clamp(-1.0, 1.0) * self.direction.sign();
        self.bus
            .borrow_mut()
            .command_motor(self.channel, MotorCommand::Power(raw));
    }

    fn current_velocity(&self) -> f64 {
        self.bus.borrow().measured(self.channel) * self.direction.sign()
    }
}

pub struct BusServo {
    channel: ServoChannel,
    bus: SharedBus,
}

impl BusServo {
    pub fn new(channel: ServoChannel, bus: &SharedBus) -> Self {
        Self {
            channel,
            bus: Rc::clone(bus),
        }
    }
}

impl ServoActuator for BusServo {
    fn set_position(&mut self, position: f64) {
        self.bus.borrow_mut().command_servo(self.channel, position);
    }

    /// Last commanded position; servos report no feedback
    fn position(&self) -> f64 {
        self.bus
            .borrow()
            .servo_positions
            .get(&self.channel)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Latest odometry sample and any pod configuration waiting to be published
#[derive(Debug, Default)]
pub struct PoseInbox {
    latest: Option<(PoseSample, Instant)>,
    pending_config: Option<OdometryConfig>,
}

pub type SharedInbox = Rc<RefCell<PoseInbox>>;

impl PoseInbox {
    pub fn shared() -> SharedInbox {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn receive(&mut self, sample: PoseSample) {
        self.latest = Some((sample, Instant::now()));
    }

    pub fn take_config(&mut self) -> Option<OdometryConfig> {
        self.pending_config.take()
    }
}

/// Odometry computer behind the bridge
pub struct BridgePoseSensor {
    inbox: SharedInbox,
    stale_after: Duration,
    config: OdometryConfig,
    origin: Pose2D,
    raw: Pose2D,
    pose: Pose2D,
    status: DeviceStatus,
}

impl BridgePoseSensor {
    /// Succeeds only once the odometry computer has been heard from
    pub fn acquire(inbox: &SharedInbox, stale_after: Duration) -> Result<Self, SensorError> {
        let status = match &inbox.borrow().latest {
            Some((sample, _)) => sample.status,
            None => {
                return Err(SensorError::Absent(
                    "no samples from the odometry computer".to_string(),
                ));
            }
        };
        Ok(Self {
            inbox: Rc::clone(inbox),
            stale_after,
            config: OdometryConfig::default(),
            origin: Pose2D::ORIGIN,
            raw: Pose2D::ORIGIN,
            pose: Pose2D::ORIGIN,
            status,
        })
    }

    /// Latest sample, as long as it is younger than `stale_after`
    fn fresh_sample(&self) -> Result<PoseSample, SensorError> {
        let inbox = self.inbox.borrow();
        let Some((sample, received_at)) = inbox.latest else {
            return Err(SensorError::Communication("no pose sample".to_string()));
        };
        let age = received_at.elapsed();
        if age > self.stale_after {
            return Err(SensorError::Communication(format!(
                "pose sample stale ({:?} old)",
                age
            )));
        }
        Ok(sample)
    }

    fn publish_config(&self) {
        self.inbox.borrow_mut().pending_config = Some(self.config);
    }
}

impl PoseSensor for BridgePoseSensor {
    fn configure_offsets(&mut self, x_offset_mm: f64, y_offset_mm: f64) -> Result<(), SensorError> {
        if !x_offset_mm.is_finite() || !y_offset_mm.is_finite() {
            return Err(SensorError::Configuration(format!(
                "pod offsets must be finite, got ({}, {})",
                x_offset_mm, y_offset_mm
            )));
        }
        self.config.x_offset_mm = x_offset_mm;
        self.config.y_offset_mm = y_offset_mm;
        self.publish_config();
        Ok(())
    }

    fn configure_encoder_resolution(&mut self, ticks_per_mm: f64) -> Result<(), SensorError> {
        if !ticks_per_mm.is_finite() || ticks_per_mm <= 0.0 {
            return Err(SensorError::Configuration(format!(
                "encoder resolution must be positive, got {}",
                ticks_per_mm
            )));
        }
        self.config.ticks_per_mm = ticks_per_mm;
        self.publish_config();
        Ok(())
    }

    fn configure_encoder_directions(
        &mut self,
        x: EncoderDirection,
        y: EncoderDirection,
    ) -> Result<(), SensorError> {
        self.config.x_direction = x;
        self.config.y_direction = y;
        self.publish_config();
        Ok(())
    }

    fn reset_position_and_orientation(&mut self) -> Result<(), SensorError> {
        self.raw = self.fresh_sample()?.pose;
        self.origin = self.raw;
        self.pose = Pose2D::ORIGIN;
        debug!("Pose origin set to {:?}", self.origin);
        Ok(())
    }

    fn update(&mut self) -> Result<(), SensorError> {
        let sample = self.fresh_sample()?;
        self.raw = sample.pose;
        self.status = sample.status;
        self.pose = self.raw.relative_to(&self.origin);
        Ok(())
    }

    fn position(&self) -> Pose2D {
        self.pose
    }

    fn device_status(&self) -> DeviceStatus {
        self.status
    }
}
