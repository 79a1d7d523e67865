// Fixed-rate control loop over zenoh, with an input watchdog
// Note: if the driver station stops publishing, the watchdog swaps in a neutral
// gamepad so the robot coasts to zero instead of repeating the last stick position

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::time::{interval, sleep, Interval};
use tracing::{info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

use crate::bridge::{ActuatorBus, BridgePoseSensor, BusMotor, BusServo, PoseInbox, SharedBus, SharedInbox};
use crate::config::{
    ControlConfig, POSE_ACQUIRE_TIMEOUT, POSE_STALE_TIMEOUT, TOPIC_ACTIVE, TOPIC_ACTUATORS,
    TOPIC_HEALTH, TOPIC_INPUT, TOPIC_MOTOR_FEEDBACK, TOPIC_POSE, TOPIC_POSE_CONFIG,
    TOPIC_TELEMETRY,
};
use crate::actuators::MechanismDevices;
use crate::control::{ControlLoop, Hardware, LoopPhase};
use crate::devices::{PoseSensor, SensorError};
use crate::drive::DriveMotors;
use crate::messages::{
    ActiveSignal, ActuatorFrame, InputSnapshot, MotorChannel, MotorFeedback, PoseSample, RuntimeHealth,
    ServoChannel,
};
use crate::telemetry::{LogTelemetry, TelemetryReport};

type FifoSubscriber = Subscriber<FifoChannelHandler<Sample>>;

/// How the binary was asked to run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: ControlConfig,
    /// Start driving without waiting for the active signal
    pub autostart: bool,
    pub pose_enabled: bool,
}

/// Keeps the latest gamepad snapshot and falls back to neutral when it goes stale
pub struct InputWatchdog {
    latest: Option<InputSnapshot>,
    received_at: Instant,
    timeout: Duration,
    stale: bool,
}

impl InputWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            latest: None,
            received_at: Instant::now(),
            timeout,
            stale: true, // Start stale until first snapshot
        }
    }

    /// Process incoming snapshot
    pub fn on_input(&mut self, snapshot: InputSnapshot) {
        self.latest = Some(snapshot);
        self.received_at = Instant::now();
    }

    /// Snapshot to use this tick
    pub fn current(&mut self) -> InputSnapshot {
        let age = self.received_at.elapsed();

        match self.latest {
            Some(snapshot) if age <= self.timeout => {
                if self.stale {
                    info!("Gamepad input live");
                }
                self.stale = false;
                snapshot
            }
            Some(_) => {
                if !self.stale {
                    warn!("Gamepad input stale ({:?} old), using neutral input", age);
                }
                self.stale = true;
                InputSnapshot::default()
            }
            None => {
                self.stale = true;
                InputSnapshot::default()
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

fn health(phase: LoopPhase, input_stale: bool) -> RuntimeHealth {
    match phase {
        LoopPhase::Waiting => RuntimeHealth::Waiting,
        LoopPhase::Stopped => RuntimeHealth::Stopped,
        LoopPhase::Running if input_stale => RuntimeHealth::InputStale,
        LoopPhase::Running => RuntimeHealth::Ok,
    }
}

/// Decode every pending sample, keep the last one that parses
fn drain_latest<T: DeserializeOwned>(subscriber: &FifoSubscriber, topic: &str) -> Option<T> {
    let mut latest = None;
    while let Ok(Some(sample)) = subscriber.try_recv() {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<T>(&payload) {
            Ok(msg) => latest = Some(msg),
            Err(e) => warn!("Failed to parse message on {}: {}", topic, e),
        }
    }
    latest
}

fn build_hardware(
    bus: &SharedBus,
    pose_sensor: Result<Box<dyn PoseSensor>, SensorError>,
) -> Hardware {
    let motor = |channel| Box::new(BusMotor::new(channel, bus));
    Hardware {
        drive: DriveMotors {
            front_left: motor(MotorChannel::FrontLeft),
            front_right: motor(MotorChannel::FrontRight),
            back_left: motor(MotorChannel::BackLeft),
            back_right: motor(MotorChannel::BackRight),
        },
        mechanisms: MechanismDevices {
            intake: motor(MotorChannel::Intake),
            lift: motor(MotorChannel::Lift),
            launcher1: motor(MotorChannel::Launcher1),
            launcher2: motor(MotorChannel::Launcher2),
            primary_arm: Box::new(BusServo::new(ServoChannel::PrimaryArm, bus)),
            secondary_arm: Box::new(BusServo::new(ServoChannel::SecondaryArm, bus)),
        },
        pose_sensor,
        telemetry: Box::new(LogTelemetry::new()),
    }
}

/// Wait for the odometry computer to speak, then take it over
async fn acquire_pose_sensor(
    subscriber: &FifoSubscriber,
    inbox: &SharedInbox,
    enabled: bool,
) -> Result<Box<dyn PoseSensor>, SensorError> {
    if !enabled {
        return Err(SensorError::Disabled);
    }

    info!(
        "Waiting up to {:?} for odometry on {}",
        POSE_ACQUIRE_TIMEOUT, TOPIC_POSE
    );
    let deadline = Instant::now() + POSE_ACQUIRE_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(sample) = drain_latest::<PoseSample>(subscriber, TOPIC_POSE) {
            inbox.borrow_mut().receive(sample);
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let sensor = BridgePoseSensor::acquire(inbox, POSE_STALE_TIMEOUT)?;
    Ok(Box::new(sensor))
}

async fn publish_frame(
    publisher: &Publisher<'_>,
    bus: &SharedBus,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let frame = bus.borrow_mut().take_frame();
    publisher.put(serde_json::to_string(&frame)?).await?;
    Ok(())
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let RunOptions {
        config,
        autostart,
        pose_enabled,
    } = options;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_input = session.declare_subscriber(TOPIC_INPUT).await?;
    let sub_active = session.declare_subscriber(TOPIC_ACTIVE).await?;
    let sub_pose = session.declare_subscriber(TOPIC_POSE).await?;
    let sub_feedback = session.declare_subscriber(TOPIC_MOTOR_FEEDBACK).await?;
    let pub_actuators = session.declare_publisher(TOPIC_ACTUATORS).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_pose_config = session.declare_publisher(TOPIC_POSE_CONFIG).await?;

    let bus = ActuatorBus::shared();
    let inbox = PoseInbox::shared();

    let pose_sensor = acquire_pose_sensor(&sub_pose, &inbox, pose_enabled).await;
    let mut watchdog = InputWatchdog::new(config.input_timeout());
    let mut tick = interval(config.loop_period());
    let loop_hz = config.loop_hz;
    let mut control = ControlLoop::new(config, build_hardware(&bus, pose_sensor));

    // Motor setup, initial stop and servo homing go out before the first tick
    publish_frame(&pub_actuators, &bus).await?;
    let pod_config = inbox.borrow_mut().take_config();
    if let Some(pod_config) = pod_config {
        pub_pose_config.put(serde_json::to_string(&pod_config)?).await?;
    }

    info!(
        "Runtime started: {}Hz loop, {}ms input watchdog, odometry {}",
        loop_hz,
        watchdog.timeout.as_millis(),
        if control.pose_available() { "online" } else { "unavailable" }
    );
    info!("Subscribed to: {}, {}, {}, {}", TOPIC_INPUT, TOPIC_ACTIVE, TOPIC_POSE, TOPIC_MOTOR_FEEDBACK);
    info!("Publishing to: {}, {}, {}", TOPIC_ACTUATORS, TOPIC_TELEMETRY, TOPIC_HEALTH);

    let mut active = autostart;
    if !active {
        info!("Waiting for start on {}", TOPIC_ACTIVE);
    }

    let channels = Channels {
        sub_input,
        sub_active,
        sub_pose,
        sub_feedback,
        pub_actuators,
        pub_telemetry,
        pub_health,
    };
    let result = run_cycles(
        &channels,
        &mut control,
        &bus,
        &inbox,
        &mut watchdog,
        &mut tick,
        &mut active,
    )
    .await;
    if let Err(e) = &result {
        warn!("Control loop failed: {}", e);
    }

    // Runs on every exit path; no-op if the stop signal already did it
    let frame = stop_frame(&mut control, &bus);
    match serde_json::to_string(&frame) {
        Ok(json) => {
            if let Err(e) = channels.pub_actuators.put(json).await {
                warn!("Failed to publish all-stop frame: {}", e);
            }
        }
        Err(e) => warn!("Failed to encode all-stop frame: {}", e),
    }
    publish_health(&channels.pub_health, RuntimeHealth::Stopped).await;
    info!("Runtime stopped");
    result
}

/// Zenoh endpoints the loop reads from and writes to
struct Channels {
    sub_input: FifoSubscriber,
    sub_active: FifoSubscriber,
    sub_pose: FifoSubscriber,
    sub_feedback: FifoSubscriber,
    pub_actuators: Publisher<'static>,
    pub_telemetry: Publisher<'static>,
    pub_health: Publisher<'static>,
}

/// Tick until stopped, interrupted, or the actuator frame cannot be published
async fn run_cycles(
    channels: &Channels,
    control: &mut ControlLoop,
    bus: &SharedBus,
    inbox: &SharedInbox,
    watchdog: &mut InputWatchdog,
    tick: &mut Interval,
    active: &mut bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                return Ok(());
            }
        }

        // 1. Drain all pending messages (non-blocking), keep latest
        if let Some(snapshot) = drain_latest::<InputSnapshot>(&channels.sub_input, TOPIC_INPUT) {
            watchdog.on_input(snapshot);
        }
        if let Some(signal) = drain_latest::<ActiveSignal>(&channels.sub_active, TOPIC_ACTIVE) {
            if signal.active != *active {
                info!("Active signal: {}", signal.active);
            }
            *active = signal.active;
        }
        if let Some(sample) = drain_latest::<PoseSample>(&channels.sub_pose, TOPIC_POSE) {
            inbox.borrow_mut().receive(sample);
        }
        if let Some(feedback) =
            drain_latest::<MotorFeedback>(&channels.sub_feedback, TOPIC_MOTOR_FEEDBACK)
        {
            bus.borrow_mut().apply_feedback(&feedback);
        }

        // 2. Run the control cycle (includes watchdog input)
        let input = watchdog.current();
        let outcome = control.tick(&input, *active);

        // 3. Publish actuation; telemetry is best effort
        publish_frame(&channels.pub_actuators, bus).await?;
        if let Some(report) = &outcome.report {
            publish_telemetry(&channels.pub_telemetry, report).await;
        }

        // 4. Publish health
        publish_health(
            &channels.pub_health,
            health(outcome.phase, watchdog.is_stale()),
        )
        .await;

        if outcome.phase == LoopPhase::Stopped {
            return Ok(());
        }
    }
}

/// Issue the all-stop (if not already issued) and collect it into a frame
fn stop_frame(control: &mut ControlLoop, bus: &SharedBus) -> ActuatorFrame {
    control.shutdown();
    bus.borrow_mut().take_frame()
}

async fn publish_telemetry(publisher: &Publisher<'_>, report: &TelemetryReport) {
    let json = match serde_json::to_string(report) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode telemetry: {}", e);
            return;
        }
    };
    if let Err(e) = publisher.put(json).await {
        warn!("Failed to publish telemetry: {}", e);
    }
}

async fn publish_health(publisher: &Publisher<'_>, health: RuntimeHealth) {
    let json = match serde_json::to_string(&health) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode health: {}", e);
            return;
        }
    };
    if let Err(e) = publisher.put(json).await {
        warn!("Failed to publish health: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::GamepadState;

    fn pushing_forward() -> InputSnapshot {
        InputSnapshot {
            driver: GamepadState {
                left_stick_y: 1.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_watchdog_neutral_before_first_input() {
        let mut watchdog = InputWatchdog::new(Duration::from_millis(250));
        assert_eq!(watchdog.current(), InputSnapshot::default());
        assert!(watchdog.is_stale());
    }

    #[test]
    fn test_watchdog_passes_fresh_input() {
        let mut watchdog = InputWatchdog::new(Duration::from_secs(5));
        watchdog.on_input(pushing_forward());
        assert_eq!(watchdog.current(), pushing_forward());
        assert!(!watchdog.is_stale());
    }

    #[test]
    fn test_watchdog_expires_input() {
        let mut watchdog = InputWatchdog::new(Duration::from_millis(1));
        watchdog.on_input(pushing_forward());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(watchdog.current(), InputSnapshot::default());
        assert!(watchdog.is_stale());
    }

    #[test]
    fn test_stop_frame_zeroes_every_motor() {
        let bus = ActuatorBus::shared();
        let mut control = ControlLoop::new(
            ControlConfig::default(),
            build_hardware(&bus, Err(SensorError::Disabled)),
        );
        bus.borrow_mut().take_frame();

        control.tick(&pushing_forward(), true);
        let driving = bus.borrow_mut().take_frame();
        assert!(driving.motors.iter().any(|m| !m.command.is_stop()));

        // Loop bailed out mid-run: the final frame must carry the all-stop
        let frame = stop_frame(&mut control, &bus);
        assert_eq!(frame.motors.len(), 8);
        assert!(frame.motors.iter().all(|m| m.command.is_stop()));
        assert_eq!(control.phase(), LoopPhase::Stopped);

        // Already stopped: nothing more to send
        assert!(stop_frame(&mut control, &bus).is_empty());
    }

    #[test]
    fn test_health_mapping() {
        assert_eq!(health(LoopPhase::Waiting, true), RuntimeHealth::Waiting);
        assert_eq!(health(LoopPhase::Running, true), RuntimeHealth::InputStale);
        assert_eq!(health(LoopPhase::Running, false), RuntimeHealth::Ok);
        assert_eq!(health(LoopPhase::Stopped, false), RuntimeHealth::Stopped);
    }
}
