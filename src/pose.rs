// Pose tracking on top of the odometry computer, with a permanent degraded mode

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::OdometryConfig;
use crate::devices::{DeviceStatus, Pose2D, PoseSensor, SensorError};

/// A pose read this tick. `seq` increases by one per successful read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseReading {
    pub pose: Pose2D,
    pub status: DeviceStatus,
    pub seq: u64,
}

enum TrackerState {
    Online(Box<dyn PoseSensor>),
    Degraded(SensorError),
}

pub struct PoseTracker {
    state: TrackerState,
    origin_reset: bool,
    seq: u64,
}

impl PoseTracker {
    /// Configure an acquired sensor, or fall back to degraded mode.
    ///
    /// Any failure, whether acquiring the device or configuring it, leaves the
    /// tracker degraded for the rest of the run.
    pub fn try_init(acquired: Result<Box<dyn PoseSensor>, SensorError>, config: &OdometryConfig) -> Self {
        let state = match acquired.and_then(|sensor| configure(sensor, config)) {
            Ok(sensor) => {
                info!("Pose sensor ready, status {}", sensor.device_status());
                TrackerState::Online(sensor)
            }
            Err(e) => {
                warn!("Pose sensor unavailable, continuing without odometry: {}", e);
                TrackerState::Degraded(e)
            }
        };
        Self {
            state,
            origin_reset: false,
            seq: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, TrackerState::Online(_))
    }

    /// Why the tracker is degraded, if it is
    pub fn failure(&self) -> Option<&SensorError> {
        match &self.state {
            TrackerState::Online(_) => None,
            TrackerState::Degraded(e) => Some(e),
        }
    }

    pub fn status(&self) -> Option<DeviceStatus> {
        match &self.state {
            TrackerState::Online(sensor) => Some(sensor.device_status()),
            TrackerState::Degraded(_) => None,
        }
    }

    /// Zero the pose at the start of the run. Only the first call has an effect.
    pub fn reset_to_origin(&mut self) {
        if self.origin_reset {
            return;
        }
        self.origin_reset = true;
        if let TrackerState::Online(sensor) = &mut self.state {
            match sensor.reset_position_and_orientation() {
                Ok(()) => info!("Pose reset to origin"),
                Err(e) => warn!("Pose reset failed: {}", e),
            }
        }
    }

    /// Refresh and read the pose for this tick.
    ///
    /// Returns None when degraded, or when this tick's update failed; a stale
    /// pose is never handed out.
    pub fn update(&mut self) -> Option<PoseReading> {
        let TrackerState::Online(sensor) = &mut self.state else {
            return None;
        };
        if let Err(e) = sensor.update() {
            warn!("Pose update failed: {}", e);
            return None;
        }
        self.seq += 1;
        Some(PoseReading {
            pose: sensor.position(),
            status: sensor.device_status(),
            seq: self.seq,
        })
    }
}

fn configure(
    mut sensor: Box<dyn PoseSensor>,
    config: &OdometryConfig,
) -> Result<Box<dyn PoseSensor>, SensorError> {
    sensor.configure_offsets(config.x_offset_mm, config.y_offset_mm)?;
    sensor.configure_encoder_resolution(config.ticks_per_mm)?;
    sensor.configure_encoder_directions(config.x_direction, config.y_direction)?;
    sensor.reset_position_and_orientation()?;
    Ok(sensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPoseSensor;

    fn online(sensor: &SimPoseSensor) -> PoseTracker {
        PoseTracker::try_init(Ok(Box::new(sensor.clone())), &OdometryConfig::default())
    }

    #[test]
    fn test_init_applies_pod_configuration() {
        let sensor = SimPoseSensor::new();
        let handle = sensor.handle();
        let tracker = online(&sensor);

        assert!(tracker.is_available());
        assert_eq!(tracker.status(), Some(DeviceStatus::Ready));
        let state = handle.borrow();
        assert_eq!(state.offsets_mm, Some((-84.0, -168.0)));
        assert!(state.ticks_per_mm.is_some());
        assert_eq!(state.resets, 1);
    }

    #[test]
    fn test_missing_sensor_degrades() {
        let mut tracker = PoseTracker::try_init(
            Err(SensorError::Absent("odometryComputer".into())),
            &OdometryConfig::default(),
        );
        assert!(!tracker.is_available());
        assert!(matches!(tracker.failure(), Some(SensorError::Absent(_))));
        tracker.reset_to_origin();
        for _ in 0..3 {
            assert_eq!(tracker.update(), None);
        }
        assert_eq!(tracker.status(), None);
    }

    #[test]
    fn test_configuration_failure_degrades() {
        let sensor = SimPoseSensor::new();
        sensor.handle().borrow_mut().fail_configuration =
            Some(SensorError::Configuration("bad pod type".into()));
        let mut tracker = online(&sensor);
        assert!(!tracker.is_available());
        assert_eq!(tracker.update(), None);
    }

    #[test]
    fn test_origin_reset_happens_once() {
        let sensor = SimPoseSensor::with_motion(Pose2D::new(0.5, 0.0, 0.0));
        let handle = sensor.handle();
        let mut tracker = online(&sensor);

        tracker.update();
        tracker.reset_to_origin();
        tracker.reset_to_origin();
        // One reset during init, one at start of run
        assert_eq!(handle.borrow().resets, 2);

        let reading = tracker.update().unwrap();
        assert_eq!(reading.pose, Pose2D::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let sensor = SimPoseSensor::with_motion(Pose2D::new(1.0, 1.0, 0.0));
        let mut tracker = online(&sensor);
        let a = tracker.update().unwrap();
        let b = tracker.update().unwrap();
        assert!(b.seq > a.seq);
        assert_eq!(b.pose, Pose2D::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn test_failed_update_reports_no_pose() {
        let sensor = SimPoseSensor::with_motion(Pose2D::new(1.0, 0.0, 0.0));
        let handle = sensor.handle();
        let mut tracker = online(&sensor);
        assert!(tracker.update().is_some());

        handle.borrow_mut().fail_update = Some(SensorError::Communication("i2c nack".into()));
        assert_eq!(tracker.update(), None);
        // Still online; recovers on the next good read
        assert!(tracker.is_available());
        handle.borrow_mut().fail_update = None;
        assert!(tracker.update().is_some());
    }
}
