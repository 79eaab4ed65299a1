//! Six-axis arm driver.
//!
//! The arm is built from continuous-rotation servos, so a "position"
//! command is really a timed drive: convert the target angle to a
//! normalized drive signal, hold it for the commanded duration, then
//! stop explicitly. Unlike positional servos, a continuous-rotation
//! unit keeps spinning until the zero command arrives.

use super::MotionInterrupt;
use parking_lot::Mutex;
use sortline_common::consts::JOINT_COUNT;
use sortline_common::hal::driver::ServoBus;
use sortline_common::motion::{JointConfig, MotionError, Position};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-joint listing for the control surface.
#[derive(Debug, Clone, PartialEq)]
pub struct JointInfo {
    /// Joint name from configuration.
    pub name: String,
    /// PWM channel.
    pub channel: u8,
    /// Current angle in degrees.
    pub current_angle: f64,
    /// Minimum reachable angle.
    pub min_angle: f64,
    /// Maximum reachable angle.
    pub max_angle: f64,
}

/// Driver for the six-joint continuous-rotation arm.
pub struct ArmActuator {
    bus: Arc<dyn ServoBus>,
    joints: Vec<JointConfig>,
    current: Mutex<Position>,
    moving: AtomicBool,
    interrupt: MotionInterrupt,
}

impl ArmActuator {
    /// Create the driver over a servo bus. Requires exactly
    /// [`JOINT_COUNT`] joint configurations.
    pub fn new(bus: Arc<dyn ServoBus>, joints: Vec<JointConfig>) -> Result<Self, MotionError> {
        if joints.len() != JOINT_COUNT {
            return Err(MotionError::UnknownJoint(joints.len()));
        }
        Ok(Self {
            bus,
            joints,
            current: Mutex::new(Position::zero()),
            moving: AtomicBool::new(false),
            interrupt: MotionInterrupt::new(),
        })
    }

    /// Joint configurations, in joint order.
    pub fn joints(&self) -> &[JointConfig] {
        &self.joints
    }

    /// Current pose. Updated only on successful moves.
    pub fn current_position(&self) -> Position {
        *self.current.lock()
    }

    /// Whether a move is in flight.
    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }

    /// Per-joint listing with current angles.
    pub fn joint_info(&self) -> Vec<JointInfo> {
        let current = self.current_position();
        self.joints
            .iter()
            .enumerate()
            .map(|(idx, config)| JointInfo {
                name: config.name.clone(),
                channel: config.channel,
                current_angle: current.angle(idx).unwrap_or(0.0),
                min_angle: config.min_angle,
                max_angle: config.max_angle,
            })
            .collect()
    }

    /// Clamp a target angle to the joint's range and map it to a
    /// normalized drive signal: `min → -1`, `max → +1`, linear in
    /// between.
    fn drive_for(config: &JointConfig, target_angle: f64) -> (f64, f64) {
        let clamped = target_angle.clamp(config.min_angle, config.max_angle);
        let span = config.max_angle - config.min_angle;
        let drive = 2.0 * (clamped - config.min_angle) / span - 1.0;
        (clamped, drive)
    }

    /// Move one joint to `target_angle` over `duration`.
    ///
    /// Out-of-range targets are clamped, not rejected — the applied
    /// angle is returned. The drive signal is always zeroed before
    /// returning, on success and on failure alike.
    pub fn move_joint(
        &self,
        joint: usize,
        target_angle: f64,
        duration: Duration,
    ) -> Result<f64, MotionError> {
        let config = self
            .joints
            .get(joint)
            .ok_or(MotionError::UnknownJoint(joint))?;
        let (clamped, drive) = Self::drive_for(config, target_angle);
        if clamped != target_angle {
            warn!(
                "joint '{}': target {target_angle:.1}° clamped to {clamped:.1}°",
                config.name
            );
        }

        self.moving.store(true, Ordering::SeqCst);
        let result = (|| {
            self.bus
                .set_throttle(config.channel, drive * config.speed_factor)?;
            let completed = self.interrupt.wait_for(duration);
            self.bus.set_throttle(config.channel, 0.0)?;
            if !completed {
                return Err(MotionError::Interrupted);
            }
            Ok(clamped)
        })();
        self.moving.store(false, Ordering::SeqCst);

        match result {
            Ok(applied) => {
                let mut current = self.current.lock();
                let mut angles = current.angles();
                angles[joint] = applied;
                *current = Position::new(angles);
                debug!("joint '{}' at {applied:.1}°", config.name);
                Ok(applied)
            }
            Err(e) => {
                // Belt and braces: the throttle above may not have been
                // zeroed if the bus write failed mid-move.
                let _ = self.bus.set_throttle(config.channel, 0.0);
                Err(e)
            }
        }
    }

    /// Move all joints toward `position` over one shared `duration`.
    ///
    /// Drive signals are issued back-to-back without inter-joint
    /// synchronization, then held and zeroed together. This is an
    /// approximation of coordinated motion, not trajectory planning;
    /// joints reach their targets at slightly different true times.
    pub fn move_to(&self, position: Position, duration: Duration) -> Result<(), MotionError> {
        self.moving.store(true, Ordering::SeqCst);
        let result = self.drive_all(position, duration);
        self.moving.store(false, Ordering::SeqCst);
        result
    }

    fn drive_all(&self, position: Position, duration: Duration) -> Result<(), MotionError> {
        let mut applied = [0.0; JOINT_COUNT];

        for (idx, config) in self.joints.iter().enumerate() {
            let target = position.angle(idx).unwrap_or(config.home_angle);
            let (clamped, drive) = Self::drive_for(config, target);
            applied[idx] = clamped;
            if let Err(e) = self.bus.set_throttle(config.channel, drive * config.speed_factor) {
                self.zero_all_drives();
                return Err(e.into());
            }
        }

        let completed = self.interrupt.wait_for(duration);
        self.zero_all_drives();
        if !completed {
            // Arm pose is now unknown; keep the last confirmed position.
            return Err(MotionError::Interrupted);
        }

        *self.current.lock() = Position::new(applied);
        Ok(())
    }

    /// Zero every joint's drive signal, logging rather than
    /// propagating failures.
    fn zero_all_drives(&self) {
        for config in &self.joints {
            if let Err(e) = self.bus.set_throttle(config.channel, 0.0) {
                warn!("zeroing joint '{}' failed: {e}", config.name);
            }
        }
    }

    /// Unconditionally stop: cancel any in-flight hold and zero all
    /// drive signals. Never fails; safe to call from any state.
    pub fn emergency_stop(&self) {
        self.interrupt.trigger();
        self.zero_all_drives();
        self.moving.store(false, Ordering::SeqCst);
    }
}
