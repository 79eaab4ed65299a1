//! Sorting actuator drivers.
//!
//! Two variants exist, fixed at construction time: the single-servo
//! gate and the six-axis pick-and-place arm. Everything above this
//! module drives the [`Actuator`] wrapper and stays agnostic to the
//! installed kind.

mod arm;
mod servo;

pub use arm::{ArmActuator, JointInfo};
pub use servo::ServoActuator;

use parking_lot::{Condvar, Mutex};
use sortline_common::config::ActuatorKind;
use sortline_common::motion::Position;
use std::time::{Duration, Instant};

/// Cancellable motion wait.
///
/// Moves hold their drive signal for a commanded duration; an
/// emergency stop must be able to interrupt that hold rather than
/// wait out a multi-second sleep. Each `trigger` bumps a generation
/// counter and wakes all waiters; a waiter that observes a bump
/// reports interruption.
#[derive(Debug, Default)]
pub struct MotionInterrupt {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl MotionInterrupt {
    /// Create an interrupt handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block for `duration`. Returns `true` if the full duration
    /// elapsed, `false` if an interrupt arrived first.
    pub fn wait_for(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut generation = self.generation.lock();
        let start = *generation;
        while *generation == start {
            if self
                .condvar
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return true;
            }
        }
        false
    }

    /// Interrupt every in-flight wait.
    pub fn trigger(&self) {
        *self.generation.lock() += 1;
        self.condvar.notify_all();
    }
}

/// Snapshot of the actuator for the control surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorStatus {
    /// Installed actuator kind.
    pub kind: ActuatorKind,
    /// Whether a move is in flight.
    pub moving: bool,
    /// Current arm pose (arm only).
    pub position: Option<Position>,
    /// Number of driven joints (1 for the gate).
    pub joint_count: usize,
}

/// The installed sorting actuator.
pub enum Actuator {
    /// Single positional servo gate.
    Servo(ServoActuator),
    /// Six-axis continuous-rotation arm.
    Arm(ArmActuator),
}

impl Actuator {
    /// Installed kind.
    pub fn kind(&self) -> ActuatorKind {
        match self {
            Actuator::Servo(_) => ActuatorKind::Servo,
            Actuator::Arm(_) => ActuatorKind::Arm,
        }
    }

    /// Whether a move is in flight.
    pub fn is_moving(&self) -> bool {
        match self {
            Actuator::Servo(_) => false,
            Actuator::Arm(arm) => arm.is_moving(),
        }
    }

    /// Unconditionally zero every drive signal and cancel any
    /// in-flight hold. Never fails; safe from any state.
    pub fn emergency_stop(&self) {
        match self {
            Actuator::Servo(servo) => servo.emergency_stop(),
            Actuator::Arm(arm) => arm.emergency_stop(),
        }
    }

    /// Status snapshot for the control surface.
    pub fn status(&self) -> ActuatorStatus {
        match self {
            Actuator::Servo(servo) => ActuatorStatus {
                kind: ActuatorKind::Servo,
                moving: false,
                position: None,
                joint_count: 1,
            }
            .with_gate_angle(servo.current_angle()),
            Actuator::Arm(arm) => ActuatorStatus {
                kind: ActuatorKind::Arm,
                moving: arm.is_moving(),
                position: Some(arm.current_position()),
                joint_count: arm.joints().len(),
            },
        }
    }
}

impl ActuatorStatus {
    // The gate has one meaningful angle; report it as joint 0 so the
    // control surface renders both kinds through one shape.
    fn with_gate_angle(mut self, angle: f64) -> Self {
        let mut angles = [0.0; sortline_common::consts::JOINT_COUNT];
        angles[0] = angle;
        self.position = Some(Position::new(angles));
        self
    }
}
