//! Shared system state.
//!
//! `SystemState` is the only object written by one worker (the control
//! surface) and read by another (the inspection loop). All access goes
//! through the mutex-guarded [`SharedSystemState`] handle; the loops
//! take a snapshot once per poll cycle, so control-surface writes are
//! visible within one polling period.

use crate::consts::DEFAULT_THRESHOLD;
use parking_lot::Mutex;
use std::sync::Arc;

/// Control-surface flags read by the inspection loop every poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemState {
    /// Detection is armed.
    pub armed: bool,
    /// Conveyor is running.
    pub conveyor_running: bool,
    /// Pass/defect confidence threshold in `0.0..=1.0`.
    pub threshold: f64,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            armed: false,
            conveyor_running: false,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Cloneable synchronized handle to the system state.
///
/// Lives for the process lifetime; created at startup with defaults.
#[derive(Debug, Clone, Default)]
pub struct SharedSystemState {
    inner: Arc<Mutex<SystemState>>,
}

impl SharedSystemState {
    /// Create a handle with default state (disarmed, conveyor stopped).
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SystemState {
        *self.inner.lock()
    }

    /// Arm or disarm detection.
    pub fn set_armed(&self, armed: bool) {
        self.inner.lock().armed = armed;
    }

    /// Record whether the conveyor is running.
    pub fn set_conveyor_running(&self, running: bool) {
        self.inner.lock().conveyor_running = running;
    }

    /// Set the detection threshold, clamped to `0.0..=1.0`.
    pub fn set_threshold(&self, threshold: f64) {
        self.inner.lock().threshold = threshold.clamp(0.0, 1.0);
    }

    /// Current detection threshold.
    pub fn threshold(&self) -> f64 {
        self.inner.lock().threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state() {
        let state = SystemState::default();
        assert!(!state.armed);
        assert!(!state.conveyor_running);
        assert_eq!(state.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn writes_visible_through_clone() {
        let shared = SharedSystemState::new();
        let observer = shared.clone();

        shared.set_armed(true);
        shared.set_conveyor_running(true);
        let snap = observer.snapshot();
        assert!(snap.armed);
        assert!(snap.conveyor_running);
    }

    #[test]
    fn threshold_is_clamped() {
        let shared = SharedSystemState::new();
        shared.set_threshold(1.5);
        assert_eq!(shared.threshold(), 1.0);
        shared.set_threshold(-0.3);
        assert_eq!(shared.threshold(), 0.0);
    }
}
