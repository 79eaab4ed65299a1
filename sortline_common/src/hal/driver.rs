//! Sensing backend and servo bus contracts.
//!
//! This module defines:
//! - `SensingBackend` trait - sensor, camera, conveyor and relay access
//! - `ServoBus` trait - the PWM driver chip behind the actuators
//! - `HalError` enum - error types for HAL operations

use crate::hal::types::{ConveyorDirection, Frame};
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Backend initialization failed
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// Bus or device communication error
    #[error("device communication error: {0}")]
    CommunicationError(String),

    /// Requested channel does not exist on the device
    #[error("invalid channel {0}")]
    InvalidChannel(u8),

    /// Resource release failed during shutdown
    #[error("release failed: {0}")]
    ReleaseFailed(String),
}

/// Interface to the station's sensing and auxiliary hardware.
///
/// Exactly two implementations exist: a hardware backend (GPIO, V4L
/// capture) and a simulation backend. The active one is selected once
/// at startup from configuration and never probed per call; everything
/// above this trait is agnostic to which is running.
///
/// # Failure policy
///
/// Transient I/O failures stay inside the backend: `read_sensor`
/// reports `false` and `grab_frame` reports `None` instead of
/// propagating errors, so a flaky camera or sensor line degrades to
/// skipped cycles rather than a stopped loop.
pub trait SensingBackend: Send + Sync {
    /// Backend identifier (e.g., "simulation", "gpio").
    fn name(&self) -> &'static str;

    /// Current break-beam sensor level. A read failure reports `false`.
    fn read_sensor(&self) -> bool;

    /// Latest camera frame, non-blocking best effort.
    /// Returns `None` when no frame is available or capture failed.
    fn grab_frame(&self) -> Option<Frame>;

    /// Whether a camera is attached and open.
    fn is_camera_available(&self) -> bool;

    /// Drive the conveyor at `speed_pct` (clamped to 0..=100) in the
    /// given direction. `Stop` releases all motor lines.
    fn set_conveyor(&self, speed_pct: u8, direction: ConveyorDirection) -> Result<(), HalError>;

    /// Stop the conveyor. Shorthand for a zero-speed `Stop` command.
    fn stop_conveyor(&self) -> Result<(), HalError> {
        self.set_conveyor(0, ConveyorDirection::Stop)
    }

    /// Switch the auxiliary relay output.
    fn set_relay(&self, on: bool) -> Result<(), HalError>;

    /// Last commanded relay state.
    fn relay_state(&self) -> bool;

    /// Release hardware resources (camera handle, GPIO lines).
    ///
    /// Must be idempotent: the station shutdown path may call it more
    /// than once, including after a loop failed to join in time.
    fn shutdown(&self) -> Result<(), HalError>;
}

/// Interface to the PWM servo driver chip (PCA9685 or simulated).
///
/// Continuous-rotation joints are commanded with a throttle in
/// `-1.0..=1.0`; the single-servo gate is commanded with a positional
/// angle in `0.0..=180.0` degrees.
pub trait ServoBus: Send + Sync {
    /// Set the throttle of a continuous-rotation channel.
    /// Values outside `-1.0..=1.0` are clamped by the implementation.
    fn set_throttle(&self, channel: u8, throttle: f64) -> Result<(), HalError>;

    /// Set the angle of a positional servo channel (0..=180 degrees).
    fn set_angle(&self, channel: u8, angle: f64) -> Result<(), HalError>;

    /// Release the bus (zero all channels, close the device handle).
    /// Must be idempotent.
    fn release(&self) -> Result<(), HalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackend;

    impl SensingBackend for NullBackend {
        fn name(&self) -> &'static str {
            "null"
        }
        fn read_sensor(&self) -> bool {
            false
        }
        fn grab_frame(&self) -> Option<Frame> {
            None
        }
        fn is_camera_available(&self) -> bool {
            false
        }
        fn set_conveyor(
            &self,
            _speed_pct: u8,
            _direction: ConveyorDirection,
        ) -> Result<(), HalError> {
            Ok(())
        }
        fn set_relay(&self, _on: bool) -> Result<(), HalError> {
            Ok(())
        }
        fn relay_state(&self) -> bool {
            false
        }
        fn shutdown(&self) -> Result<(), HalError> {
            Ok(())
        }
    }

    #[test]
    fn stop_conveyor_default_delegates() {
        let backend = NullBackend;
        assert!(backend.stop_conveyor().is_ok());
    }

    #[test]
    fn hal_error_display() {
        let err = HalError::InitFailed("no i2c bus".to_string());
        assert!(err.to_string().contains("no i2c bus"));

        let err = HalError::InvalidChannel(9);
        assert!(err.to_string().contains('9'));
    }
}
