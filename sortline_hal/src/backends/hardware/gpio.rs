//! Sysfs GPIO lines.
//!
//! Minimal wrapper over `/sys/class/gpio`. Lines are exported on open
//! and unexported on release; reads and writes go through the `value`
//! attribute file.

use sortline_common::hal::driver::HalError;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

const GPIO_ROOT: &str = "/sys/class/gpio";

/// Line direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input line (sensor).
    In,
    /// Output line (motor, relay, enable).
    Out,
}

/// One exported sysfs GPIO line.
#[derive(Debug)]
pub struct GpioLine {
    pin: u8,
    value_path: PathBuf,
}

impl GpioLine {
    /// Export the pin and set its direction.
    pub fn open(pin: u8, direction: Direction) -> Result<Self, HalError> {
        let pin_dir = PathBuf::from(format!("{GPIO_ROOT}/gpio{pin}"));
        if !pin_dir.exists() {
            fs::write(format!("{GPIO_ROOT}/export"), pin.to_string())
                .map_err(|e| HalError::InitFailed(format!("export gpio{pin}: {e}")))?;
        }

        let direction_str = match direction {
            Direction::In => "in",
            Direction::Out => "out",
        };
        fs::write(pin_dir.join("direction"), direction_str)
            .map_err(|e| HalError::InitFailed(format!("gpio{pin} direction: {e}")))?;

        Ok(Self {
            pin,
            value_path: pin_dir.join("value"),
        })
    }

    /// Drive the line high or low.
    pub fn write(&self, high: bool) -> Result<(), HalError> {
        fs::write(&self.value_path, if high { "1" } else { "0" })
            .map_err(|e| HalError::CommunicationError(format!("gpio{} write: {e}", self.pin)))
    }

    /// Read the line level.
    pub fn read(&self) -> Result<bool, HalError> {
        let raw = fs::read_to_string(&self.value_path)
            .map_err(|e| HalError::CommunicationError(format!("gpio{} read: {e}", self.pin)))?;
        Ok(raw.trim() == "1")
    }

    /// Unexport the pin. Failures are logged, not propagated — release
    /// runs on the shutdown path where nothing can act on the error.
    pub fn release(&self) {
        if let Err(e) = fs::write(format!("{GPIO_ROOT}/unexport"), self.pin.to_string()) {
            warn!("unexport gpio{} failed: {e}", self.pin);
        }
    }
}
