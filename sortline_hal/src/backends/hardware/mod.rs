//! Hardware backend: GPIO conveyor/sensor/relay plus V4L camera.
//!
//! Transient I/O failures are absorbed here per the `SensingBackend`
//! contract: a failed sensor read reports `false`, a failed grab
//! reports `None`. Only initialization and explicit commands surface
//! errors.

mod camera;
mod gpio;
mod pca9685;

pub use pca9685::Pca9685Bus;

use camera::Camera;
use gpio::{Direction, GpioLine};
use sortline_common::config::{CameraConfig, PinConfig};
use sortline_common::hal::driver::{HalError, SensingBackend};
use sortline_common::hal::types::{ConveyorDirection, Frame};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// GPIO + V4L sensing backend.
pub struct HardwareBackend {
    motor_in1: GpioLine,
    motor_in2: GpioLine,
    motor_in3: GpioLine,
    motor_in4: GpioLine,
    motor_ena: GpioLine,
    motor_enb: GpioLine,
    sensor: GpioLine,
    relay: GpioLine,
    camera: Camera,
    relay_on: AtomicBool,
    released: AtomicBool,
}

impl HardwareBackend {
    /// Export all configured pins and open the camera.
    pub fn open(pins: &PinConfig, camera: &CameraConfig) -> Result<Self, HalError> {
        let backend = Self {
            motor_in1: GpioLine::open(pins.motor_in1, Direction::Out)?,
            motor_in2: GpioLine::open(pins.motor_in2, Direction::Out)?,
            motor_in3: GpioLine::open(pins.motor_in3, Direction::Out)?,
            motor_in4: GpioLine::open(pins.motor_in4, Direction::Out)?,
            motor_ena: GpioLine::open(pins.motor_ena, Direction::Out)?,
            motor_enb: GpioLine::open(pins.motor_enb, Direction::Out)?,
            sensor: GpioLine::open(pins.sensor, Direction::In)?,
            relay: GpioLine::open(pins.relay, Direction::Out)?,
            camera: Camera::open(camera)?,
            relay_on: AtomicBool::new(false),
            released: AtomicBool::new(false),
        };

        // Known-safe initial state: motors released, relay off.
        backend.stop_conveyor()?;
        backend.set_relay(false)?;
        Ok(backend)
    }

    fn write_motor_lines(&self, levels: [bool; 4]) -> Result<(), HalError> {
        self.motor_in1.write(levels[0])?;
        self.motor_in2.write(levels[1])?;
        self.motor_in3.write(levels[2])?;
        self.motor_in4.write(levels[3])
    }
}

impl SensingBackend for HardwareBackend {
    fn name(&self) -> &'static str {
        "gpio"
    }

    fn read_sensor(&self) -> bool {
        match self.sensor.read() {
            Ok(level) => level,
            Err(e) => {
                debug!("sensor read failed, reporting low: {e}");
                false
            }
        }
    }

    fn grab_frame(&self) -> Option<Frame> {
        self.camera.grab()
    }

    fn is_camera_available(&self) -> bool {
        self.camera.is_available()
    }

    fn set_conveyor(&self, speed_pct: u8, direction: ConveyorDirection) -> Result<(), HalError> {
        let speed = speed_pct.min(100);
        let levels = match direction {
            ConveyorDirection::Forward => [true, false, true, false],
            ConveyorDirection::Backward => [false, true, false, true],
            ConveyorDirection::Stop => [false, false, false, false],
        };
        self.write_motor_lines(levels)?;

        // The enable lines are digital on this board revision: the
        // belt runs at full speed whenever speed > 0 and the direction
        // lines are set. Speed modulation needs the PWM-capable driver.
        let enabled = speed > 0 && direction != ConveyorDirection::Stop;
        self.motor_ena.write(enabled)?;
        self.motor_enb.write(enabled)?;
        debug!("conveyor: {speed}% {direction:?}");
        Ok(())
    }

    fn set_relay(&self, on: bool) -> Result<(), HalError> {
        self.relay.write(on)?;
        self.relay_on.store(on, Ordering::Relaxed);
        Ok(())
    }

    fn relay_state(&self) -> bool {
        self.relay_on.load(Ordering::Relaxed)
    }

    fn shutdown(&self) -> Result<(), HalError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Safe outputs first, then release everything. Failures are
        // collected into one error but never stop the remaining steps.
        let mut first_error = None;
        for result in [self.stop_conveyor(), self.set_relay(false)] {
            if let Err(e) = result {
                warn!("shutdown step failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        self.camera.release();
        for line in [
            &self.motor_in1,
            &self.motor_in2,
            &self.motor_in3,
            &self.motor_in4,
            &self.motor_ena,
            &self.motor_enb,
            &self.sensor,
            &self.relay,
        ] {
            line.release();
        }

        match first_error {
            Some(e) => Err(HalError::ReleaseFailed(e.to_string())),
            None => Ok(()),
        }
    }
}
