//! PCA9685 16-channel PWM servo driver over I2C.
//!
//! Register-level access through `/dev/i2c-<n>` with the `I2C_SLAVE`
//! ioctl. Continuous-rotation servos (MG996R, modified) take a pulse
//! of 0.5–2.5 ms mapped from throttle; positional servos (SG90 gate)
//! take the same pulse range mapped from 0–180 degrees.

use parking_lot::Mutex;
use sortline_common::config::ServoBusConfig;
use sortline_common::hal::driver::{HalError, ServoBus};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

const I2C_SLAVE: libc::c_ulong = 0x0703;

// PCA9685 registers.
const REG_MODE1: u8 = 0x00;
const REG_PRESCALE: u8 = 0xFE;
const REG_LED0_ON_L: u8 = 0x06;

const MODE1_SLEEP: u8 = 0x10;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;

/// Internal oscillator frequency in Hz.
const OSC_HZ: f64 = 25_000_000.0;
/// PWM resolution per period.
const TICKS_PER_PERIOD: f64 = 4096.0;

/// Servo pulse range in microseconds (0.5–2.5 ms).
const PULSE_MIN_US: f64 = 500.0;
const PULSE_MAX_US: f64 = 2500.0;

const CHANNEL_COUNT: u8 = 16;

/// PCA9685 servo bus handle.
pub struct Pca9685Bus {
    device: Mutex<Option<File>>,
    frequency_hz: u32,
}

impl Pca9685Bus {
    /// Open the bus, bind the slave address, and program the PWM
    /// frequency.
    pub fn open(config: &ServoBusConfig) -> Result<Self, HalError> {
        let path = format!("/dev/i2c-{}", config.i2c_bus);
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| HalError::InitFailed(format!("open {path}: {e}")))?;

        let rc = unsafe {
            libc::ioctl(device.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(config.address))
        };
        if rc < 0 {
            return Err(HalError::InitFailed(format!(
                "bind i2c slave 0x{:02x}: {}",
                config.address,
                std::io::Error::last_os_error()
            )));
        }

        let bus = Self {
            device: Mutex::new(Some(device)),
            frequency_hz: config.frequency_hz,
        };
        bus.program_frequency(config.frequency_hz)?;
        debug!(
            "pca9685 ready on {path} @0x{:02x}, {} Hz",
            config.address, config.frequency_hz
        );
        Ok(bus)
    }

    fn write_register(&self, register: u8, value: u8) -> Result<(), HalError> {
        let mut guard = self.device.lock();
        let device = guard
            .as_mut()
            .ok_or_else(|| HalError::CommunicationError("servo bus released".to_string()))?;
        device
            .write_all(&[register, value])
            .map_err(|e| HalError::CommunicationError(format!("i2c write reg 0x{register:02x}: {e}")))
    }

    /// Datasheet prescale formula, then sleep/restart dance.
    fn program_frequency(&self, frequency_hz: u32) -> Result<(), HalError> {
        let prescale =
            (OSC_HZ / (TICKS_PER_PERIOD * f64::from(frequency_hz))).round() as u8 - 1;

        self.write_register(REG_MODE1, MODE1_SLEEP)?;
        self.write_register(REG_PRESCALE, prescale)?;
        self.write_register(REG_MODE1, MODE1_AUTO_INCREMENT)?;
        // Oscillator needs 500us to stabilise before restart.
        std::thread::sleep(std::time::Duration::from_micros(500));
        self.write_register(REG_MODE1, MODE1_AUTO_INCREMENT | MODE1_RESTART)
    }

    /// Write the off-tick of a channel (on-tick is always 0).
    fn set_pulse_us(&self, channel: u8, pulse_us: f64) -> Result<(), HalError> {
        if channel >= CHANNEL_COUNT {
            return Err(HalError::InvalidChannel(channel));
        }
        let period_us = 1_000_000.0 / f64::from(self.frequency_hz);
        let off_ticks = ((pulse_us / period_us) * TICKS_PER_PERIOD).round() as u16 & 0x0FFF;

        let base = REG_LED0_ON_L + 4 * channel;
        self.write_register(base, 0)?; // ON_L
        self.write_register(base + 1, 0)?; // ON_H
        self.write_register(base + 2, (off_ticks & 0xFF) as u8)?; // OFF_L
        self.write_register(base + 3, (off_ticks >> 8) as u8) // OFF_H
    }

    /// Stop driving a channel entirely (full-off bit).
    fn set_channel_off(&self, channel: u8) -> Result<(), HalError> {
        let base = REG_LED0_ON_L + 4 * channel;
        self.write_register(base + 3, 0x10)
    }
}

impl ServoBus for Pca9685Bus {
    fn set_throttle(&self, channel: u8, throttle: f64) -> Result<(), HalError> {
        let throttle = throttle.clamp(-1.0, 1.0);
        if throttle == 0.0 {
            // Continuous-rotation servos treat the idle pulse as slow
            // drift on worn units; dropping the pulse is a hard stop.
            return self.set_channel_off(channel.min(CHANNEL_COUNT - 1));
        }
        let pulse_us = PULSE_MIN_US + (throttle + 1.0) / 2.0 * (PULSE_MAX_US - PULSE_MIN_US);
        self.set_pulse_us(channel, pulse_us)
    }

    fn set_angle(&self, channel: u8, angle: f64) -> Result<(), HalError> {
        let angle = angle.clamp(0.0, 180.0);
        let pulse_us = PULSE_MIN_US + angle / 180.0 * (PULSE_MAX_US - PULSE_MIN_US);
        self.set_pulse_us(channel, pulse_us)
    }

    fn release(&self) -> Result<(), HalError> {
        // Best-effort stop of every channel before dropping the handle.
        for channel in 0..CHANNEL_COUNT {
            if let Err(e) = self.set_channel_off(channel) {
                warn!("channel {channel} off failed during release: {e}");
            }
        }
        self.device.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Register maths only — exercising the bus needs the chip.

    use super::*;

    #[test]
    fn prescale_for_50hz() {
        let prescale = (OSC_HZ / (TICKS_PER_PERIOD * 50.0)).round() as u8 - 1;
        assert_eq!(prescale, 121);
    }

    #[test]
    fn throttle_pulse_mapping() {
        // Center throttle maps to 1.5ms, extremes to 0.5/2.5ms.
        let pulse = |throttle: f64| {
            PULSE_MIN_US + (throttle + 1.0) / 2.0 * (PULSE_MAX_US - PULSE_MIN_US)
        };
        assert_eq!(pulse(-1.0), 500.0);
        assert_eq!(pulse(0.0), 1500.0);
        assert_eq!(pulse(1.0), 2500.0);
    }

    #[test]
    fn angle_pulse_mapping() {
        let pulse = |angle: f64| PULSE_MIN_US + angle / 180.0 * (PULSE_MAX_US - PULSE_MIN_US);
        assert_eq!(pulse(0.0), 500.0);
        assert_eq!(pulse(90.0), 1500.0);
        assert_eq!(pulse(180.0), 2500.0);
    }
}
