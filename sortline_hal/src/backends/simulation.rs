//! Simulation backend.
//!
//! Emulates the sensor, camera, conveyor, relay and servo bus in
//! software so the full inspection-and-sorting pipeline runs without
//! any physical device. Call shapes and failure modes match the
//! hardware backend exactly.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sortline_common::config::CameraConfig;
use sortline_common::hal::driver::{HalError, SensingBackend, ServoBus};
use sortline_common::hal::types::{ConveyorDirection, Frame};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Software-emulated sensing backend.
pub struct SimulationBackend {
    rng: Mutex<StdRng>,
    frame_width: u32,
    frame_height: u32,
    frame_counter: Mutex<u64>,
    relay_on: AtomicBool,
    released: AtomicBool,
}

impl SimulationBackend {
    /// Create a backend producing synthetic frames at the configured size.
    pub fn new(camera: &CameraConfig) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            frame_width: camera.width,
            frame_height: camera.height,
            frame_counter: Mutex::new(0),
            relay_on: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(camera: &CameraConfig, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            frame_width: camera.width,
            frame_height: camera.height,
            frame_counter: Mutex::new(0),
            relay_on: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// Synthetic grayscale frame: horizontal gradient plus a moving
    /// band so successive frames differ visibly on a display.
    fn synthesize_frame(&self) -> Frame {
        let mut counter = self.frame_counter.lock();
        *counter += 1;
        let phase = (*counter % 256) as u32;
        drop(counter);

        let (w, h) = (self.frame_width, self.frame_height);
        let mut data = Vec::with_capacity(w as usize * h as usize);
        for y in 0..h {
            for x in 0..w {
                let gradient = (x * 255 / w.max(1)) as u8;
                let band = if (y + phase) % 64 < 8 { 64u8 } else { 0 };
                data.push(gradient.saturating_add(band));
            }
        }
        Frame {
            width: w,
            height: h,
            channels: 1,
            data,
        }
    }
}

impl SensingBackend for SimulationBackend {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn read_sensor(&self) -> bool {
        // Coin-flip sensor, matching the commissioning behavior of the
        // physical break beam with parts spaced at random.
        self.rng.lock().r#gen::<bool>()
    }

    fn grab_frame(&self) -> Option<Frame> {
        if self.released.load(Ordering::Relaxed) {
            return None;
        }
        Some(self.synthesize_frame())
    }

    fn is_camera_available(&self) -> bool {
        !self.released.load(Ordering::Relaxed)
    }

    fn set_conveyor(&self, speed_pct: u8, direction: ConveyorDirection) -> Result<(), HalError> {
        let speed = speed_pct.min(100);
        debug!("sim conveyor: {speed}% {direction:?}");
        Ok(())
    }

    fn set_relay(&self, on: bool) -> Result<(), HalError> {
        debug!("sim relay: {}", if on { "on" } else { "off" });
        self.relay_on.store(on, Ordering::Relaxed);
        Ok(())
    }

    fn relay_state(&self) -> bool {
        self.relay_on.load(Ordering::Relaxed)
    }

    fn shutdown(&self) -> Result<(), HalError> {
        self.released.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Number of PWM channels on the (simulated) servo driver chip.
const BUS_CHANNELS: usize = 16;

/// Records every command so tests can assert on drive signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BusCommand {
    /// Continuous-rotation throttle written to a channel.
    Throttle {
        /// PWM channel.
        channel: u8,
        /// Applied throttle, after clamping.
        value: f64,
    },
    /// Positional angle written to a channel.
    Angle {
        /// PWM channel.
        channel: u8,
        /// Applied angle, after clamping.
        value: f64,
    },
}

/// In-memory servo bus double.
#[derive(Debug, Default)]
pub struct SimulatedBus {
    throttles: Mutex<[f64; BUS_CHANNELS]>,
    log: Mutex<Vec<BusCommand>>,
    released: AtomicBool,
}

impl SimulatedBus {
    /// Create a bus with all channels at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded throttle per channel.
    pub fn throttles(&self) -> [f64; BUS_CHANNELS] {
        *self.throttles.lock()
    }

    /// Last commanded throttle of one channel.
    pub fn throttle(&self, channel: u8) -> f64 {
        self.throttles.lock()[channel as usize % BUS_CHANNELS]
    }

    /// Full command history.
    pub fn history(&self) -> Vec<BusCommand> {
        self.log.lock().clone()
    }

    /// Whether `release` has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }
}

impl ServoBus for SimulatedBus {
    fn set_throttle(&self, channel: u8, throttle: f64) -> Result<(), HalError> {
        if self.released.load(Ordering::Relaxed) {
            return Err(HalError::CommunicationError("servo bus released".to_string()));
        }
        if channel as usize >= BUS_CHANNELS {
            return Err(HalError::InvalidChannel(channel));
        }
        let value = throttle.clamp(-1.0, 1.0);
        self.throttles.lock()[channel as usize] = value;
        self.log.lock().push(BusCommand::Throttle { channel, value });
        Ok(())
    }

    fn set_angle(&self, channel: u8, angle: f64) -> Result<(), HalError> {
        if self.released.load(Ordering::Relaxed) {
            return Err(HalError::CommunicationError("servo bus released".to_string()));
        }
        if channel as usize >= BUS_CHANNELS {
            return Err(HalError::InvalidChannel(channel));
        }
        let value = angle.clamp(0.0, 180.0);
        self.log.lock().push(BusCommand::Angle { channel, value });
        Ok(())
    }

    fn release(&self) -> Result<(), HalError> {
        let mut throttles = self.throttles.lock();
        *throttles = [0.0; BUS_CHANNELS];
        self.released.store(true, Ordering::Relaxed);
        Ok(())
    }
}
