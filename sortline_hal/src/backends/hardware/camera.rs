//! V4L frame capture via `read(2)` on the device node.
//!
//! The capture format is whatever the device delivers in read mode;
//! UVC webcams in this line deliver packed YUYV (2 bytes per pixel) at
//! the negotiated resolution. A short or failed read surfaces as "no
//! frame", never as an error to the caller.

use parking_lot::Mutex;
use sortline_common::config::CameraConfig;
use sortline_common::hal::driver::HalError;
use sortline_common::hal::types::Frame;
use std::fs::File;
use std::io::Read;
use tracing::{debug, warn};

/// Bytes per pixel for packed YUYV.
const YUYV_BYTES_PER_PIXEL: u8 = 2;

/// Camera handle over a V4L device node.
pub struct Camera {
    device: Mutex<Option<File>>,
    width: u32,
    height: u32,
}

impl Camera {
    /// Open the capture device. A missing camera is not fatal to the
    /// station — the handle is created closed and every grab yields
    /// `None`, mirroring the simulation backend's released state.
    pub fn open(config: &CameraConfig) -> Result<Self, HalError> {
        let device = match File::open(&config.device) {
            Ok(file) => {
                debug!("camera open: {}", config.device.display());
                Some(file)
            }
            Err(e) => {
                warn!("camera {} unavailable: {e}", config.device.display());
                None
            }
        };
        Ok(Self {
            device: Mutex::new(device),
            width: config.width,
            height: config.height,
        })
    }

    /// Whether the device is open.
    pub fn is_available(&self) -> bool {
        self.device.lock().is_some()
    }

    /// Read one frame, best effort. Any I/O problem yields `None`.
    pub fn grab(&self) -> Option<Frame> {
        let mut guard = self.device.lock();
        let device = guard.as_mut()?;

        let expected =
            self.width as usize * self.height as usize * YUYV_BYTES_PER_PIXEL as usize;
        let mut data = vec![0u8; expected];
        match device.read(&mut data) {
            Ok(n) if n == expected => Frame::new(self.width, self.height, YUYV_BYTES_PER_PIXEL, data),
            Ok(n) => {
                debug!("short camera read: {n} of {expected} bytes");
                None
            }
            Err(e) => {
                debug!("camera read failed: {e}");
                None
            }
        }
    }

    /// Drop the device handle. Idempotent.
    pub fn release(&self) {
        if self.device.lock().take().is_some() {
            debug!("camera released");
        }
    }
}
