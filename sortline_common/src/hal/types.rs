//! HAL data types shared between backends and the control loops.

/// A raw camera frame: pixel buffer plus dimensions.
///
/// The buffer layout is `channels` interleaved bytes per pixel,
/// row-major. Backends own the capture format; consumers treat the
/// buffer as opaque and forward it to the classifier or the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per pixel (1 = grayscale, 3 = BGR).
    pub channels: u8,
    /// Interleaved pixel data, `width * height * channels` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame, asserting the buffer matches the dimensions.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Expected buffer length for the frame's dimensions.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// Conveyor drive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConveyorDirection {
    /// Run the belt toward the sorting station.
    #[default]
    Forward,
    /// Run the belt away from the sorting station.
    Backward,
    /// Release all motor lines.
    Stop,
}
