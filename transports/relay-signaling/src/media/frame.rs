//! Raw video frames and frame sinks
//!
//! Frames are 32-bit ARGB, one `u32` per pixel, rows stored top to bottom
//! without padding.

use crate::{Error, Result};

/// Opaque black in ARGB32
pub const ARGB_BLACK: u32 = 0xFF00_0000;

/// Clockwise rotation to apply before display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoRotation {
    /// No rotation
    #[default]
    Deg0,
    /// 90 degrees clockwise
    Deg90,
    /// 180 degrees
    Deg180,
    /// 270 degrees clockwise
    Deg270,
}

impl VideoRotation {
    /// Rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            VideoRotation::Deg0 => 0,
            VideoRotation::Deg90 => 90,
            VideoRotation::Deg180 => 180,
            VideoRotation::Deg270 => 270,
        }
    }
}

/// Uncompressed video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pending rotation
    pub rotation: VideoRotation,
    /// Timestamp in microseconds
    pub timestamp_us: u64,
    /// ARGB pixels, `width * height` entries
    pub data: Vec<u32>,
}

impl VideoFrame {
    /// Create a frame, checking the buffer matches the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u32>, timestamp_us: u64) -> Result<Self> {
        let expected = width as usize * height as usize;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(Error::MediaTrackError(format!(
                "frame buffer of {} pixels does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            rotation: VideoRotation::Deg0,
            timestamp_us,
            data,
        })
    }

    /// Frame filled with a single ARGB value
    pub fn filled(width: u32, height: u32, argb: u32, timestamp_us: u64) -> Self {
        Self {
            width,
            height,
            rotation: VideoRotation::Deg0,
            timestamp_us,
            data: vec![argb; width as usize * height as usize],
        }
    }

    /// Opaque black frame
    pub fn black(width: u32, height: u32, timestamp_us: u64) -> Self {
        Self::filled(width, height, ARGB_BLACK, timestamp_us)
    }

    /// Set the pending rotation
    pub fn with_rotation(mut self, rotation: VideoRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Whether every pixel is opaque black
    pub fn is_black(&self) -> bool {
        self.data.iter().all(|&p| p == ARGB_BLACK)
    }

    /// Copy of this frame with black pixels and the same geometry and timestamp
    pub fn blacked_out(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            timestamp_us: self.timestamp_us,
            data: vec![ARGB_BLACK; self.data.len()],
        }
    }

    /// Copy of this frame with the pending rotation baked into the pixels
    pub fn with_rotation_applied(&self) -> Self {
        let (w, h) = (self.width as usize, self.height as usize);
        let (new_w, new_h) = match self.rotation {
            VideoRotation::Deg0 => return self.clone(),
            VideoRotation::Deg180 => (w, h),
            VideoRotation::Deg90 | VideoRotation::Deg270 => (h, w),
        };

        let mut data = vec![0u32; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let (nx, ny) = match self.rotation {
                    VideoRotation::Deg90 => (h - 1 - y, x),
                    VideoRotation::Deg180 => (w - 1 - x, h - 1 - y),
                    VideoRotation::Deg270 => (y, w - 1 - x),
                    VideoRotation::Deg0 => (x, y),
                };
                data[ny * new_w + nx] = self.data[y * w + x];
            }
        }

        Self {
            width: new_w as u32,
            height: new_h as u32,
            rotation: VideoRotation::Deg0,
            timestamp_us: self.timestamp_us,
            data,
        }
    }
}

/// Receives frames from a video source
///
/// Called from media threads; implementations must not block.
pub trait VideoSink: Send + Sync {
    /// Handle one frame
    fn on_frame(&self, frame: &VideoFrame);
}
