use image::RgbImage;

/// A decoded color frame with capture metadata.
///
/// Raw wire format (as read from a decoder's `rgb24` pipe):
///   [0..width*height*3]  packed R, G, B bytes, row-major, no row padding
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: RgbImage,
    pub captured_at_ms: i64,
    /// Sequence number within the source it was read from.
    pub seq: u64,
}

/// Capture metadata carried alongside a rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStamp {
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl CapturedFrame {
    pub fn new(image: RgbImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            image,
            captured_at_ms,
            seq,
        }
    }

    /// Build a frame from packed `rgb24` bytes. Extra trailing bytes are ignored.
    pub fn from_rgb24(
        mut data: Vec<u8>,
        width: u32,
        height: u32,
        captured_at_ms: i64,
        seq: u64,
    ) -> Result<Self, FrameError> {
        let expected = rgb24_len(width, height);
        if data.len() < expected {
            return Err(FrameError::TooShort {
                got: data.len(),
                expected,
            });
        }
        data.truncate(expected);
        let image = RgbImage::from_raw(width, height, data).ok_or(FrameError::TooShort {
            got: 0,
            expected,
        })?;
        Ok(Self::new(image, captured_at_ms, seq))
    }

    pub fn stamp(&self) -> FrameStamp {
        FrameStamp {
            captured_at_ms: self.captured_at_ms,
            seq: self.seq,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Flip the frame horizontally, as a mirror would show it.
    pub fn mirrored(mut self) -> Self {
        image::imageops::flip_horizontal_in_place(&mut self.image);
        self
    }
}

/// Byte length of one packed `rgb24` frame.
pub fn rgb24_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload too short: got {got} bytes, expected at least {expected}")]
    TooShort { got: usize, expected: usize },
    #[error("dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        got: (u32, u32),
    },
}
