use heatmap_common::config::SaturationPolicy;
use heatmap_common::frame::FrameError;
use image::GrayImage;
use tracing::debug;

/// Running per-pixel sum of motion masks since the last reset.
#[derive(Debug, Clone)]
pub struct Accumulator {
    width: u32,
    height: u32,
    counts: Vec<u32>,
}

impl Accumulator {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            counts: vec![0; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[cfg(test)]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    #[cfg(test)]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.counts[(y * self.width + x) as usize]
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Add a mask cell-wise. The mask must have the buffer's dimensions.
    pub fn add_mask(&mut self, mask: &GrayImage, policy: SaturationPolicy) -> Result<(), FrameError> {
        if mask.dimensions() != self.dimensions() {
            return Err(FrameError::DimensionMismatch {
                expected: self.dimensions(),
                got: mask.dimensions(),
            });
        }

        let add: fn(u32, u32) -> u32 = match policy {
            SaturationPolicy::Clamp => u32::saturating_add,
            SaturationPolicy::Wrap => u32::wrapping_add,
        };
        for (count, value) in self.counts.iter_mut().zip(mask.as_raw()) {
            *count = add(*count, *value as u32);
        }
        Ok(())
    }

    /// Normalize to [0, 1] by dividing every cell by the maximum.
    pub fn scale(&self) -> NormalizedBuffer {
        let max = self.max();
        if max == 0 {
            debug!("no motion accumulated yet");
            return NormalizedBuffer::zeros(self.width, self.height);
        }

        let max = max as f32;
        NormalizedBuffer {
            width: self.width,
            height: self.height,
            values: self.counts.iter().map(|&c| c as f32 / max).collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_counts(width: u32, height: u32, counts: Vec<u32>) -> Self {
        assert_eq!(counts.len(), width as usize * height as usize);
        Self {
            width,
            height,
            counts,
        }
    }
}

/// Fold a mask into the buffer, creating the buffer from the mask's shape
/// when there is none yet.
pub fn accumulate(
    buffer: Option<Accumulator>,
    mask: &GrayImage,
    policy: SaturationPolicy,
) -> Result<Accumulator, FrameError> {
    let mut buffer = match buffer {
        Some(buffer) => buffer,
        None => {
            let (width, height) = mask.dimensions();
            debug!(width, height, "creating motion accumulator");
            Accumulator::zeros(width, height)
        }
    };
    buffer.add_mask(mask, policy)?;
    Ok(buffer)
}

/// Accumulator contents scaled into [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBuffer {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl NormalizedBuffer {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    #[cfg(test)]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[cfg(test)]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    #[cfg(test)]
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Map every value onto the full 8-bit range.
    pub fn to_gray(&self) -> GrayImage {
        let data = self.values.iter().map(|&v| unit_to_u8(v)).collect();
        GrayImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

pub fn unit_to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}
