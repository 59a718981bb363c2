pub mod palette;

use image::{GrayImage, Luma, RgbImage};

use crate::motion::accumulator::{unit_to_u8, Accumulator, NormalizedBuffer};
use crate::motion::diff::mask_max;
use palette::HeatPalette;

/// Visualization applied to the pipeline state before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// The raw frame, untouched.
    Normal,
    /// The latest motion mask.
    FrameDiff,
    /// The accumulated motion as a grayscale intensity image.
    Motion,
    /// The accumulated motion as a heat palette blended over the raw frame.
    Colorized,
}

static WITH_NORMAL: [RenderMode; 4] = [
    RenderMode::Normal,
    RenderMode::FrameDiff,
    RenderMode::Motion,
    RenderMode::Colorized,
];

impl RenderMode {
    /// Modes in the order the "advance mode" key walks through them.
    pub fn cycle(has_normal_mode: bool) -> &'static [RenderMode] {
        if has_normal_mode {
            &WITH_NORMAL
        } else {
            &WITH_NORMAL[1..]
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RenderMode::Normal => "normal",
            RenderMode::FrameDiff => "frame-diff",
            RenderMode::Motion => "motion",
            RenderMode::Colorized => "colorized",
        }
    }
}

/// An image ready for a display sink.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedImage {
    Gray(GrayImage),
    Color(RgbImage),
}

impl RenderedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            RenderedImage::Gray(image) => image.dimensions(),
            RenderedImage::Color(image) => image.dimensions(),
        }
    }

    /// Packed RGB copy, expanding gray to three equal channels.
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            RenderedImage::Gray(image) => image::DynamicImage::ImageLuma8(image.clone()).to_rgb8(),
            RenderedImage::Color(image) => image.clone(),
        }
    }
}

pub struct Renderer {
    palette: HeatPalette,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            palette: HeatPalette::jet(),
        }
    }

    /// Map pipeline state to a displayable image for `mode`.
    ///
    /// Returns `None` when the display should not be updated this cycle.
    pub fn render(
        &self,
        mode: RenderMode,
        frame: &RgbImage,
        last_diff: &GrayImage,
        accumulator: Option<&Accumulator>,
    ) -> Option<RenderedImage> {
        match mode {
            RenderMode::Normal => Some(RenderedImage::Color(frame.clone())),
            RenderMode::FrameDiff => Self::frame_diff(last_diff).map(RenderedImage::Gray),
            RenderMode::Motion => Some(RenderedImage::Gray(
                Self::normalized(frame, accumulator).to_gray(),
            )),
            RenderMode::Colorized => Some(RenderedImage::Color(
                self.colorize(&Self::normalized(frame, accumulator), frame),
            )),
        }
    }

    fn frame_diff(mask: &GrayImage) -> Option<GrayImage> {
        if mask_max(mask) == 0 {
            return None;
        }
        let (width, height) = mask.dimensions();
        Some(GrayImage::from_fn(width, height, |x, y| {
            Luma([if mask.get_pixel(x, y).0[0] == 0 { 0 } else { 255 }])
        }))
    }

    fn normalized(frame: &RgbImage, accumulator: Option<&Accumulator>) -> NormalizedBuffer {
        match accumulator {
            Some(acc) => acc.scale(),
            None => {
                let (width, height) = frame.dimensions();
                NormalizedBuffer::zeros(width, height)
            }
        }
    }

    /// Heat-palette the normalized buffer and blend it 50/50 over `raw`.
    pub fn colorize(&self, normalized: &NormalizedBuffer, raw: &RgbImage) -> RgbImage {
        let mut out = raw.clone();
        for (pixel, &value) in out.pixels_mut().zip(normalized.values()) {
            let heat = self.palette.color(unit_to_u8(value));
            for (channel, color) in pixel.0.iter_mut().zip(heat.0) {
                *channel = blend_half(*channel, color);
            }
        }
        out
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// `round(0.5 * raw + 0.5 * color)`, clamped to 0..=255.
pub fn blend_half(raw: u8, color: u8) -> u8 {
    (0.5 * raw as f32 + 0.5 * color as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}
