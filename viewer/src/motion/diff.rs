use heatmap_common::frame::FrameError;
use image::{GrayImage, Rgb, RgbImage};

/// Grayscale differences strictly above this value count as motion.
pub const MOTION_THRESHOLD: u8 = 60;

/// Value written into the mask for moving pixels.
pub const MOTION_MARKER: u8 = 1;

// BT.601 luma weights in 14-bit fixed point; they sum to 1 << 14.
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Grayscale magnitude of the per-channel absolute difference of two pixels.
pub fn diff_luma(a: &Rgb<u8>, b: &Rgb<u8>) -> u8 {
    let dr = a.0[0].abs_diff(b.0[0]) as u32;
    let dg = a.0[1].abs_diff(b.0[1]) as u32;
    let db = a.0[2].abs_diff(b.0[2]) as u32;
    let weighted = dr * R_WEIGHT + dg * G_WEIGHT + db * B_WEIGHT + (1 << (LUMA_SHIFT - 1));
    (weighted >> LUMA_SHIFT) as u8
}

/// Binary motion mask between two consecutive frames.
///
/// Each cell is `marker` where the grayscale difference exceeds
/// [`MOTION_THRESHOLD`], and 0 elsewhere.
pub fn diff(prev: &RgbImage, curr: &RgbImage, marker: u8) -> Result<GrayImage, FrameError> {
    if prev.dimensions() != curr.dimensions() {
        return Err(FrameError::DimensionMismatch {
            expected: prev.dimensions(),
            got: curr.dimensions(),
        });
    }

    let (width, height) = curr.dimensions();
    let mut mask = GrayImage::new(width, height);
    for ((out, p), c) in mask.pixels_mut().zip(prev.pixels()).zip(curr.pixels()) {
        out.0[0] = if diff_luma(p, c) > MOTION_THRESHOLD {
            marker
        } else {
            0
        };
    }
    Ok(mask)
}

/// Largest value in a mask; zero means no pixel moved.
pub fn mask_max(mask: &GrayImage) -> u8 {
    mask.pixels().map(|p| p.0[0]).max().unwrap_or(0)
}
