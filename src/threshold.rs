// src/threshold.rs - Binary masks from an Otsu or fixed level

use image::GrayImage;
use imageproc::contrast::{otsu_level as imageproc_otsu, threshold as binarize_above};
use imageproc::stats::histogram;
use serde::Serialize;

/// Foreground value written into masks
pub const FOREGROUND: u8 = 255;

/// How the threshold level is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThresholdMode {
    Otsu,
    Manual(u8),
}

/// Otsu's level for the split `{v <= t}` / `{v > t}`.
///
/// A single-valued image returns that value, giving an all-zero mask; an
/// empty image returns 0. Ties keep the lowest maximizing level.
pub fn otsu_level(image: &GrayImage) -> u8 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }

    let hist = histogram(image);
    let mut occupied = hist.channels[0].iter().enumerate().filter(|(_, count)| **count > 0);
    match (occupied.next(), occupied.next()) {
        (Some((only, _)), None) => only as u8,
        _ => imageproc_otsu(image),
    }
}

/// Resolve the level a mode stands for on a given image
pub fn resolve_level(image: &GrayImage, mode: ThresholdMode) -> u8 {
    match mode {
        ThresholdMode::Otsu => otsu_level(image),
        ThresholdMode::Manual(level) => level,
    }
}

/// Binary mask: 255 where `value > level`, else 0
pub fn apply_threshold(image: &GrayImage, level: u8) -> GrayImage {
    binarize_above(image, level)
}

/// Threshold an image, returning the level used alongside the mask
pub fn threshold(image: &GrayImage, mode: ThresholdMode) -> (u8, GrayImage) {
    let level = resolve_level(image, mode);
    (level, apply_threshold(image, level))
}
