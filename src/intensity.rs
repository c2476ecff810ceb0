// src/intensity.rs - 8-bit normalization and oversaturation bookkeeping

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use image::GrayImage;
use serde::Serialize;

use crate::channels::Channel;
use crate::config::IntensityScaling;
use crate::image_io::native_max;

/// Maximum representable intensity after normalization
pub const SATURATED: u8 = u8::MAX;

/// Map a channel of arbitrary range onto 0..=255.
///
/// Lossy and saturating: anything above 255 after scaling clips to 255.
pub fn normalize(channel: &Channel, bit_depth: u8, scaling: IntensityScaling) -> GrayImage {
    let scale = match scaling {
        IntensityScaling::Absolute => 1.0,
        IntensityScaling::BitDepth if bit_depth > 8 && bit_depth <= 16 => {
            f32::from(SATURATED) / native_max(bit_depth)
        }
        IntensityScaling::BitDepth => 1.0,
    };

    let (width, height) = channel.dimensions();
    let data = channel
        .as_raw()
        .iter()
        .map(|&v| saturate(v.abs() * scale))
        .collect();

    // Dimensions come straight from the source buffer
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

#[inline]
fn saturate(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, f32::from(SATURATED)) as u8
    }
}

/// Widen an 8-bit channel back to `Channel` precision.
pub fn to_channel(image: &GrayImage) -> Channel {
    let (width, height) = image.dimensions();
    let data = image.as_raw().iter().map(|&v| f32::from(v)).collect();
    Channel::from_raw(width, height, data).unwrap_or_else(|| Channel::new(width, height))
}

/// Count pixels sitting at the maximum intensity.
pub fn count_oversaturated(image: &GrayImage) -> u64 {
    image.as_raw().iter().filter(|&&v| v == SATURATED).count() as u64
}

/// Saturated-pixel totals per pipeline stage.
///
/// Stages that did not run contribute zero. Values are only ever summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OversaturationCounts {
    /// After 8-bit normalization
    pub raw: u64,
    /// After thresholding
    pub threshold: u64,
    /// After background subtraction
    pub background: u64,
    /// After despeckling
    pub despeckle: u64,
}

impl Add for OversaturationCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            raw: self.raw + other.raw,
            threshold: self.threshold + other.threshold,
            background: self.background + other.background,
            despeckle: self.despeckle + other.despeckle,
        }
    }
}

impl AddAssign for OversaturationCounts {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for OversaturationCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
