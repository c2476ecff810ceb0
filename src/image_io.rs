use std::path::{Path, PathBuf};
use std::fs;
use image::{DynamicImage, GenericImageView};

use crate::errors::{FluoroQuantError, Result};

/// File extensions accepted when scanning a directory
const IMAGE_EXTENSIONS: [&str; 3] = ["tif", "tiff", "png"];

/// How channel samples are arranged in `RawImage::samples`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// Pixel-major: `c0 c1 c2 c0 c1 c2 ...`
    Interleaved,
    /// Channel-major: every sample of channel 0, then channel 1, ...
    Planar,
}

/// A decoded multi-channel image at its native bit depth
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub channel_count: usize,
    pub bit_depth: u8,
    pub layout: SampleLayout,
    pub samples: Vec<f32>,
}

impl RawImage {
    /// Build a planar image from one sample vector per channel.
    pub fn from_planes(planes: Vec<Vec<f32>>, width: u32, height: u32, bit_depth: u8) -> Result<Self> {
        if planes.is_empty() {
            return Err(FluoroQuantError::Format(
                "an image needs at least one channel".to_string(),
            ));
        }

        let plane_len = width as usize * height as usize;
        for (index, plane) in planes.iter().enumerate() {
            if plane.len() != plane_len {
                return Err(FluoroQuantError::Format(format!(
                    "channel {} has {} samples, expected {} ({}x{})",
                    index, plane.len(), plane_len, width, height
                )));
            }
        }

        let channel_count = planes.len();
        Ok(Self {
            width,
            height,
            channel_count,
            bit_depth,
            layout: SampleLayout::Planar,
            samples: planes.concat(),
        })
    }

    /// Single-channel 8-bit image from row-major bytes.
    pub fn from_gray8(width: u32, height: u32, pixels: &[u8]) -> Self {
        Self {
            width,
            height,
            channel_count: 1,
            bit_depth: 8,
            layout: SampleLayout::Interleaved,
            samples: pixels.iter().map(|&v| v as f32).collect(),
        }
    }
}

/// Largest integer value for a bit depth; float data (32 bits) is treated as already scaled.
pub fn native_max(bit_depth: u8) -> f32 {
    match bit_depth {
        0..=8 => 255.0,
        9..=16 => ((1u32 << bit_depth) - 1) as f32,
        _ => 255.0,
    }
}

/// Get all TIFF/PNG files from a directory (recursively), sorted by path
pub fn get_image_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(FluoroQuantError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(FluoroQuantError::Input(format!(
            "{} is not a directory", dir_path.display()
        )));
    }

    let mut files = Vec::new();
    find_image_files_recursive(dir_path, &mut files)?;
    files.sort();

    Ok(files)
}

fn find_image_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_image_files_recursive(&path, result)?;
        } else if path.is_file() && has_image_extension(&path) {
            result.push(path);
        }
    }

    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Load an image file into a `RawImage`, keeping its native bit depth.
///
/// Alpha channels are dropped; gray images become one channel and colour
/// images three.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RawImage> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(FluoroQuantError::InvalidPath(path.to_path_buf()));
    }

    let decoded = image::open(path).map_err(|e| {
        FluoroQuantError::Input(format!("cannot decode {}: {}", path.display(), e))
    })?;

    let raw = from_dynamic(decoded)?;
    log::debug!(
        "Loaded {} ({}x{}, {} channel(s), {}-bit)",
        path.display(), raw.width, raw.height, raw.channel_count, raw.bit_depth
    );

    Ok(raw)
}

/// Convert a decoded `DynamicImage` into an interleaved `RawImage`.
pub fn from_dynamic(decoded: DynamicImage) -> Result<RawImage> {
    let (width, height) = decoded.dimensions();

    let (channel_count, bit_depth) = match &decoded {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => (1, 8),
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => (1, 16),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => (3, 16),
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => (3, 32),
        _ => (3, 8),
    };

    let samples: Vec<f32> = match (channel_count, bit_depth) {
        (1, 8) => to_f32(decoded.to_luma8().as_raw()),
        (1, _) => to_f32(decoded.to_luma16().as_raw()),
        (_, 16) => to_f32(decoded.to_rgb16().as_raw()),
        (_, 32) => decoded.to_rgb32f().into_raw(),
        _ => to_f32(decoded.to_rgb8().as_raw()),
    };

    Ok(RawImage {
        width,
        height,
        channel_count,
        bit_depth,
        layout: SampleLayout::Interleaved,
        samples,
    })
}

fn to_f32<T: Copy + Into<f32>>(values: &[T]) -> Vec<f32> {
    values.iter().map(|&v| v.into()).collect()
}
