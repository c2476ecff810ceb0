// src/roi.rs - Rectangular regions of interest: providers and quantification

use std::path::{Path, PathBuf};

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::errors::{FluoroQuantError, Result};
use crate::image_io::RawImage;

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The whole of a `width` x `height` image
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Intersection with a `width` x `height` image, `None` when empty
    pub fn clipped(&self, width: u32, height: u32) -> Option<Rectangle> {
        let x_end = self.x.saturating_add(self.width).min(width);
        let y_end = self.y.saturating_add(self.height).min(height);
        if self.x >= x_end || self.y >= y_end {
            return None;
        }
        Some(Rectangle::new(self.x, self.y, x_end - self.x, y_end - self.y))
    }
}

/// Positive-pixel count for one rectangle on one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoiMeasurement {
    /// 1-based position in the report
    pub index: usize,
    /// 1-based position of the rectangle in the provider's list
    pub roi: usize,
    /// 0-based source channel
    pub channel: usize,
    /// Number of pixels with value > 0 inside the rectangle
    pub area: u64,
}

/// Count pixels > 0 inside a rectangle, clipped to the image.
///
/// Out-of-bounds or zero-area rectangles count 0.
pub fn count_positive(image: &GrayImage, rect: &Rectangle) -> u64 {
    let (width, height) = image.dimensions();
    let Some(clip) = rect.clipped(width, height) else {
        return 0;
    };

    let stride = width as usize;
    let raw = image.as_raw();
    (clip.y..clip.y + clip.height)
        .map(|y| {
            let start = y as usize * stride + clip.x as usize;
            raw[start..start + clip.width as usize]
                .iter()
                .filter(|&&v| v > 0)
                .count() as u64
        })
        .sum()
}

/// Measure every rectangle, preserving input order.
///
/// Indices are 1-based within this call; the orchestrator renumbers them
/// across channels.
pub fn measure_rois(image: &GrayImage, rois: &[Rectangle], channel: usize) -> Vec<RoiMeasurement> {
    rois.iter()
        .enumerate()
        .map(|(i, rect)| RoiMeasurement {
            index: i + 1,
            roi: i + 1,
            channel,
            area: count_positive(image, rect),
        })
        .collect()
}

/// Source of rectangles for an image
pub trait RoiProvider {
    /// Ordered rectangles to measure; may be empty.
    fn select(&self, image: &RawImage) -> Result<Vec<Rectangle>>;
}

/// A fixed list of rectangles
#[derive(Debug, Clone, Default)]
pub struct StaticRois(pub Vec<Rectangle>);

impl RoiProvider for StaticRois {
    fn select(&self, _image: &RawImage) -> Result<Vec<Rectangle>> {
        Ok(self.0.clone())
    }
}

/// One rectangle covering the whole image
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeImage;

impl RoiProvider for WholeImage {
    fn select(&self, image: &RawImage) -> Result<Vec<Rectangle>> {
        Ok(vec![Rectangle::full(image.width, image.height)])
    }
}

/// Rectangles read from a CSV file with an `x,y,width,height` header
#[derive(Debug, Clone)]
pub struct CsvRois {
    pub path: PathBuf,
}

impl CsvRois {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl RoiProvider for CsvRois {
    fn select(&self, _image: &RawImage) -> Result<Vec<Rectangle>> {
        if !self.path.is_file() {
            return Err(FluoroQuantError::InvalidPath(self.path.clone()));
        }
        let reader = csv::Reader::from_path(&self.path).map_err(|e| {
            FluoroQuantError::Input(format!("cannot read ROI file {}: {}", self.path.display(), e))
        })?;
        read_rois(reader)
    }
}

/// Parse `x,y,width,height` records from any CSV reader
pub fn read_rois<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<Rectangle>> {
    reader
        .deserialize()
        .map(|record| {
            record.map_err(|e| FluoroQuantError::Input(format!("invalid ROI record: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn block_image() -> GrayImage {
        let mut image = GrayImage::new(10, 10);
        for y in 3..6 {
            for x in 3..6 {
                image.put_pixel(x, y, Luma([200]));
            }
        }
        image
    }

    #[test]
    fn whole_image_counts_all_positive_pixels() {
        let image = block_image();
        assert_eq!(count_positive(&image, &Rectangle::full(10, 10)), 9);
    }

    #[test]
    fn partial_overlap_is_clipped() {
        let image = block_image();
        assert_eq!(count_positive(&image, &Rectangle::new(4, 4, 100, 100)), 4);
        assert_eq!(count_positive(&image, &Rectangle::new(0, 0, 4, 4)), 1);
    }

    #[test]
    fn degenerate_rectangles_count_zero() {
        let image = block_image();
        assert_eq!(count_positive(&image, &Rectangle::new(20, 20, 5, 5)), 0);
        assert_eq!(count_positive(&image, &Rectangle::new(3, 3, 0, 5)), 0);
        assert_eq!(count_positive(&image, &Rectangle::new(u32::MAX, 0, u32::MAX, 1)), 0);
    }

    #[test]
    fn containment_is_monotonic() {
        let image = GrayImage::from_fn(12, 12, |x, y| Luma([((x * 7 + y * 3) % 4) as u8]));
        let inner = Rectangle::new(2, 3, 4, 5);
        let outer = Rectangle::new(1, 1, 8, 9);
        assert!(count_positive(&image, &outer) >= count_positive(&image, &inner));
    }

    #[test]
    fn measurements_keep_input_order() {
        let image = block_image();
        let rois = [Rectangle::new(0, 0, 1, 1), Rectangle::full(10, 10)];
        let measured = measure_rois(&image, &rois, 2);
        assert_eq!(measured[0], RoiMeasurement { index: 1, roi: 1, channel: 2, area: 0 });
        assert_eq!(measured[1], RoiMeasurement { index: 2, roi: 2, channel: 2, area: 9 });
    }

    #[test]
    fn providers_select_rectangles() {
        let image = RawImage::from_gray8(4, 3, &[0; 12]);
        assert_eq!(WholeImage.select(&image).unwrap(), vec![Rectangle::new(0, 0, 4, 3)]);
        assert!(StaticRois::default().select(&image).unwrap().is_empty());
    }

    #[test]
    fn rois_parse_from_csv() {
        let data = "x,y,width,height\n1,2,3,4\n0,0,10,10\n";
        let rois = read_rois(csv::Reader::from_reader(data.as_bytes())).unwrap();
        assert_eq!(rois, vec![Rectangle::new(1, 2, 3, 4), Rectangle::new(0, 0, 10, 10)]);

        let bad = "x,y,width,height\n1,2,-3,4\n";
        assert!(read_rois(csv::Reader::from_reader(bad.as_bytes())).is_err());
    }
}
