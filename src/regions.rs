// src/regions.rs - Connected-component labeling and per-region statistics

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::Serialize;

use crate::threshold::FOREGROUND;

/// One 8-connected foreground region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionProperties {
    /// 1-based, unique within one mask
    pub label: u32,
    /// Pixel count
    pub area: u64,
    /// Mean row of member pixels
    pub centroid_row: f64,
    /// Mean column of member pixels
    pub centroid_col: f64,
}

#[derive(Default, Clone, Copy)]
struct Accumulator {
    area: u64,
    row_sum: u64,
    col_sum: u64,
}

/// Treat every non-zero pixel as foreground
fn binarize(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if image.get_pixel(x, y)[0] > 0 {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Label 8-connected foreground regions and measure each one.
///
/// Labels follow raster-scan discovery order (the first pixel met while
/// scanning rows top to bottom decides a region's rank) and the result is
/// sorted by label.
pub fn label_regions(mask: &GrayImage) -> Vec<RegionProperties> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let labelled = connected_components(&binarize(mask), Connectivity::Eight, Luma([0u8]));

    // Map raw component ids to discovery order
    let mut renumbered: Vec<u32> = Vec::new();
    let mut stats: Vec<Accumulator> = Vec::new();

    for (x, y, pixel) in labelled.enumerate_pixels() {
        let raw = pixel[0] as usize;
        if raw == 0 {
            continue;
        }
        if renumbered.len() <= raw {
            renumbered.resize(raw + 1, 0);
        }
        if renumbered[raw] == 0 {
            stats.push(Accumulator::default());
            renumbered[raw] = stats.len() as u32;
        }

        let slot = &mut stats[renumbered[raw] as usize - 1];
        slot.area += 1;
        slot.row_sum += u64::from(y);
        slot.col_sum += u64::from(x);
    }

    stats
        .into_iter()
        .enumerate()
        .map(|(index, acc)| RegionProperties {
            label: index as u32 + 1,
            area: acc.area,
            centroid_row: acc.row_sum as f64 / acc.area as f64,
            centroid_col: acc.col_sum as f64 / acc.area as f64,
        })
        .collect()
}

/// Number of 8-connected foreground regions
pub fn count_regions(mask: &GrayImage) -> usize {
    label_regions(mask).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn two_disjoint_blocks() {
        let mut mask = GrayImage::new(8, 8);
        fill(&mut mask, 1, 1, 2, 2);
        fill(&mut mask, 5, 4, 2, 2);

        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 2);

        assert_eq!(regions[0].label, 1);
        assert_eq!(regions[0].area, 4);
        assert_approx_eq!(regions[0].centroid_row, 1.5);
        assert_approx_eq!(regions[0].centroid_col, 1.5);

        assert_eq!(regions[1].label, 2);
        assert_eq!(regions[1].area, 4);
        assert_approx_eq!(regions[1].centroid_row, 4.5);
        assert_approx_eq!(regions[1].centroid_col, 5.5);
    }

    #[test]
    fn diagonal_neighbours_are_connected() {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(0, 0, Luma([255]));
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(2, 2, Luma([255]));
        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 3);
        assert_approx_eq!(regions[0].centroid_row, 1.0);
    }

    #[test]
    fn non_binary_values_count_as_foreground() {
        let mut mask = GrayImage::new(3, 1);
        mask.put_pixel(0, 0, Luma([12]));
        mask.put_pixel(1, 0, Luma([250]));
        assert_eq!(count_regions(&mask), 1);
    }

    #[test]
    fn labels_follow_raster_discovery() {
        // A U shape: its right arm is reached by the scan before the arms join
        let mut mask = GrayImage::new(7, 4);
        fill(&mut mask, 0, 0, 1, 3);
        fill(&mut mask, 2, 0, 1, 3);
        fill(&mut mask, 0, 2, 3, 1);
        fill(&mut mask, 5, 1, 1, 1);

        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].area, 7);
        assert_eq!(regions[1].area, 1);
        assert_approx_eq!(regions[1].centroid_col, 5.0);
    }

    #[test]
    fn area_and_centroid_ignore_numbering() {
        let mut mask = GrayImage::new(6, 6);
        fill(&mut mask, 0, 4, 2, 2);
        fill(&mut mask, 4, 0, 2, 1);
        // Flipping reverses discovery order, so labels swap
        let flipped = image::imageops::flip_vertical(&mask);

        let key = |r: &RegionProperties, row: f64| {
            (r.area, (row * 10.0).round() as i64, (r.centroid_col * 10.0).round() as i64)
        };
        let mut a: Vec<_> = label_regions(&mask).iter().map(|r| key(r, r.centroid_row)).collect();
        let mut b: Vec<_> = label_regions(&flipped)
            .iter()
            .map(|r| key(r, 5.0 - r.centroid_row))
            .collect();
        assert_ne!(a, b);
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_mask_has_no_regions() {
        assert!(label_regions(&GrayImage::new(5, 5)).is_empty());
        assert!(label_regions(&GrayImage::new(0, 0)).is_empty());
    }
}
