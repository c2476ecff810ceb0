// src/despeckle.rs - Median-filter removal of isolated noise pixels

use image::GrayImage;
use imageproc::filter::median_filter;
use rayon::prelude::*;

use crate::config::DespeckleShape;
use crate::image_utils::{clamp_index, disk_spans, KernelSpan};

/// Smallest window the filter will use
pub const MIN_DESPECKLE_SIZE: u32 = 3;

/// Normalize a requested window size: even sizes grow by one, anything
/// below 3 becomes 3.
pub fn effective_despeckle_size(requested: u32) -> u32 {
    let odd = if requested % 2 == 0 { requested + 1 } else { requested };
    odd.max(MIN_DESPECKLE_SIZE)
}

/// Median filter with the normalized window size.
///
/// Borders replicate the nearest edge pixel; output dimensions always
/// equal the input's.
pub fn despeckle(image: &GrayImage, requested: u32, shape: DespeckleShape) -> GrayImage {
    let size = effective_despeckle_size(requested);
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    match shape {
        DespeckleShape::Square => median_filter(image, size / 2, size / 2),
        DespeckleShape::Disk => disk_median(image, &disk_spans(size / 2)),
    }
}

/// Sliding-histogram median over a span-described window.
///
/// Window pixels past the border count as the nearest edge pixel, so the
/// first window of each row is filled per span in O(width) rather than
/// O(span length).
fn disk_median(image: &GrayImage, spans: &[KernelSpan]) -> GrayImage {
    let (width, height) = image.dimensions();
    let w = width as usize;
    let last = width as i32 - 1;
    let window_len: u64 = spans.iter().map(|span| span.len() as u64).sum();
    let rank = window_len / 2;

    let pixel = |x: i32, y: i32| -> u8 { image.get_pixel(clamp_index(x, width), clamp_index(y, height))[0] };

    let mut out = vec![0u8; w * height as usize];
    out.par_chunks_mut(w).enumerate().for_each(|(y, out_row)| {
        let y = y as i32;
        let mut bins = [0u64; 256];

        for span in spans {
            let sy = y + span.dy;
            let left = (span.dx_max.min(-1) - span.dx_min + 1).max(0);
            let right = (span.dx_max - span.dx_min.max(last + 1) + 1).max(0);
            bins[pixel(0, sy) as usize] += left as u64;
            bins[pixel(last, sy) as usize] += right as u64;
            for dx in span.dx_min.max(0)..=span.dx_max.min(last) {
                bins[pixel(dx, sy) as usize] += 1;
            }
        }
        out_row[0] = median_from_bins(&bins, rank);

        for x in 1..width as i32 {
            for span in spans {
                let sy = y + span.dy;
                bins[pixel(x - 1 + span.dx_min, sy) as usize] -= 1;
                bins[pixel(x + span.dx_max, sy) as usize] += 1;
            }
            out_row[x as usize] = median_from_bins(&bins, rank);
        }
    });

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

#[inline]
fn median_from_bins(bins: &[u64; 256], rank: u64) -> u8 {
    let mut seen = 0u64;
    for (value, &count) in bins.iter().enumerate() {
        seen += count;
        if seen > rank {
            return value as u8;
        }
    }
    u8::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn window_size_normalization() {
        assert_eq!(effective_despeckle_size(2), 3);
        assert_eq!(effective_despeckle_size(4), 5);
        assert_eq!(effective_despeckle_size(1), 3);
        assert_eq!(effective_despeckle_size(7), 7);
        assert_eq!(effective_despeckle_size(20), 21);
        assert_eq!(effective_despeckle_size(0), 3);
    }

    #[test]
    fn isolated_pixel_is_removed() {
        for shape in [DespeckleShape::Disk, DespeckleShape::Square] {
            let mut image = GrayImage::new(9, 9);
            image.put_pixel(4, 4, Luma([255]));
            let out = despeckle(&image, 3, shape);
            assert!(out.as_raw().iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn three_by_three_block_survives_disk_window() {
        let mut image = GrayImage::new(10, 10);
        for y in 3..6 {
            for x in 3..6 {
                image.put_pixel(x, y, Luma([200]));
            }
        }
        let out = despeckle(&image, 3, DespeckleShape::Disk);
        assert_eq!(out, image);
    }

    #[test]
    fn square_window_rounds_block_corners() {
        let mut image = GrayImage::new(10, 10);
        for y in 3..6 {
            for x in 3..6 {
                image.put_pixel(x, y, Luma([200]));
            }
        }
        let out = despeckle(&image, 3, DespeckleShape::Square);
        assert_eq!(out.get_pixel(3, 3)[0], 0);
        assert_eq!(out.get_pixel(4, 3)[0], 200);
        assert_eq!(out.get_pixel(4, 4)[0], 200);
    }

    fn sorted_reference(image: &GrayImage, size: u32) -> GrayImage {
        let spans = disk_spans(size / 2);
        let (width, height) = image.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let mut values = Vec::new();
            for span in &spans {
                for dx in span.dx_min..=span.dx_max {
                    let px = clamp_index(x as i32 + dx, width);
                    let py = clamp_index(y as i32 + span.dy, height);
                    values.push(image.get_pixel(px, py)[0]);
                }
            }
            values.sort_unstable();
            Luma([values[values.len() / 2]])
        })
    }

    #[test]
    fn disk_median_matches_sorted_reference() {
        let image = GrayImage::from_fn(13, 7, |x, y| Luma([((x * 53 + y * 29 + x * y) % 251) as u8]));
        assert_eq!(despeckle(&image, 5, DespeckleShape::Disk), sorted_reference(&image, 5));
    }

    #[test]
    fn window_wider_than_image_replicates_edges() {
        let image = GrayImage::from_fn(5, 4, |x, y| Luma([((x * 71 + y * 17) % 256) as u8]));
        assert_eq!(despeckle(&image, 41, DespeckleShape::Disk), sorted_reference(&image, 41));
    }

    #[test]
    fn very_large_window_on_small_image() {
        let mut image = GrayImage::from_pixel(10, 10, Luma([90]));
        image.put_pixel(4, 4, Luma([255]));
        let out = despeckle(&image, 20_000, DespeckleShape::Disk);
        assert_eq!(out, GrayImage::from_pixel(10, 10, Luma([90])));
    }

    #[test]
    fn dimensions_are_preserved() {
        let image = GrayImage::new(4, 2);
        assert_eq!(despeckle(&image, 20, DespeckleShape::Disk).dimensions(), (4, 2));
        assert_eq!(despeckle(&image, 20, DespeckleShape::Square).dimensions(), (4, 2));
    }
}
