use std::collections::VecDeque;

use image::GrayImage;
use imageproc::filter::median_filter;
use rayon::prelude::*;

use crate::config::BackgroundModel;
use crate::errors::{FluoroQuantError, Result};
use crate::image_utils::{disk_spans, KernelSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extremum {
    Max,
    Min,
}

impl Extremum {
    #[inline]
    fn identity(self) -> u8 {
        match self {
            Extremum::Max => u8::MIN,
            Extremum::Min => u8::MAX,
        }
    }

    #[inline]
    fn pick(self, a: u8, b: u8) -> u8 {
        match self {
            Extremum::Max => a.max(b),
            Extremum::Min => a.min(b),
        }
    }

    /// Whether `candidate` makes `incumbent` useless for every later window
    #[inline]
    fn dominates(self, candidate: u8, incumbent: u8) -> bool {
        match self {
            Extremum::Max => candidate >= incumbent,
            Extremum::Min => candidate <= incumbent,
        }
    }
}

/// Fold the running extremum of `row[x+dx_min ..= x+dx_max]` into `out[x]`.
///
/// Window positions outside the row are ignored. Uses a monotonic deque so
/// each row costs O(width) regardless of span length.
fn fold_sliding_extremum(
    row: &[u8],
    dx_min: i32,
    dx_max: i32,
    extremum: Extremum,
    out: &mut [u8],
    window: &mut VecDeque<usize>,
) {
    window.clear();
    let len = row.len() as i32;
    let mut next = 0i32;

    for x in 0..len {
        let lo = (x + dx_min).max(0);
        let hi = (x + dx_max).min(len - 1);

        while next <= hi {
            let value = row[next as usize];
            while let Some(&back) = window.back() {
                if extremum.dominates(value, row[back]) {
                    window.pop_back();
                } else {
                    break;
                }
            }
            window.push_back(next as usize);
            next += 1;
        }

        while let Some(&front) = window.front() {
            if (front as i32) < lo {
                window.pop_front();
            } else {
                break;
            }
        }

        if lo > hi {
            continue;
        }

        if let Some(&front) = window.front() {
            out[x as usize] = extremum.pick(out[x as usize], row[front]);
        }
    }
}

/// Grayscale max/min filter over a structuring element given as row spans
fn extremum_filter(image: &GrayImage, spans: &[KernelSpan], extremum: Extremum) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    // Rows further away than the image height never land inside it
    let spans: Vec<KernelSpan> = spans
        .iter()
        .filter(|span| span.dy.unsigned_abs() < height)
        .copied()
        .collect();

    let w = width as usize;
    let src = image.as_raw();
    let mut out = vec![extremum.identity(); src.len()];

    out.par_chunks_mut(w).enumerate().for_each(|(y, out_row)| {
        let mut window = VecDeque::with_capacity(w);
        for span in &spans {
            let sy = y as i32 + span.dy;
            if sy < 0 || sy >= height as i32 {
                continue;
            }
            let start = sy as usize * w;
            fold_sliding_extremum(&src[start..start + w], span.dx_min, span.dx_max, extremum, out_row, &mut window);
        }
    });

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

/// Grayscale dilation with a disk of the given radius
pub fn dilate(image: &GrayImage, radius: u32) -> GrayImage {
    extremum_filter(image, &disk_spans(radius), Extremum::Max)
}

/// Grayscale erosion with a disk of the given radius
pub fn erode(image: &GrayImage, radius: u32) -> GrayImage {
    extremum_filter(image, &disk_spans(radius), Extremum::Min)
}

/// Morphological closing (dilation followed by erosion)
pub fn close(image: &GrayImage, radius: u32) -> GrayImage {
    let spans = disk_spans(radius);
    let dilated = extremum_filter(image, &spans, Extremum::Max);
    extremum_filter(&dilated, &spans, Extremum::Min)
}

/// Morphological opening (erosion followed by dilation)
pub fn open(image: &GrayImage, radius: u32) -> GrayImage {
    let spans = disk_spans(radius);
    let eroded = extremum_filter(image, &spans, Extremum::Min);
    extremum_filter(&eroded, &spans, Extremum::Max)
}

/// Background estimate for the chosen model
pub fn estimate_background(image: &GrayImage, radius: u32, model: BackgroundModel) -> GrayImage {
    match model {
        BackgroundModel::Closing => close(image, radius),
        BackgroundModel::Opening => open(image, radius),
        BackgroundModel::Median => median_filter(image, radius, radius),
    }
}

/// Subtract a morphological background estimate, clamping at zero.
///
/// The result never exceeds the input at any pixel. Note that closing is
/// extensive (estimate >= input), so `BackgroundModel::Closing` always
/// yields an all-zero image; `Opening` and `Median` keep bright features
/// much smaller than the window.
pub fn subtract_background(image: &GrayImage, radius: i32, model: BackgroundModel) -> Result<GrayImage> {
    if radius <= 0 {
        return Err(FluoroQuantError::Config(format!(
            "background radius must be > 0, got {}",
            radius
        )));
    }

    let background = estimate_background(image, radius as u32, model);
    let (width, height) = image.dimensions();
    let data = image
        .as_raw()
        .iter()
        .zip(background.as_raw())
        .map(|(&value, &bg)| value.saturating_sub(bg))
        .collect();

    GrayImage::from_raw(width, height, data).ok_or_else(|| {
        FluoroQuantError::Processing(format!("background estimate does not match {}x{}", width, height))
    })
}
