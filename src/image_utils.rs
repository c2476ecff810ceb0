/// Horizontal run of a structuring element: offsets `dx_min..=dx_max` on row `dy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSpan {
    pub dy: i32,
    pub dx_min: i32,
    pub dx_max: i32,
}

impl KernelSpan {
    #[inline]
    pub fn len(&self) -> usize {
        (self.dx_max - self.dx_min + 1) as usize
    }
}

/// Row spans of the disk of the given radius (pixels with dx^2 + dy^2 <= r^2).
///
/// One span per row, so the element costs O(r) to build and store. Radius 1
/// is the 3x3 cross.
pub fn disk_spans(radius: u32) -> Vec<KernelSpan> {
    let r = i64::from(radius);
    (-r..=r)
        .map(|dy| {
            let half = integer_sqrt(r * r - dy * dy) as i32;
            KernelSpan { dy: dy as i32, dx_min: -half, dx_max: half }
        })
        .collect()
}

/// Largest `h` with `h * h <= value`
fn integer_sqrt(value: i64) -> i64 {
    let mut h = (value as f64).sqrt() as i64;
    while h * h > value {
        h -= 1;
    }
    while (h + 1) * (h + 1) <= value {
        h += 1;
    }
    h
}

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

/// Clamp a coordinate onto `0..len` (edge replication)
#[inline]
pub fn clamp_index(value: i32, len: u32) -> u32 {
    value.clamp(0, len as i32 - 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_one_is_a_cross() {
        assert_eq!(
            disk_spans(1),
            vec![
                KernelSpan { dy: -1, dx_min: 0, dx_max: 0 },
                KernelSpan { dy: 0, dx_min: -1, dx_max: 1 },
                KernelSpan { dy: 1, dx_min: 0, dx_max: 0 },
            ]
        );
    }

    #[test]
    fn disk_spans_are_symmetric() {
        let spans = disk_spans(2);
        assert_eq!(spans.len(), 5);
        assert_eq!(spans[0], KernelSpan { dy: -2, dx_min: 0, dx_max: 0 });
        assert_eq!(spans[2], KernelSpan { dy: 0, dx_min: -2, dx_max: 2 });
        assert_eq!(spans[4], KernelSpan { dy: 2, dx_min: 0, dx_max: 0 });
        let total: usize = spans.iter().map(KernelSpan::len).sum();
        assert_eq!(total, 13);
    }

    #[test]
    fn spans_cover_exactly_the_disk() {
        for radius in [3u32, 7, 10] {
            let r = radius as i32;
            let brute = (-r..=r)
                .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
                .filter(|(dx, dy)| dx * dx + dy * dy <= r * r)
                .count();
            let total: usize = disk_spans(radius).iter().map(KernelSpan::len).sum();
            assert_eq!(total, brute);
        }
    }

    #[test]
    fn large_radius_is_linear_in_size() {
        let spans = disk_spans(50_000);
        assert_eq!(spans.len(), 100_001);
        assert_eq!(spans[50_000], KernelSpan { dy: 0, dx_min: -50_000, dx_max: 50_000 });
    }

    #[test]
    fn radius_zero_is_a_single_pixel() {
        assert_eq!(disk_spans(0), vec![KernelSpan { dy: 0, dx_min: 0, dx_max: 0 }]);
    }

    #[test]
    fn bounds_and_clamping() {
        assert!(in_bounds(0, 0, 1, 1));
        assert!(!in_bounds(-1, 0, 1, 1));
        assert!(!in_bounds(0, 1, 1, 1));
        assert_eq!(clamp_index(-4, 10), 0);
        assert_eq!(clamp_index(12, 10), 9);
    }
}
