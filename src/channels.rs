// src/channels.rs - Splitting a RawImage into single-intensity planes

use image::{ImageBuffer, Luma};

use crate::errors::{FluoroQuantError, Result};
use crate::image_io::{RawImage, SampleLayout};

/// One intensity plane at native precision
pub type Channel = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Split an image into its channels, in native channel order.
///
/// A single-channel image yields a sequence of length 1.
pub fn decompose(image: &RawImage) -> Result<Vec<Channel>> {
    if image.channel_count == 0 {
        return Err(FluoroQuantError::Processing(
            "image has an empty channel sequence".to_string(),
        ));
    }

    let plane_len = image.width as usize * image.height as usize;
    let expected = plane_len * image.channel_count;
    if image.samples.len() != expected {
        return Err(FluoroQuantError::Format(format!(
            "{}x{} image with {} channel(s) needs {} samples, found {}",
            image.width, image.height, image.channel_count, expected, image.samples.len()
        )));
    }

    let planes: Vec<Vec<f32>> = match image.layout {
        _ if plane_len == 0 => vec![Vec::new(); image.channel_count],
        SampleLayout::Planar => image
            .samples
            .chunks(plane_len)
            .map(|plane| plane.to_vec())
            .collect(),
        SampleLayout::Interleaved => (0..image.channel_count)
            .map(|c| {
                image
                    .samples
                    .iter()
                    .skip(c)
                    .step_by(image.channel_count)
                    .copied()
                    .collect()
            })
            .collect(),
    };

    planes
        .into_iter()
        .enumerate()
        .map(|(index, plane)| {
            Channel::from_raw(image.width, image.height, plane).ok_or_else(|| {
                FluoroQuantError::Format(format!("channel {} does not fit {}x{}", index, image.width, image.height))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_samples_are_split_per_channel() {
        let image = RawImage {
            width: 2,
            height: 1,
            channel_count: 3,
            bit_depth: 8,
            layout: SampleLayout::Interleaved,
            samples: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        };
        let channels = decompose(&image).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].as_raw(), &vec![1.0, 4.0]);
        assert_eq!(channels[1].as_raw(), &vec![2.0, 5.0]);
        assert_eq!(channels[2].as_raw(), &vec![3.0, 6.0]);
    }

    #[test]
    fn planar_samples_keep_plane_order() {
        let image = RawImage::from_planes(vec![vec![1.0, 2.0], vec![7.0, 8.0]], 1, 2, 16).unwrap();
        let channels = decompose(&image).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1].get_pixel(0, 1)[0], 8.0);
    }

    #[test]
    fn single_channel_yields_one_plane() {
        let image = RawImage::from_gray8(3, 3, &[0; 9]);
        assert_eq!(decompose(&image).unwrap().len(), 1);
    }

    #[test]
    fn sample_mismatch_is_format_and_no_channels_is_processing() {
        let mut image = RawImage::from_gray8(3, 3, &[0; 9]);
        image.channel_count = 2;
        assert!(matches!(decompose(&image), Err(FluoroQuantError::Format(_))));

        image.channel_count = 0;
        image.samples.clear();
        assert!(matches!(decompose(&image), Err(FluoroQuantError::Processing(_))));
    }
}
