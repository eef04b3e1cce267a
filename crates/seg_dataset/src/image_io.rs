//! Decoding images and masks into fixed-size CHW buffers.

use crate::types::{ChannelOrder, DatasetResult, SegDatasetError};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

/// Target geometry for decoded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    /// 1 (grayscale) or 3 (color).
    pub channels: usize,
    pub channel_order: ChannelOrder,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            channels: 3,
            channel_order: ChannelOrder::Bgr,
        }
    }
}

impl ImageSpec {
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn image_len(&self) -> usize {
        self.pixels() * self.channels
    }
}

fn open(path: &Path) -> DatasetResult<DynamicImage> {
    image::open(path).map_err(|e| SegDatasetError::Image {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Decode `path`, resize to `spec`, and emit CHW values in `0..=255`.
pub fn load_image_chw(path: &Path, spec: &ImageSpec) -> DatasetResult<Vec<f32>> {
    let img = open(path)?;
    image_to_chw(&img, spec)
}

pub fn image_to_chw(img: &DynamicImage, spec: &ImageSpec) -> DatasetResult<Vec<f32>> {
    let resized = if img.width() == spec.width && img.height() == spec.height {
        img.clone()
    } else {
        img.resize_exact(spec.width, spec.height, FilterType::Triangle)
    };
    let (width, height) = (spec.width, spec.height);
    let mut buf = Vec::with_capacity(spec.image_len());
    match spec.channels {
        1 => {
            let gray = resized.to_luma8();
            buf.extend(gray.as_raw().iter().map(|v| *v as f32));
        }
        3 => {
            let rgb = resized.to_rgb8();
            let planes: [usize; 3] = match spec.channel_order {
                ChannelOrder::Rgb => [0, 1, 2],
                ChannelOrder::Bgr => [2, 1, 0],
            };
            for c in planes {
                for y in 0..height {
                    for x in 0..width {
                        buf.push(rgb.get_pixel(x, y)[c] as f32);
                    }
                }
            }
        }
        other => return Err(SegDatasetError::Channels(other)),
    }
    Ok(buf)
}

/// Decode a mask to HW values of exactly 0.0 or 1.0 (threshold at half intensity).
pub fn load_mask(path: &Path, width: u32, height: u32) -> DatasetResult<Vec<f32>> {
    let img = open(path)?;
    let gray = img.to_luma8();
    let gray = if gray.width() == width && gray.height() == height {
        gray
    } else {
        image::imageops::resize(&gray, width, height, FilterType::Nearest)
    };
    Ok(gray
        .as_raw()
        .iter()
        .map(|v| if *v > 127 { 1.0 } else { 0.0 })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn bgr_puts_blue_plane_first() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("px.png");
        RgbImage::from_fn(2, 2, |_, _| Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        let spec = ImageSpec {
            width: 2,
            height: 2,
            channels: 3,
            channel_order: ChannelOrder::Bgr,
        };
        let buf = load_image_chw(&path, &spec).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[0..4], &[30.0; 4]);
        assert_eq!(&buf[4..8], &[20.0; 4]);
        assert_eq!(&buf[8..12], &[10.0; 4]);

        let rgb = ImageSpec {
            channel_order: ChannelOrder::Rgb,
            ..spec
        };
        let buf = load_image_chw(&path, &rgb).unwrap();
        assert_eq!(buf[0], 10.0);
    }

    #[test]
    fn resizes_to_target() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.png");
        GrayImage::from_pixel(16, 12, Luma([200])).save(&path).unwrap();
        let spec = ImageSpec {
            width: 4,
            height: 4,
            channels: 1,
            channel_order: ChannelOrder::Rgb,
        };
        let buf = load_image_chw(&path, &spec).unwrap();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|v| (*v - 200.0).abs() < 1.0));
    }

    #[test]
    fn mask_is_binarized() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mask.png");
        let mask = GrayImage::from_fn(2, 1, |x, _| if x == 0 { Luma([255]) } else { Luma([3]) });
        mask.save(&path).unwrap();
        assert_eq!(load_mask(&path, 2, 1).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn unsupported_channel_count() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let spec = ImageSpec {
            width: 2,
            height: 2,
            channels: 4,
            channel_order: ChannelOrder::Rgb,
        };
        assert!(matches!(
            image_to_chw(&img, &spec),
            Err(SegDatasetError::Channels(4))
        ));
    }
}
