//! Converting per-pixel probabilities into grayscale images.

use image::{GrayImage, Luma};

/// Build a `width x height` grayscale image from row-major probabilities.
///
/// Each value becomes `trunc(v * 255)` clamped to `0..=255`. With
/// `Some(threshold)` the image is binarized: values above `threshold` are
/// white, the rest black.
pub fn prediction_to_gray(
    values: &[f32],
    width: u32,
    height: u32,
    threshold: Option<f32>,
) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let idx = y as usize * width as usize + x as usize;
        let v = values.get(idx).copied().unwrap_or(0.0);
        let gray = match threshold {
            Some(t) => {
                if v > t {
                    255
                } else {
                    0
                }
            }
            None => (v * 255.0).clamp(0.0, 255.0) as u8,
        };
        Luma([gray])
    })
}

/// Summary of a probability map, logged after each prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    /// Fraction of pixels above 0.5.
    pub foreground: f32,
}

impl MaskStats {
    pub fn from_values(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                foreground: 0.0,
            };
        }
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut fg = 0usize;
        for v in values {
            min = min.min(*v);
            max = max.max(*v);
            sum += *v as f64;
            if *v > 0.5 {
                fg += 1;
            }
        }
        Self {
            min,
            max,
            mean: (sum / values.len() as f64) as f32,
            foreground: fg as f32 / values.len() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_and_clamps() {
        let img = prediction_to_gray(&[0.0, 0.5, 1.0, 1.7], 2, 2, None);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 127);
        assert_eq!(img.get_pixel(0, 1)[0], 255);
        assert_eq!(img.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn reads_row_major() {
        // 3 wide, 1 high: x indexes the inner dimension.
        let img = prediction_to_gray(&[0.0, 0.0, 1.0], 3, 1, None);
        assert_eq!(img.get_pixel(2, 0)[0], 255);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn threshold_binarizes() {
        let img = prediction_to_gray(&[0.2, 0.5, 0.51], 3, 1, Some(0.5));
        assert_eq!(img.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn stats_over_values() {
        let s = MaskStats::from_values(&[0.0, 0.25, 0.75, 1.0]);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 1.0);
        assert_eq!(s.mean, 0.5);
        assert_eq!(s.foreground, 0.5);
        assert_eq!(MaskStats::from_values(&[]).mean, 0.0);
    }
}
