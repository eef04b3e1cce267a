//! Pixel intensity scaling for fixed-bit-depth images.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Maps raw pixel values from `0..=max_pixel` into `min_range..=max_range`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageScaler {
    pub min_range: f32,
    pub max_range: f32,
    /// Largest representable pixel value (255 for 8-bit images).
    pub max_pixel: f32,
}

impl Default for ImageScaler {
    fn default() -> Self {
        Self::new(0.0, 1.0, 8)
    }
}

impl ImageScaler {
    pub fn new(min_range: f32, max_range: f32, max_bits: u32) -> Self {
        Self {
            min_range,
            max_range,
            max_pixel: ((1u64 << max_bits.min(32)) - 1) as f32,
        }
    }

    /// Called once with the training files before iteration starts. The
    /// input range is fixed by the bit depth, so nothing is read.
    pub fn fit<P: AsRef<Path>>(&mut self, files: &[P]) {
        tracing::debug!(
            "scaler fitted over {} files: [0, {}] -> [{}, {}]",
            files.len(),
            self.max_pixel,
            self.min_range,
            self.max_range
        );
    }

    pub fn transform(&self, values: &mut [f32]) {
        let span = self.max_range - self.min_range;
        for v in values.iter_mut() {
            *v = *v / self.max_pixel * span + self.min_range;
        }
    }

    pub fn revert(&self, values: &mut [f32]) {
        let span = self.max_range - self.min_range;
        if span == 0.0 {
            values.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        for v in values.iter_mut() {
            *v = (*v - self.min_range) / span * self.max_pixel;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_maps_bytes_to_unit_range() {
        let scaler = ImageScaler::default();
        let mut px = vec![0.0, 127.5, 255.0];
        scaler.transform(&mut px);
        assert_eq!(px, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn revert_undoes_transform_for_custom_range() {
        let scaler = ImageScaler::new(-1.0, 1.0, 8);
        let mut px = vec![0.0, 51.0, 255.0];
        scaler.transform(&mut px);
        assert_eq!(px[0], -1.0);
        assert_eq!(px[2], 1.0);
        scaler.revert(&mut px);
        assert!((px[1] - 51.0).abs() < 1e-3);
    }

    #[test]
    fn fit_leaves_ranges_untouched() {
        let mut scaler = ImageScaler::default();
        scaler.fit(&["a.png", "b.png"]);
        assert_eq!(scaler, ImageScaler::default());
    }
}
