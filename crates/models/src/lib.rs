//! Burn U-Net for binary segmentation of microscopy images.
//!
//! The network follows the classic contracting/expanding layout:
//! - an encoder of `depth` double-convolution stages with 2x2 max pooling,
//! - a bottleneck double convolution,
//! - a decoder that upsamples with stride-2 transposed convolutions and
//!   concatenates the matching encoder activations,
//! - a 1x1 convolution head with a sigmoid, so outputs are per-pixel
//!   probabilities in `[0, 1]`.
//!
//! These are pure Burn modules; dataset handling lives in `seg_dataset` and
//! checkpoint-driven inference in the `inference` crate.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct UNetConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    /// Filters of the first encoder stage; doubled at every level.
    pub base_filters: usize,
    /// Number of pooling levels.
    pub depth: usize,
    /// Dropout applied after the two deepest encoder stages.
    pub dropout: f64,
}

impl Default for UNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 1,
            base_filters: 64,
            depth: 4,
            dropout: 0.5,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("input {height}x{width} is not divisible by {divisor} (depth {depth})")]
    NotDivisible {
        height: usize,
        width: usize,
        divisor: usize,
        depth: usize,
    },
    #[error("input has {actual} channels, model expects {expected}")]
    Channels { actual: usize, expected: usize },
    #[error("depth {depth} with {base_filters} base filters is out of range")]
    Depth { depth: usize, base_filters: usize },
}

impl UNetConfig {
    /// Filters at encoder level `level` (0 = first stage, `depth` = bottleneck).
    pub fn filters_at(&self, level: usize) -> usize {
        scaled_filters(self.base_filters, level).unwrap_or(usize::MAX)
    }

    /// At least one pooling level, and the bottleneck filter count must fit in `usize`.
    pub fn validate_depth(&self) -> Result<usize, ShapeError> {
        let err = ShapeError::Depth {
            depth: self.depth,
            base_filters: self.base_filters,
        };
        if self.depth == 0 {
            return Err(err);
        }
        scaled_filters(self.base_filters, self.depth).ok_or(err.clone())?;
        pow2(self.depth).ok_or(err)
    }

    /// Spatial sizes must survive `depth` halvings without remainder.
    pub fn validate_input(&self, height: usize, width: usize) -> Result<(), ShapeError> {
        let divisor = self.validate_depth()?;
        if height == 0 || width == 0 || height % divisor != 0 || width % divisor != 0 {
            return Err(ShapeError::NotDivisible {
                height,
                width,
                divisor,
                depth: self.depth,
            });
        }
        Ok(())
    }

    pub fn validate_channels(&self, channels: usize) -> Result<(), ShapeError> {
        if channels != self.in_channels {
            return Err(ShapeError::Channels {
                actual: channels,
                expected: self.in_channels,
            });
        }
        Ok(())
    }
}

fn pow2(level: usize) -> Option<usize> {
    u32::try_from(level).ok().and_then(|l| 2usize.checked_pow(l))
}

fn scaled_filters(base_filters: usize, level: usize) -> Option<usize> {
    pow2(level).and_then(|f| base_filters.max(1).checked_mul(f))
}

/// Two 3x3 same-padded convolutions, each followed by ReLU.
#[derive(Debug, Module)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
}

impl<B: Backend> DoubleConv<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        Self { conv1, conv2 }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(input));
        relu(self.conv2.forward(x))
    }
}

#[derive(Debug, Module)]
pub struct UpBlock<B: Backend> {
    up: ConvTranspose2d<B>,
    conv: DoubleConv<B>,
}

impl<B: Backend> UpBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let up = ConvTranspose2dConfig::new([in_channels, out_channels], [2, 2])
            .with_stride([2, 2])
            .init(device);
        // After concatenation with the skip: out_channels (up) + out_channels (skip).
        let conv = DoubleConv::new(out_channels * 2, out_channels, device);
        Self { up, conv }
    }

    pub fn forward(&self, input: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.up.forward(input));
        let x = Tensor::cat(vec![skip, x], 1);
        self.conv.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct UNet<B: Backend> {
    encoders: Vec<DoubleConv<B>>,
    pool: MaxPool2d,
    bottleneck: DoubleConv<B>,
    decoders: Vec<UpBlock<B>>,
    head: Conv2d<B>,
    dropout: nn::Dropout,
    depth: usize,
    base_filters: usize,
    in_channels: usize,
    out_channels: usize,
}

impl<B: Backend> UNet<B> {
    pub fn new(cfg: UNetConfig, device: &B::Device) -> Self {
        let depth = cfg.depth;

        let mut encoders = Vec::with_capacity(depth);
        let mut in_ch = cfg.in_channels;
        for level in 0..depth {
            let out_ch = cfg.filters_at(level);
            encoders.push(DoubleConv::new(in_ch, out_ch, device));
            in_ch = out_ch;
        }
        let bottleneck = DoubleConv::new(in_ch, cfg.filters_at(depth), device);

        let mut decoders = Vec::with_capacity(depth);
        for level in (0..depth).rev() {
            decoders.push(UpBlock::new(
                cfg.filters_at(level + 1),
                cfg.filters_at(level),
                device,
            ));
        }
        let head = Conv2dConfig::new([cfg.filters_at(0), cfg.out_channels], [1, 1]).init(device);

        Self {
            encoders,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            bottleneck,
            decoders,
            head,
            dropout: nn::DropoutConfig::new(cfg.dropout).init(),
            depth,
            base_filters: cfg.base_filters.max(1),
            in_channels: cfg.in_channels,
            out_channels: cfg.out_channels,
        }
    }

    /// Per-pixel logits with shape `[batch, out_channels, H, W]`.
    pub fn forward_logits(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.depth);
        let mut x = input;
        for (level, encoder) in self.encoders.iter().enumerate() {
            x = encoder.forward(x);
            // Deepest stage is regularised before pooling.
            if level + 1 == self.depth {
                x = self.dropout.forward(x);
            }
            skips.push(x.clone());
            x = self.pool.forward(x);
        }
        x = self.dropout.forward(self.bottleneck.forward(x));
        for (decoder, skip) in self.decoders.iter().zip(skips.into_iter().rev()) {
            x = decoder.forward(x, skip);
        }
        self.head.forward(x)
    }

    /// Per-pixel probabilities in `[0, 1]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        sigmoid(self.forward_logits(input))
    }

    fn geometry(&self) -> UNetConfig {
        UNetConfig {
            in_channels: self.in_channels,
            out_channels: self.out_channels,
            base_filters: self.base_filters,
            depth: self.depth,
            dropout: 0.0,
        }
    }

    /// Check an input geometry against this network.
    pub fn check_input(
        &self,
        channels: usize,
        height: usize,
        width: usize,
    ) -> Result<(), ShapeError> {
        let cfg = self.geometry();
        cfg.validate_channels(channels)?;
        cfg.validate_input(height, width)
    }

    /// Multi-line description of the layer stack and parameter count.
    pub fn summary(&self) -> String {
        let cfg = self.geometry();
        let mut lines = Vec::new();
        lines.push(format!(
            "UNet: in_channels={} out_channels={} depth={}",
            self.in_channels, self.out_channels, self.depth
        ));
        for level in 0..self.depth {
            lines.push(format!(
                "  encoder[{level}]: double conv 3x3 -> {} filters, maxpool 2x2",
                cfg.filters_at(level)
            ));
        }
        lines.push(format!(
            "  bottleneck: double conv 3x3 -> {} filters",
            cfg.filters_at(self.depth)
        ));
        for level in (0..self.depth).rev() {
            lines.push(format!(
                "  decoder[{level}]: transposed conv 2x2 -> {} filters, concat skip, double conv",
                cfg.filters_at(level)
            ));
        }
        lines.push(format!(
            "  head: conv 1x1 -> {} channels, sigmoid",
            self.out_channels
        ));
        lines.push(format!("  parameters: {}", self.num_params()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn tiny() -> UNetConfig {
        UNetConfig {
            in_channels: 3,
            out_channels: 1,
            base_filters: 2,
            depth: 2,
            dropout: 0.5,
        }
    }

    #[test]
    fn forward_preserves_spatial_shape() {
        let device = Default::default();
        let model = UNet::<B>::new(tiny(), &device);
        let input = Tensor::<B, 4>::zeros([2, 3, 8, 8], &device);
        let out = model.forward(input);
        assert_eq!(out.dims(), [2, 1, 8, 8]);
    }

    #[test]
    fn outputs_are_probabilities() {
        let device = Default::default();
        let model = UNet::<B>::new(tiny(), &device);
        let input = Tensor::<B, 4>::ones([1, 3, 4, 4], &device);
        let values = model
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        assert_eq!(values.len(), 16);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn validate_input_requires_power_of_two_multiple() {
        let cfg = tiny();
        assert!(cfg.validate_input(8, 8).is_ok());
        assert_eq!(
            cfg.validate_input(6, 8),
            Err(ShapeError::NotDivisible {
                height: 6,
                width: 8,
                divisor: 4,
                depth: 2
            })
        );
        assert!(UNetConfig::default().validate_input(256, 256).is_ok());
        assert!(cfg.validate_channels(1).is_err());
    }

    #[test]
    fn summary_lists_every_level() {
        let device = Default::default();
        let model = UNet::<B>::new(tiny(), &device);
        let summary = model.summary();
        assert!(summary.contains("encoder[1]"));
        assert!(summary.contains("decoder[0]"));
        assert!(summary.contains("bottleneck: double conv 3x3 -> 8 filters"));
        assert!(summary.contains("parameters:"));
    }

    #[test]
    fn check_input_uses_model_geometry() {
        let device = Default::default();
        let model = UNet::<B>::new(tiny(), &device);
        assert!(model.check_input(3, 8, 12).is_ok());
        assert_eq!(
            model.check_input(1, 8, 8),
            Err(ShapeError::Channels {
                actual: 1,
                expected: 3
            })
        );
        assert!(model.check_input(3, 10, 8).is_err());
    }

    #[test]
    fn depth_out_of_range_is_rejected() {
        let zero = UNetConfig { depth: 0, ..tiny() };
        assert_eq!(
            zero.validate_input(7, 7),
            Err(ShapeError::Depth {
                depth: 0,
                base_filters: 2
            })
        );
        for depth in [63, 64, 200] {
            let deep = UNetConfig { depth, ..tiny() };
            assert!(deep.validate_input(256, 256).is_err());
            assert_eq!(deep.filters_at(depth), usize::MAX);
        }
        assert_eq!(tiny().validate_depth(), Ok(4));
    }
}
