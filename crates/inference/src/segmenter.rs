use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::{DynamicImage, GrayImage};
use models::{ShapeError, UNet, UNetConfig};
use seg_dataset::{image_to_chw, ImageScaler, ImageSpec, SegDatasetError};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::mask::{prediction_to_gray, MaskStats};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("checkpoint not found: {0}")]
    CheckpointMissing(PathBuf),
    #[error("failed to load checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },
    #[error("input image not found: {0}")]
    InputMissing(PathBuf),
    #[error(transparent)]
    Dataset(#[from] SegDatasetError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("failed to read prediction tensor: {0}")]
    Tensor(String),
    #[error("failed to write mask {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// A U-Net plus the preprocessing its inputs need.
pub struct Segmenter<B: Backend> {
    model: UNet<B>,
    spec: ImageSpec,
    scaler: ImageScaler,
    device: B::Device,
}

impl<B: Backend> Segmenter<B> {
    pub fn new(
        model: UNet<B>,
        spec: ImageSpec,
        scaler: ImageScaler,
        device: B::Device,
    ) -> Result<Self, InferenceError> {
        model.check_input(spec.channels, spec.height as usize, spec.width as usize)?;
        Ok(Self {
            model,
            spec,
            scaler,
            device,
        })
    }

    pub fn from_checkpoint(
        path: &Path,
        model_cfg: UNetConfig,
        spec: ImageSpec,
        scaler: ImageScaler,
        device: B::Device,
    ) -> Result<Self, InferenceError> {
        // BinFileRecorder appends the extension itself.
        let on_disk = path.with_extension("bin");
        if !path.exists() && !on_disk.exists() {
            return Err(InferenceError::CheckpointMissing(path.to_path_buf()));
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = UNet::<B>::new(model_cfg, &device)
            .load_file(path, &recorder, &device)
            .map_err(|source| InferenceError::Checkpoint {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!("loaded checkpoint {}", path.display());
        Self::new(model, spec, scaler, device)
    }

    pub fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    /// Probabilities for the first output channel, row-major `height x width`.
    pub fn predict(&self, img: &DynamicImage) -> Result<Vec<f32>, InferenceError> {
        let (w, h) = (self.spec.width as usize, self.spec.height as usize);
        let mut chw = image_to_chw(img, &self.spec)?;
        self.scaler.transform(&mut chw);
        let input = Tensor::<B, 4>::from_data(
            TensorData::new(chw, [1, self.spec.channels, h, w]),
            &self.device,
        );
        let output = self.model.forward(input).slice([0..1, 0..1, 0..h, 0..w]);
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::Tensor(format!("{e:?}")))?;
        let stats = MaskStats::from_values(&values);
        tracing::debug!(
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            foreground = stats.foreground,
            "prediction"
        );
        Ok(values)
    }

    pub fn segment_image(
        &self,
        img: &DynamicImage,
        threshold: Option<f32>,
    ) -> Result<GrayImage, InferenceError> {
        let values = self.predict(img)?;
        Ok(prediction_to_gray(
            &values,
            self.spec.width,
            self.spec.height,
            threshold,
        ))
    }

    pub fn segment_path(
        &self,
        path: &Path,
        threshold: Option<f32>,
    ) -> Result<GrayImage, InferenceError> {
        if !path.exists() {
            return Err(InferenceError::InputMissing(path.to_path_buf()));
        }
        let img = image::open(path).map_err(|source| SegDatasetError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        self.segment_image(&img, threshold)
    }

    /// Segment `input` and save the mask as PNG at `output`.
    pub fn write_mask(
        &self,
        input: &Path,
        output: &Path,
        threshold: Option<f32>,
    ) -> Result<GrayImage, InferenceError> {
        let mask = self.segment_path(input, threshold)?;
        mask.save_with_format(output, image::ImageFormat::Png)
            .map_err(|source| InferenceError::Write {
                path: output.to_path_buf(),
                source,
            })?;
        tracing::info!("wrote mask {}", output.display());
        Ok(mask)
    }
}
