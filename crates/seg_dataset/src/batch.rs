//! Minibatch iteration for training and evaluation.

use crate::image_io::{load_image_chw, load_mask, ImageSpec};
use crate::labels::PathLabelGenerator;
use crate::scaler::ImageScaler;
use crate::split::FileSplit;
use crate::types::{DatasetResult, SegDatasetError, SegSample};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub spec: ImageSpec,
    /// Reshuffle the split on every `reset`.
    pub shuffle: bool,
    pub seed: Option<u64>,
    /// Drop the final partial batch of an epoch.
    pub drop_last: bool,
    /// Skip samples that fail to load instead of aborting the epoch.
    pub skip_errors: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            spec: ImageSpec::default(),
            shuffle: true,
            seed: None,
            drop_last: false,
            skip_errors: false,
        }
    }
}

pub struct SegBatch<B: Backend> {
    /// `[batch, channels, height, width]`, scaled.
    pub images: Tensor<B, 4>,
    /// `[batch, 1, height, width]`, values 0.0 or 1.0.
    pub masks: Tensor<B, 4>,
    pub paths: Vec<PathBuf>,
}

impl<B: Backend> SegBatch<B> {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

pub struct BatchIter {
    files: Vec<PathBuf>,
    cursor: usize,
    cfg: BatchConfig,
    scaler: Option<ImageScaler>,
    labeler: Arc<dyn PathLabelGenerator>,
    rng: rand::rngs::StdRng,
    epoch_samples: usize,
    skipped: usize,
    load_time: Duration,
}

/// Load one image/mask pair with the scaler applied to the image.
pub fn load_sample(
    image: &Path,
    spec: &ImageSpec,
    labeler: &dyn PathLabelGenerator,
    scaler: Option<&ImageScaler>,
) -> DatasetResult<SegSample> {
    let label = labeler.label_path(image)?;
    if !label.exists() {
        return Err(SegDatasetError::MissingLabel {
            image: image.to_path_buf(),
            expected: label,
        });
    }
    let mut image_chw = load_image_chw(image, spec)?;
    if let Some(scaler) = scaler {
        scaler.transform(&mut image_chw);
    }
    let mask_hw = load_mask(&label, spec.width, spec.height)?;
    Ok(SegSample {
        image_path: image.to_path_buf(),
        image_chw,
        mask_hw,
    })
}

impl BatchIter {
    pub fn new(split: FileSplit, cfg: BatchConfig, labeler: Arc<dyn PathLabelGenerator>) -> Self {
        let rng = match cfg.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            files: split.files().to_vec(),
            cursor: 0,
            cfg,
            scaler: None,
            labeler,
            rng,
            epoch_samples: 0,
            skipped: 0,
            load_time: Duration::ZERO,
        }
    }

    /// Attach a preprocessor applied to every loaded image.
    pub fn with_preprocessor(mut self, scaler: ImageScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn preprocessor(&self) -> Option<&ImageScaler> {
        self.scaler.as_ref()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of batches one epoch yields.
    pub fn batches_per_epoch(&self) -> usize {
        let bs = self.cfg.batch_size.max(1);
        if self.cfg.drop_last {
            self.files.len() / bs
        } else {
            self.files.len().div_ceil(bs)
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Rewind to the start of the split, reshuffling when configured.
    pub fn reset(&mut self) {
        if self.cfg.shuffle {
            self.files.shuffle(&mut self.rng);
        }
        tracing::debug!(
            samples = self.epoch_samples,
            skipped = self.skipped,
            load_ms = self.load_time.as_millis() as u64,
            "dataset epoch complete"
        );
        self.cursor = 0;
        self.epoch_samples = 0;
        self.skipped = 0;
        self.load_time = Duration::ZERO;
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<SegBatch<B>>> {
        let batch_size = self.cfg.batch_size.max(1);
        loop {
            if self.cursor >= self.files.len() {
                return Ok(None);
            }
            let end = (self.cursor + batch_size).min(self.files.len());
            if self.cfg.drop_last && end - self.cursor < batch_size {
                self.cursor = self.files.len();
                return Ok(None);
            }
            let slice = &self.files[self.cursor..end];
            self.cursor = end;

            let spec = self.cfg.spec;
            let labeler = self.labeler.as_ref();
            let scaler = self.scaler.as_ref();
            let t_load = Instant::now();
            let loaded: Vec<(PathBuf, DatasetResult<SegSample>)> = slice
                .par_iter()
                .map(|path| (path.clone(), load_sample(path, &spec, labeler, scaler)))
                .collect();
            self.load_time += t_load.elapsed();

            let mut samples = Vec::with_capacity(loaded.len());
            for (path, res) in loaded {
                match res {
                    Ok(sample) => samples.push(sample),
                    Err(e) if self.cfg.skip_errors => {
                        tracing::warn!("skipping sample {}: {e}", path.display());
                        self.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            if samples.is_empty() {
                continue;
            }
            self.epoch_samples += samples.len();
            return Ok(Some(assemble(samples, &spec, device)));
        }
    }
}

fn assemble<B: Backend>(samples: Vec<SegSample>, spec: &ImageSpec, device: &B::Device) -> SegBatch<B> {
    let batch = samples.len();
    let (h, w) = (spec.height as usize, spec.width as usize);
    let mut images = Vec::with_capacity(batch * spec.image_len());
    let mut masks = Vec::with_capacity(batch * spec.pixels());
    let mut paths = Vec::with_capacity(batch);
    for sample in samples {
        images.extend_from_slice(&sample.image_chw);
        masks.extend_from_slice(&sample.mask_hw);
        paths.push(sample.image_path);
    }
    let images =
        Tensor::<B, 4>::from_data(TensorData::new(images, [batch, spec.channels, h, w]), device);
    let masks = Tensor::<B, 4>::from_data(TensorData::new(masks, [batch, 1, h, w]), device);
    SegBatch {
        images,
        masks,
        paths,
    }
}
