use seg_dataset::{
    summarize_split, BatchConfig, BatchIter, FileSplit, ImageScaler, PathLabelGenerator,
    UnetPathLabelGenerator,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RunConfig;

/// Where the training images live and how masks are found next to them.
#[derive(Debug, Clone)]
pub struct DatasetPathConfig {
    pub root: PathBuf,
    pub image_dir: String,
    pub label_dir: String,
    pub recursive: bool,
    pub skip_errors: bool,
}

impl DatasetPathConfig {
    pub fn from_run_config(cfg: &RunConfig) -> Self {
        Self {
            root: cfg.train_images.clone(),
            image_dir: cfg.image_dir_name.clone(),
            label_dir: cfg.label_dir_name.clone(),
            recursive: cfg.recursive,
            skip_errors: cfg.skip_errors,
        }
    }

    pub fn labeler(&self) -> UnetPathLabelGenerator {
        UnetPathLabelGenerator::new(self.image_dir.clone(), self.label_dir.clone())
    }

    /// Index the image directory and check every image has a mask.
    pub fn load(&self, shuffle: bool, seed: Option<u64>) -> anyhow::Result<FileSplit> {
        if !self.root.is_dir() {
            anyhow::bail!("training image directory {} does not exist", self.root.display());
        }
        let mut split = FileSplit::new(&self.root, self.recursive, shuffle, seed)?;
        let labeler = self.labeler();
        let summary = summarize_split(split.files(), &labeler);
        tracing::info!(
            "indexed {} images under {} ({} labeled)",
            summary.images,
            self.root.display(),
            summary.labeled
        );
        if summary.missing_labels > 0 {
            if !self.skip_errors {
                anyhow::bail!(
                    "{} of {} images have no mask in '{}'",
                    summary.missing_labels,
                    summary.images,
                    self.label_dir
                );
            }
            tracing::warn!("dropping {} images without a mask", summary.missing_labels);
            split.retain_labeled(&labeler);
        }
        if split.is_empty() {
            anyhow::bail!("no labeled images found under {}", self.root.display());
        }
        Ok(split)
    }
}

/// Split plus batch iterator ready for `fit`.
pub fn build_iter(cfg: &RunConfig) -> anyhow::Result<BatchIter> {
    let paths = DatasetPathConfig::from_run_config(cfg);
    let split = paths.load(cfg.shuffle, cfg.seed)?;
    let labeler: Arc<dyn PathLabelGenerator> = Arc::new(paths.labeler());
    let batch_cfg = BatchConfig {
        batch_size: cfg.batch_size,
        spec: cfg.image_spec(),
        shuffle: cfg.shuffle,
        seed: cfg.seed,
        drop_last: false,
        skip_errors: cfg.skip_errors,
    };
    let mut scaler = ImageScaler::default();
    scaler.fit(split.files());
    Ok(BatchIter::new(split, batch_cfg, labeler).with_preprocessor(scaler))
}
