use burn::tensor::backend::Backend;
use inference::Segmenter;
use seg_dataset::{load_mask, PathLabelGenerator, SegDatasetError};
use std::path::PathBuf;

/// Pixel-level confusion counts for a binary mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskMetrics {
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
    pub tn: u64,
}

impl MaskMetrics {
    /// Count predictions (probabilities) against a {0, 1} target. A pixel is
    /// foreground when its probability is strictly above `threshold`, the same
    /// rule the written mask uses.
    pub fn accumulate(&mut self, pred: &[f32], target: &[f32], threshold: f32) {
        for (p, t) in pred.iter().zip(target) {
            match (*p > threshold, *t >= 0.5) {
                (true, true) => self.tp += 1,
                (true, false) => self.fp += 1,
                (false, true) => self.fn_ += 1,
                (false, false) => self.tn += 1,
            }
        }
    }

    pub fn merge(&mut self, other: &MaskMetrics) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
        self.tn += other.tn;
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.fn_ + self.tn
    }

    pub fn pixel_accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total(), 0.0)
    }

    /// Empty prediction on an empty target counts as a perfect match.
    pub fn iou(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp + self.fn_, 1.0)
    }

    pub fn dice(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_, 1.0)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp, 0.0)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_, 0.0)
    }
}

fn ratio(num: u64, den: u64, empty: f64) -> f64 {
    if den == 0 {
        empty
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    pub metrics: MaskMetrics,
    pub images: usize,
    pub per_image_iou: Vec<(PathBuf, f64)>,
}

/// Segment every image in `files` and compare with its mask.
pub fn evaluate_split<B: Backend>(
    segmenter: &Segmenter<B>,
    files: &[PathBuf],
    labeler: &dyn PathLabelGenerator,
    threshold: f32,
) -> anyhow::Result<EvalReport> {
    let spec = *segmenter.spec();
    let mut report = EvalReport::default();
    for path in files {
        let label = labeler.label_path(path)?;
        if !label.exists() {
            return Err(SegDatasetError::MissingLabel {
                image: path.clone(),
                expected: label,
            }
            .into());
        }
        let img = image::open(path).map_err(|source| SegDatasetError::Image {
            path: path.clone(),
            source,
        })?;
        let pred = segmenter.predict(&img)?;
        let target = load_mask(&label, spec.width, spec.height)?;
        let mut m = MaskMetrics::default();
        m.accumulate(&pred, &target, threshold);
        tracing::debug!("{}: iou {:.4}", path.display(), m.iou());
        report.per_image_iou.push((path.clone(), m.iou()));
        report.metrics.merge(&m);
        report.images += 1;
    }
    Ok(report)
}
