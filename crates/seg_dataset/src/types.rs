//! Core types and error definitions for seg_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, SegDatasetError>;

#[derive(Debug, Error)]
pub enum SegDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no label file for image {image} (expected {expected})")]
    MissingLabel { image: PathBuf, expected: PathBuf },
    #[error("cannot derive label path for image {image}: {msg}")]
    LabelPath { image: PathBuf, msg: String },
    #[error("unsupported channel count {0} (expected 1 or 3)")]
    Channels(usize),
    #[error("no images with an allowed extension under {root}")]
    EmptySplit { root: PathBuf },
    #[error("{0}")]
    Other(String),
}

/// Order in which color planes are written into the CHW buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    /// Blue first, matching OpenCV-style loaders.
    #[default]
    Bgr,
}

impl std::str::FromStr for ChannelOrder {
    type Err = SegDatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(SegDatasetError::Other(format!(
                "unknown channel order '{other}' (expected rgb or bgr)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SegSample {
    pub image_path: PathBuf,
    /// Image in CHW layout, already passed through the scaler.
    pub image_chw: Vec<f32>,
    /// Binary mask in HW layout, values 0.0 or 1.0.
    pub mask_hw: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub images: usize,
    pub labeled: usize,
    pub missing_labels: usize,
}

