//! Dataset loading and Burn-compatible batching for image segmentation.
//!
//! This crate provides utilities for:
//! - Indexing an image directory filtered by supported formats (`split`)
//! - Mapping each image to its mask file (`labels`)
//! - Decoding and resizing images and masks into CHW buffers (`image_io`)
//! - Scaling pixel intensities into a target range (`scaler`)
//! - Iterating shuffled minibatches as Burn tensors (`batch`)

pub mod batch;
pub mod image_io;
pub mod labels;
pub mod scaler;
pub mod split;
pub mod types;

pub use batch::{load_sample, BatchConfig, BatchIter, SegBatch};
pub use image_io::{image_to_chw, load_image_chw, load_mask, ImageSpec};
pub use labels::{PathLabelGenerator, UnetPathLabelGenerator};
pub use scaler::ImageScaler;
pub use split::{index_images, is_allowed_format, summarize_split, FileSplit, ALLOWED_FORMATS};
pub use types::*;
