#![recursion_limit = "256"]

pub mod mask;
pub mod segmenter;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use mask::{prediction_to_gray, MaskStats};
pub use segmenter::{InferenceError, Segmenter};

/// Written to the working directory when no output path is given.
pub const DEFAULT_OUTPUT: &str = "outputUnet.png";

pub mod prelude {
    pub use crate::mask::prediction_to_gray;
    pub use crate::segmenter::{InferenceError, Segmenter};
    pub use crate::{InferenceBackend, DEFAULT_OUTPUT};
}
