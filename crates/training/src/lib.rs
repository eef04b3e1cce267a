#![recursion_limit = "256"]

pub mod config;
pub mod dataset;
pub mod listeners;
pub mod loss;
pub mod metrics;
pub mod schedule;
pub mod util;

pub use config::RunConfig;
pub use dataset::{build_iter, DatasetPathConfig};
pub use listeners::{
    IterationEvent, RunOutcome, ScoreIterationListener, StatsListener, TrainingListener,
};
pub use loss::binary_cross_entropy;
pub use metrics::{evaluate_split, EvalReport, MaskMetrics};
pub use models::{UNet, UNetConfig};
pub use schedule::{LearningRateSchedule, ScheduleError};
pub use util::{fit, run_train, FitOptions, TrainArgs};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
