//! Shared data contracts between the trainer and the metrics dashboard.

pub mod stats;

pub use stats::{StatsRecord, TrainState, TrainStatus, ValidationError};
