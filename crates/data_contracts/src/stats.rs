use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One optimizer step, appended as a JSON line to the stats file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub iteration: u64,
    pub epoch: usize,
    /// Mean loss of the minibatch.
    pub score: f32,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Milliseconds since the start of training.
    pub elapsed_ms: u64,
    pub unix_time: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrainState {
    Running,
    Finished,
    Failed,
}

impl TrainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainState::Running => "running",
            TrainState::Finished => "finished",
            TrainState::Failed => "failed",
        }
    }
}

/// Snapshot of a run, rewritten in full after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainStatus {
    pub state: TrainState,
    pub epoch: usize,
    pub epochs: usize,
    pub iteration: u64,
    pub score: Option<f32>,
    pub learning_rate: f64,
    pub updated_unix: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("score is not finite: {0}")]
    NonFiniteScore(f32),
    #[error("learning rate out of range: {0}")]
    InvalidLearningRate(f64),
    #[error("epoch {epoch} exceeds configured epochs {epochs}")]
    EpochOutOfRange { epoch: usize, epochs: usize },
}

fn check_learning_rate(lr: f64) -> Result<(), ValidationError> {
    if !lr.is_finite() || lr < 0.0 {
        return Err(ValidationError::InvalidLearningRate(lr));
    }
    Ok(())
}

impl StatsRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.score.is_finite() {
            return Err(ValidationError::NonFiniteScore(self.score));
        }
        check_learning_rate(self.learning_rate)
    }
}

impl TrainStatus {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(score) = self.score {
            if !score.is_finite() {
                return Err(ValidationError::NonFiniteScore(score));
            }
        }
        if self.epochs > 0 && self.epoch > self.epochs {
            return Err(ValidationError::EpochOutOfRange {
                epoch: self.epoch,
                epochs: self.epochs,
            });
        }
        check_learning_rate(self.learning_rate)
    }

    /// Fraction of configured epochs completed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.epochs == 0 {
            return 0.0;
        }
        (self.epoch as f64 / self.epochs as f64).clamp(0.0, 1.0)
    }
}
