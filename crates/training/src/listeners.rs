//! Hooks notified by the training loop.

use anyhow::Context;
use data_contracts::{StatsRecord, TrainState, TrainStatus};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct IterationEvent {
    pub iteration: u64,
    pub epoch: usize,
    pub score: f32,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished,
    Failed(String),
}

pub trait TrainingListener {
    fn on_start(&mut self, _epochs: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_iteration(&mut self, event: &IterationEvent) -> anyhow::Result<()>;

    fn on_epoch_end(&mut self, _epoch: usize, _mean_score: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_finish(&mut self, _outcome: &RunOutcome) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs the minibatch score every `print_every` iterations.
pub struct ScoreIterationListener {
    print_every: u64,
}

impl ScoreIterationListener {
    pub fn new(print_every: usize) -> Self {
        Self {
            print_every: print_every.max(1) as u64,
        }
    }
}

impl TrainingListener for ScoreIterationListener {
    fn on_iteration(&mut self, event: &IterationEvent) -> anyhow::Result<()> {
        if event.iteration % self.print_every == 0 {
            tracing::info!(
                "score at iteration {} is {:.6} (lr {:.3e})",
                event.iteration,
                event.score,
                event.learning_rate
            );
        }
        Ok(())
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Appends one JSON line per iteration to the stats file and keeps the status
/// file current, for the dashboard to poll.
pub struct StatsListener {
    writer: BufWriter<File>,
    status_path: PathBuf,
    status: TrainStatus,
}

impl StatsListener {
    /// Truncates any stats left by a previous run.
    pub fn create(stats_path: &Path, status_path: &Path) -> anyhow::Result<Self> {
        for path in [stats_path, status_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = File::create(stats_path)
            .with_context(|| format!("failed to create stats file {}", stats_path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            status_path: status_path.to_path_buf(),
            status: TrainStatus {
                state: TrainState::Running,
                epoch: 0,
                epochs: 0,
                iteration: 0,
                score: None,
                learning_rate: 0.0,
                updated_unix: unix_now(),
                message: None,
            },
        })
    }

    fn write_status(&mut self) -> anyhow::Result<()> {
        self.status.updated_unix = unix_now();
        let json = serde_json::to_vec_pretty(&self.status)?;
        // Write-then-rename so readers never see a half-written file.
        let tmp = self.status_path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.status_path)
            .with_context(|| format!("failed to replace {}", self.status_path.display()))?;
        Ok(())
    }
}

impl TrainingListener for StatsListener {
    fn on_start(&mut self, epochs: usize) -> anyhow::Result<()> {
        self.status.epochs = epochs;
        self.write_status()
    }

    fn on_iteration(&mut self, event: &IterationEvent) -> anyhow::Result<()> {
        let record = StatsRecord {
            iteration: event.iteration,
            epoch: event.epoch,
            score: event.score,
            learning_rate: event.learning_rate,
            batch_size: event.batch_size,
            elapsed_ms: event.elapsed.as_millis() as u64,
            unix_time: unix_now(),
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        self.status.epoch = event.epoch;
        self.status.iteration = event.iteration;
        self.status.score = Some(event.score);
        self.status.learning_rate = event.learning_rate;
        self.write_status()
    }

    fn on_epoch_end(&mut self, epoch: usize, _mean_score: f32) -> anyhow::Result<()> {
        self.status.epoch = epoch + 1;
        self.write_status()
    }

    fn on_finish(&mut self, outcome: &RunOutcome) -> anyhow::Result<()> {
        self.writer.flush()?;
        match outcome {
            RunOutcome::Finished => {
                self.status.state = TrainState::Finished;
                self.status.message = None;
            }
            RunOutcome::Failed(msg) => {
                self.status.state = TrainState::Failed;
                self.status.message = Some(msg.clone());
            }
        }
        self.write_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(iteration: u64) -> IterationEvent {
        IterationEvent {
            iteration,
            epoch: 0,
            score: 0.5,
            learning_rate: 1e-4,
            batch_size: 2,
            elapsed: Duration::from_millis(15),
        }
    }

    #[test]
    fn stats_listener_writes_lines_and_status() {
        let tmp = tempfile::tempdir().unwrap();
        let stats = tmp.path().join("nested/stats.jsonl");
        let status = tmp.path().join("nested/status.json");
        let mut listener = StatsListener::create(&stats, &status).unwrap();
        listener.on_start(2).unwrap();
        listener.on_iteration(&event(0)).unwrap();
        listener.on_iteration(&event(1)).unwrap();
        listener.on_epoch_end(0, 0.5).unwrap();

        let raw = fs::read_to_string(&stats).unwrap();
        let records: Vec<StatsRecord> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].iteration, 1);
        assert_eq!(records[0].elapsed_ms, 15);

        let snapshot: TrainStatus =
            serde_json::from_slice(&fs::read(&status).unwrap()).unwrap();
        assert_eq!(snapshot.state, TrainState::Running);
        assert_eq!(snapshot.epoch, 1);
        assert_eq!(snapshot.epochs, 2);

        listener
            .on_finish(&RunOutcome::Failed("disk full".into()))
            .unwrap();
        let snapshot: TrainStatus =
            serde_json::from_slice(&fs::read(&status).unwrap()).unwrap();
        assert_eq!(snapshot.state, TrainState::Failed);
        assert_eq!(snapshot.message.as_deref(), Some("disk full"));
    }

    #[test]
    fn create_truncates_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        let stats = tmp.path().join("stats.jsonl");
        fs::write(&stats, "old\n").unwrap();
        let _listener = StatsListener::create(&stats, &tmp.path().join("s.json")).unwrap();
        assert_eq!(fs::read_to_string(&stats).unwrap(), "");
    }

    #[test]
    fn score_listener_accepts_any_iteration() {
        let mut listener = ScoreIterationListener::new(0);
        for i in 0..3 {
            listener.on_iteration(&event(i)).unwrap();
        }
    }
}
