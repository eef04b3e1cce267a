use data_contracts::{StatsRecord, TrainStatus};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read stats records from a JSON-lines file, keeping the last `tail` when
/// given. Malformed lines (e.g. one still being written) are skipped.
pub fn read_stats(path: &Path, tail: Option<usize>) -> Result<Vec<StatsRecord>, StatsError> {
    let file = fs::File::open(path).map_err(|source| StatsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = io::BufReader::new(file);
    let mut skipped = 0usize;
    let mut rows: Vec<StatsRecord> = reader
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(&line) {
            Ok(rec) => Some(rec),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        tracing::debug!("skipped {skipped} malformed lines in {}", path.display());
    }
    if let Some(n) = tail {
        if rows.len() > n {
            rows.drain(0..rows.len() - n);
        }
    }
    Ok(rows)
}

/// Latest status snapshot, or `None` if absent or unreadable.
pub fn read_status(path: &Path) -> Option<TrainStatus> {
    let data = fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    pub records: usize,
    pub last: Option<StatsRecord>,
    pub best_score: Option<f32>,
    pub best_iteration: Option<u64>,
    /// Mean score over the last `window` records.
    pub window_mean: Option<f32>,
}

impl StatsSummary {
    pub fn from_records(records: &[StatsRecord], window: usize) -> Self {
        let best = records
            .iter()
            .filter(|r| r.score.is_finite())
            .min_by(|a, b| a.score.total_cmp(&b.score));
        let window = window.max(1).min(records.len());
        let window_mean = if window == 0 {
            None
        } else {
            let recent = &records[records.len() - window..];
            Some(recent.iter().map(|r| r.score).sum::<f32>() / window as f32)
        };
        Self {
            records: records.len(),
            last: records.last().cloned(),
            best_score: best.map(|r| r.score),
            best_iteration: best.map(|r| r.iteration),
            window_mean,
        }
    }
}

/// Scores of the last `max_points` records scaled to `0..=100` for a sparkline.
/// A flat series maps to the midpoint.
pub fn score_series(records: &[StatsRecord], max_points: usize) -> Vec<u64> {
    let start = records.len().saturating_sub(max_points);
    let scores: Vec<f32> = records[start..]
        .iter()
        .map(|r| r.score)
        .filter(|s| s.is_finite())
        .collect();
    let (min, max) = scores
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(*s), hi.max(*s))
        });
    let span = max - min;
    scores
        .iter()
        .map(|s| {
            if span <= f32::EPSILON {
                50
            } else {
                (((s - min) / span) * 100.0).round() as u64
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(iteration: u64, score: f32) -> StatsRecord {
        StatsRecord {
            iteration,
            epoch: 0,
            score,
            learning_rate: 1e-4,
            batch_size: 10,
            elapsed_ms: iteration * 100,
            unix_time: 0.0,
        }
    }

    #[test]
    fn summary_tracks_best_and_window() {
        let records = vec![rec(0, 0.9), rec(1, 0.4), rec(2, 0.6), rec(3, 0.5)];
        let s = StatsSummary::from_records(&records, 2);
        assert_eq!(s.records, 4);
        assert_eq!(s.best_score, Some(0.4));
        assert_eq!(s.best_iteration, Some(1));
        assert_eq!(s.last.map(|r| r.iteration), Some(3));
        assert!((s.window_mean.unwrap() - 0.55).abs() < 1e-6);
    }

    #[test]
    fn empty_summary() {
        let s = StatsSummary::from_records(&[], 10);
        assert_eq!(s, StatsSummary::default());
    }

    #[test]
    fn series_scales_to_percent() {
        let records = vec![rec(0, 1.0), rec(1, 0.5), rec(2, 0.0)];
        assert_eq!(score_series(&records, 10), vec![100, 50, 0]);
        assert_eq!(score_series(&records, 2), vec![100, 0]);
        assert_eq!(score_series(&[rec(0, 0.3), rec(1, 0.3)], 10), vec![50, 50]);
    }
}
