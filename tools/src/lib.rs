pub mod config;
pub mod services;

pub use config::ToolConfig;
pub use services::{read_stats, read_status, score_series, StatsError, StatsSummary};
