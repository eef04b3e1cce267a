use std::path::{Path, PathBuf};

use cli_support::expand_path;
use serde::Deserialize;

const DEFAULT_CONFIG_NAME: &str = "unet-tools.toml";
const CONFIG_ENV: &str = "UNET_TOOLS_CONFIG";

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub stats_path: PathBuf,
    pub status_path: PathBuf,
    /// Records kept in memory for the sparkline and table.
    pub tail: usize,
    /// Window for the running mean score.
    pub mean_window: usize,
    pub tick_ms: u64,
    pub ui_title: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            stats_path: expand_path("~/unet/stats.jsonl"),
            status_path: expand_path("~/unet/train_status.json"),
            tail: 200,
            mean_window: 10,
            tick_ms: 250,
            ui_title: "U-Net Training".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ToolConfigFile {
    stats_path: Option<String>,
    status_path: Option<String>,
    tail: Option<usize>,
    mean_window: Option<usize>,
    tick_ms: Option<u64>,
    ui: Option<UiSection>,
}

#[derive(Debug, Deserialize, Default)]
struct UiSection {
    title: Option<String>,
}

impl ToolConfig {
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let cfg = Self::from_path(&expand_path(&path)).unwrap_or_default();
            cfg.warn_if_invalid();
            return cfg;
        }
        let cfg = Self::from_path(Path::new(DEFAULT_CONFIG_NAME)).unwrap_or_default();
        cfg.warn_if_invalid();
        cfg
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<ToolConfigFile>(&raw) {
            Ok(file) => Some(Self::from_file(file)),
            Err(err) => {
                tracing::warn!("ignoring invalid tools config {}: {err}", path.display());
                None
            }
        }
    }

    fn from_file(file: ToolConfigFile) -> Self {
        let defaults = Self::default();
        ToolConfig {
            stats_path: file
                .stats_path
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.stats_path),
            status_path: file
                .status_path
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.status_path),
            tail: file.tail.unwrap_or(defaults.tail),
            mean_window: file.mean_window.unwrap_or(defaults.mean_window),
            tick_ms: file.tick_ms.unwrap_or(defaults.tick_ms),
            ui_title: file
                .ui
                .and_then(|u| u.title)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.ui_title),
        }
    }

    fn warn_if_invalid(&self) {
        if self.tail == 0 {
            tracing::warn!("tools config: tail is 0; the score chart will stay empty");
        }
        if self.tick_ms == 0 {
            tracing::warn!("tools config: tick_ms is 0; the dashboard will poll continuously");
        }
    }
}
