//! Run configuration: defaults, an optional TOML file, then CLI overrides.

use anyhow::Context;
use cli_support::expand_path;
use models::UNetConfig;
use seg_dataset::{ChannelOrder, ImageSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::schedule::LearningRateSchedule;

pub const DEFAULT_CONFIG_NAME: &str = "unet.toml";
pub const CONFIG_ENV: &str = "UNET_CONFIG";

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory of training images; masks live in the sibling label directory.
    pub train_images: PathBuf,
    pub image_dir_name: String,
    pub label_dir_name: String,
    pub recursive: bool,
    /// Image segmented once training finishes.
    pub test_image: PathBuf,
    pub checkpoint: PathBuf,
    pub stats_file: PathBuf,
    pub status_file: PathBuf,
    pub output: PathBuf,

    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub channel_order: ChannelOrder,
    pub base_filters: usize,
    pub depth: usize,
    pub dropout: f64,

    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub lr_schedule: Option<LearningRateSchedule>,
    pub seed: Option<u64>,
    pub shuffle: bool,
    pub print_every: usize,
    pub skip_errors: bool,

    /// Binarize the output mask at this probability.
    pub threshold: Option<f32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_images: expand_path("~/unet/data/membrane/train/image"),
            image_dir_name: "image".to_string(),
            label_dir_name: "label".to_string(),
            recursive: true,
            test_image: expand_path("~/unet/data/membrane/test/0.png"),
            checkpoint: expand_path("~/unet/unet_membrane.bin"),
            stats_file: expand_path("~/unet/stats.jsonl"),
            status_file: expand_path("~/unet/train_status.json"),
            output: PathBuf::from(inference::DEFAULT_OUTPUT),
            width: 256,
            height: 256,
            channels: 3,
            channel_order: ChannelOrder::Bgr,
            base_filters: 64,
            depth: 4,
            dropout: 0.5,
            epochs: 600,
            batch_size: 10,
            learning_rate: 1e-4,
            lr_schedule: None,
            seed: None,
            shuffle: true,
            print_every: 10,
            skip_errors: false,
            threshold: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    paths: Option<PathsSection>,
    model: Option<ModelSection>,
    training: Option<TrainingSection>,
    inference: Option<InferenceSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PathsSection {
    train_images: Option<String>,
    image_dir_name: Option<String>,
    label_dir_name: Option<String>,
    recursive: Option<bool>,
    test_image: Option<String>,
    checkpoint: Option<String>,
    stats_file: Option<String>,
    status_file: Option<String>,
    output: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<usize>,
    channel_order: Option<ChannelOrder>,
    base_filters: Option<usize>,
    depth: Option<usize>,
    dropout: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainingSection {
    epochs: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    /// Iteration (as a string key) -> learning rate.
    lr_schedule: Option<BTreeMap<String, f64>>,
    seed: Option<u64>,
    shuffle: Option<bool>,
    print_every: Option<usize>,
    skip_errors: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InferenceSection {
    threshold: Option<f32>,
}

impl RunConfig {
    /// Resolve the config file: explicit path, then `$UNET_CONFIG`, then
    /// `unet.toml` in the working directory, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(&expand_path(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_NAME);
        if local.exists() {
            return Self::from_path(local);
        }
        tracing::debug!("no {DEFAULT_CONFIG_NAME} found; using defaults");
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let file: RunConfigFile = toml::from_str(raw)?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RunConfigFile) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(p) = file.paths {
            if let Some(v) = p.train_images {
                cfg.train_images = expand_path(&v);
            }
            if let Some(v) = p.image_dir_name {
                cfg.image_dir_name = v;
            }
            if let Some(v) = p.label_dir_name {
                cfg.label_dir_name = v;
            }
            if let Some(v) = p.recursive {
                cfg.recursive = v;
            }
            if let Some(v) = p.test_image {
                cfg.test_image = expand_path(&v);
            }
            if let Some(v) = p.checkpoint {
                cfg.checkpoint = expand_path(&v);
            }
            if let Some(v) = p.stats_file {
                cfg.stats_file = expand_path(&v);
            }
            if let Some(v) = p.status_file {
                cfg.status_file = expand_path(&v);
            }
            if let Some(v) = p.output {
                cfg.output = expand_path(&v);
            }
        }
        if let Some(m) = file.model {
            cfg.width = m.width.unwrap_or(cfg.width);
            cfg.height = m.height.unwrap_or(cfg.height);
            cfg.channels = m.channels.unwrap_or(cfg.channels);
            cfg.channel_order = m.channel_order.unwrap_or(cfg.channel_order);
            cfg.base_filters = m.base_filters.unwrap_or(cfg.base_filters);
            cfg.depth = m.depth.unwrap_or(cfg.depth);
            cfg.dropout = m.dropout.unwrap_or(cfg.dropout);
        }
        if let Some(t) = file.training {
            cfg.epochs = t.epochs.unwrap_or(cfg.epochs);
            cfg.batch_size = t.batch_size.unwrap_or(cfg.batch_size);
            cfg.learning_rate = t.learning_rate.unwrap_or(cfg.learning_rate);
            if let Some(map) = t.lr_schedule {
                let mut parsed = BTreeMap::new();
                for (key, lr) in map {
                    let iteration: u64 = key
                        .trim()
                        .parse()
                        .with_context(|| format!("lr_schedule key '{key}' is not an iteration"))?;
                    parsed.insert(iteration, lr);
                }
                cfg.lr_schedule = Some(LearningRateSchedule::from_map(parsed)?);
            }
            cfg.seed = t.seed.or(cfg.seed);
            cfg.shuffle = t.shuffle.unwrap_or(cfg.shuffle);
            cfg.print_every = t.print_every.unwrap_or(cfg.print_every);
            cfg.skip_errors = t.skip_errors.unwrap_or(cfg.skip_errors);
        }
        if let Some(i) = file.inference {
            cfg.threshold = i.threshold.or(cfg.threshold);
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.epochs == 0 {
            anyhow::bail!("epochs must be at least 1");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            anyhow::bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            anyhow::bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if let Some(t) = self.threshold {
            if !(0.0..=1.0).contains(&t) {
                anyhow::bail!("threshold must be in [0, 1], got {t}");
            }
        }
        self.model_config()
            .validate_input(self.height as usize, self.width as usize)?;
        if self.channels != 1 && self.channels != 3 {
            anyhow::bail!("channels must be 1 or 3, got {}", self.channels);
        }
        Ok(())
    }

    pub fn model_config(&self) -> UNetConfig {
        UNetConfig {
            in_channels: self.channels,
            out_channels: 1,
            base_filters: self.base_filters,
            depth: self.depth,
            dropout: self.dropout,
        }
    }

    pub fn image_spec(&self) -> ImageSpec {
        ImageSpec {
            width: self.width,
            height: self.height,
            channels: self.channels,
            channel_order: self.channel_order,
        }
    }

    pub fn schedule(&self) -> LearningRateSchedule {
        self.lr_schedule
            .clone()
            .unwrap_or(LearningRateSchedule::Fixed(self.learning_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_membrane_layout() {
        let cfg = RunConfig::default();
        assert!(cfg.train_images.ends_with("unet/data/membrane/train/image"));
        assert!(cfg.test_image.ends_with("unet/data/membrane/test/0.png"));
        assert_eq!(cfg.output, PathBuf::from("outputUnet.png"));
        assert_eq!((cfg.width, cfg.height, cfg.channels), (256, 256, 3));
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.epochs, 600);
        assert_eq!(cfg.schedule(), LearningRateSchedule::Fixed(1e-4));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = RunConfig::from_toml_str(
            r#"
            [paths]
            train_images = "/data/aug/image"
            output = "mask.png"

            [model]
            width = 64
            height = 32
            channels = 1
            channel_order = "rgb"

            [training]
            epochs = 3
            seed = 1234

            [training.lr_schedule]
            "0" = 5e-5
            "200" = 1e-5

            [inference]
            threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.train_images, PathBuf::from("/data/aug/image"));
        assert_eq!(cfg.output, PathBuf::from("mask.png"));
        assert_eq!((cfg.width, cfg.height, cfg.channels), (64, 32, 1));
        assert_eq!(cfg.channel_order, ChannelOrder::Rgb);
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.seed, Some(1234));
        assert_eq!(cfg.schedule().rate_at(250), 1e-5);
        assert_eq!(cfg.threshold, Some(0.5));
        assert_eq!(cfg.batch_size, 10);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_geometry() {
        assert!(RunConfig::from_toml_str("[training]\nepoch = 3\n").is_err());
        assert!(RunConfig::from_toml_str("[model]\nwidth = 100\n").is_err());
        assert!(RunConfig::from_toml_str("[training.lr_schedule]\nfirst = 1e-4\n").is_err());
    }

    #[test]
    fn out_of_range_depth_is_an_error() {
        assert!(RunConfig::from_toml_str("[model]\ndepth = 64\n").is_err());
        assert!(RunConfig::from_toml_str("[model]\ndepth = 63\n").is_err());
        assert!(RunConfig::from_toml_str("[model]\ndepth = 0\nwidth = 7\nheight = 7\n").is_err());
        assert!(RunConfig::from_toml_str("[model]\ndepth = 1\nwidth = 8\nheight = 8\n").is_ok());
    }

    #[test]
    fn env_var_selects_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.toml");
        std::fs::write(&path, "[training]\nepochs = 7\n").unwrap();
        std::env::set_var(CONFIG_ENV, &path);
        let from_env = RunConfig::load(None);
        let explicit = RunConfig::load(Some(&tmp.path().join("absent.toml")));
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(from_env.unwrap().epochs, 7);
        assert!(explicit.is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(RunConfig::load(Some(&tmp.path().join("absent.toml"))).is_err());
    }
}
