use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::AutodiffBackend;
use cli_support::{expand_path, VerbosityArgs};
use inference::Segmenter;
use models::{UNet, UNetConfig};
use seg_dataset::BatchIter;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::RunConfig;
use crate::dataset::build_iter;
use crate::listeners::{
    IterationEvent, RunOutcome, ScoreIterationListener, StatsListener, TrainingListener,
};
use crate::loss::{binary_cross_entropy, scalar};
use crate::schedule::LearningRateSchedule;
use crate::TrainBackend;
use clap::{Parser, ValueEnum};

pub fn load_unet_from_checkpoint<P: AsRef<Path>>(
    path: P,
    cfg: UNetConfig,
    device: &<TrainBackend as burn::tensor::backend::Backend>::Device,
) -> Result<UNet<TrainBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    UNet::<TrainBackend>::new(cfg, device).load_file(path.as_ref(), &recorder, device)
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum BackendKind {
    #[default]
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "train",
    about = "Train a U-Net on image/label pairs, then segment a test image"
)]
pub struct TrainArgs {
    /// Image segmented after training (overrides the config's test image).
    pub image: Option<PathBuf>,
    /// TOML run configuration (falls back to $UNET_CONFIG, then ./unet.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Directory of training images; masks are read from the sibling label directory.
    #[arg(long)]
    pub train_images: Option<String>,
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Fixed Adam learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Iteration-keyed schedule, e.g. "0:5e-5,200:1e-5" (takes precedence over --lr).
    #[arg(long)]
    pub lr_schedule: Option<LearningRateSchedule>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Checkpoint output path.
    #[arg(long)]
    pub checkpoint_out: Option<String>,
    /// JSON-lines stats file for the dashboard.
    #[arg(long)]
    pub stats_file: Option<String>,
    /// Output PNG for the segmented test image.
    #[arg(long)]
    pub output: Option<String>,
    /// Binarize the output mask at this probability.
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Log the score every N iterations.
    #[arg(long)]
    pub print_every: Option<usize>,
    /// Stop after saving the checkpoint.
    #[arg(long)]
    pub skip_inference: bool,
    #[command(flatten)]
    pub verbosity: VerbosityArgs,
}

impl TrainArgs {
    /// Apply command-line overrides on top of a loaded config.
    pub fn apply(&self, cfg: &mut RunConfig) {
        if let Some(v) = &self.image {
            cfg.test_image = v.clone();
        }
        if let Some(v) = &self.train_images {
            cfg.train_images = expand_path(v);
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.lr {
            cfg.learning_rate = v;
            cfg.lr_schedule = None;
        }
        if let Some(v) = &self.lr_schedule {
            cfg.lr_schedule = Some(v.clone());
        }
        if let Some(v) = self.seed {
            cfg.seed = Some(v);
        }
        if let Some(v) = &self.checkpoint_out {
            cfg.checkpoint = expand_path(v);
        }
        if let Some(v) = &self.stats_file {
            cfg.stats_file = expand_path(v);
        }
        if let Some(v) = &self.output {
            cfg.output = expand_path(v);
        }
        if let Some(v) = self.threshold {
            cfg.threshold = Some(v);
        }
        if let Some(v) = self.print_every {
            cfg.print_every = v;
        }
    }
}

pub struct FitOptions {
    pub epochs: usize,
    pub schedule: LearningRateSchedule,
}

impl FitOptions {
    pub fn from_run_config(cfg: &RunConfig) -> Self {
        Self {
            epochs: cfg.epochs,
            schedule: cfg.schedule(),
        }
    }
}

/// Train `model` for `opts.epochs` passes over `iter` with Adam.
pub fn fit<B: AutodiffBackend>(
    mut model: UNet<B>,
    iter: &mut BatchIter,
    opts: &FitOptions,
    listeners: &mut [&mut dyn TrainingListener],
    device: &B::Device,
) -> anyhow::Result<UNet<B>> {
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();
    let started = Instant::now();
    let mut iteration: u64 = 0;

    for listener in listeners.iter_mut() {
        listener.on_start(opts.epochs)?;
    }

    for epoch in 0..opts.epochs {
        if epoch > 0 {
            iter.reset();
        }
        let mut losses = Vec::new();
        while let Some(batch) = iter.next_batch::<B>(device)? {
            let batch_size = batch.len();
            let preds = model.forward(batch.images);
            let loss = binary_cross_entropy(preds, batch.masks);
            let score = scalar(loss.clone().detach());
            if !score.is_finite() {
                anyhow::bail!("loss became {score} at iteration {iteration} (epoch {epoch})");
            }

            let lr = opts.schedule.rate_at(iteration);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);

            let event = IterationEvent {
                iteration,
                epoch,
                score,
                learning_rate: lr,
                batch_size,
                elapsed: started.elapsed(),
            };
            for listener in listeners.iter_mut() {
                listener.on_iteration(&event)?;
            }
            losses.push(score);
            iteration += 1;
        }
        if losses.is_empty() {
            anyhow::bail!("epoch {epoch} produced no batches");
        }
        let avg_loss = losses.iter().sum::<f32>() / losses.len() as f32;
        tracing::info!("epoch {epoch}: avg loss {avg_loss:.4}");
        if iter.skipped() > 0 {
            tracing::warn!("epoch {epoch}: skipped {} unreadable samples", iter.skipped());
        }
        for listener in listeners.iter_mut() {
            listener.on_epoch_end(epoch, avg_loss)?;
        }
    }
    Ok(model)
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

pub fn save_checkpoint<B: burn::tensor::backend::Backend>(
    model: &UNet<B>,
    path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))?;
    Ok(())
}

/// File the recorder actually writes for `path`.
pub fn checkpoint_file(path: &Path) -> PathBuf {
    path.with_extension("bin")
}

type ADBackend = Autodiff<TrainBackend>;

/// Train, checkpoint, and segment the test image, as configured by `args`.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;
    let mut cfg = RunConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let mut stats = StatsListener::create(&cfg.stats_file, &cfg.status_file)?;
    match train_and_segment(&cfg, &mut stats, args.skip_inference) {
        Ok(()) => {
            stats.on_finish(&RunOutcome::Finished)?;
            Ok(())
        }
        Err(e) => {
            if let Err(status_err) = stats.on_finish(&RunOutcome::Failed(format!("{e:#}"))) {
                tracing::warn!("failed to record run failure: {status_err:#}");
            }
            Err(e)
        }
    }
}

fn train_and_segment(
    cfg: &RunConfig,
    stats: &mut StatsListener,
    skip_inference: bool,
) -> anyhow::Result<()> {
    let mut iter = build_iter(cfg)?;
    tracing::info!(
        "training on {} images, {} batches per epoch",
        iter.len(),
        iter.batches_per_epoch()
    );

    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let model = UNet::<ADBackend>::new(cfg.model_config(), &device);
    model.check_input(cfg.channels, cfg.height as usize, cfg.width as usize)?;
    let checkpoint = checkpoint_file(&cfg.checkpoint);
    tracing::info!("Using model: {}", checkpoint.display());

    let mut score = ScoreIterationListener::new(cfg.print_every);
    let mut listeners: [&mut dyn TrainingListener; 2] = [&mut score, &mut *stats];
    let model = fit(
        model,
        &mut iter,
        &FitOptions::from_run_config(cfg),
        &mut listeners,
        &device,
    )?;

    save_checkpoint(&model, &cfg.checkpoint)?;
    println!("Saved checkpoint to {}", checkpoint.display());
    tracing::info!("\n{}", model.summary());

    if skip_inference {
        return Ok(());
    }
    let segmenter = Segmenter::new(
        model.valid(),
        cfg.image_spec(),
        iter.preprocessor().copied().unwrap_or_default(),
        device,
    )?;
    segmenter.write_mask(&cfg.test_image, &cfg.output, cfg.threshold)?;
    println!(
        "Segmented {} -> {}",
        cfg.test_image.display(),
        cfg.output.display()
    );
    Ok(())
}
