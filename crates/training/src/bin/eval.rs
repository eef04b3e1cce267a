use clap::Parser;
use cli_support::{expand_path, init_logging, VerbosityArgs};
use inference::Segmenter;
use seg_dataset::ImageScaler;
use std::path::PathBuf;
use training::dataset::DatasetPathConfig;
use training::util::{validate_backend_choice, BackendKind};
use training::{evaluate_split, RunConfig, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate a U-Net checkpoint on a labeled image split (pixel accuracy, IoU, Dice)"
)]
struct Args {
    /// TOML run configuration (falls back to $UNET_CONFIG, then ./unet.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
    /// Image directory to evaluate (defaults to the configured training images).
    #[arg(long)]
    images: Option<String>,
    /// Checkpoint path to load (defaults to the configured checkpoint).
    #[arg(long)]
    checkpoint: Option<String>,
    /// Probability at which a pixel counts as foreground.
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,
    /// Number of lowest-IoU images to list.
    #[arg(long, default_value_t = 5)]
    worst: usize,
    #[command(flatten)]
    verbosity: VerbosityArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbosity.verbosity());
    validate_backend_choice(args.backend)?;

    let mut cfg = RunConfig::load(args.config.as_deref())?;
    if let Some(images) = &args.images {
        cfg.train_images = expand_path(images);
    }
    if let Some(ckpt) = &args.checkpoint {
        cfg.checkpoint = expand_path(ckpt);
    }
    if !(0.0..=1.0).contains(&args.threshold) {
        anyhow::bail!("threshold must be in [0, 1], got {}", args.threshold);
    }

    let paths = DatasetPathConfig::from_run_config(&cfg);
    let split = paths.load(false, None)?;

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let segmenter = Segmenter::<TrainBackend>::from_checkpoint(
        &cfg.checkpoint,
        cfg.model_config(),
        cfg.image_spec(),
        ImageScaler::default(),
        device,
    )?;

    let mut report = evaluate_split(&segmenter, split.files(), &paths.labeler(), args.threshold)?;
    let m = report.metrics;
    println!(
        "Eval complete on {} images: accuracy={:.4}, iou={:.4}, dice={:.4}, precision={:.4}, recall={:.4} (threshold={})",
        report.images,
        m.pixel_accuracy(),
        m.iou(),
        m.dice(),
        m.precision(),
        m.recall(),
        args.threshold
    );

    report
        .per_image_iou
        .sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    for (path, iou) in report.per_image_iou.iter().take(args.worst) {
        println!("  iou {iou:.4}  {}", path.display());
    }
    Ok(())
}
