use clap::Parser;
use std::path::PathBuf;

use cli_support::{expand_path, init_logging, VerbosityArgs};
use inference::prelude::{InferenceBackend, Segmenter, DEFAULT_OUTPUT};
use models::UNetConfig;
use seg_dataset::{ChannelOrder, ImageScaler, ImageSpec};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Segment a single image with a trained U-Net checkpoint and write a grayscale mask"
)]
struct Args {
    /// Input image (defaults to ~/unet/data/membrane/test/0.png).
    image: Option<PathBuf>,
    /// Checkpoint written by `train`.
    #[arg(long, default_value = "~/unet/unet_membrane.bin")]
    checkpoint: String,
    /// Output PNG path.
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    out: PathBuf,
    /// Binarize the mask at this probability instead of writing raw intensities.
    #[arg(long)]
    threshold: Option<f32>,
    #[arg(long, default_value_t = 256)]
    width: u32,
    #[arg(long, default_value_t = 256)]
    height: u32,
    #[arg(long, default_value_t = 3)]
    channels: usize,
    /// Channel order the model was trained with (rgb or bgr).
    #[arg(long, default_value = "bgr")]
    channel_order: ChannelOrder,
    /// Must match the trained model.
    #[arg(long, default_value_t = 64)]
    base_filters: usize,
    /// Must match the trained model.
    #[arg(long, default_value_t = 4)]
    depth: usize,
    #[command(flatten)]
    verbosity: VerbosityArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbosity.verbosity());

    let image = args
        .image
        .clone()
        .unwrap_or_else(|| expand_path("~/unet/data/membrane/test/0.png"));
    let checkpoint = expand_path(&args.checkpoint);
    let spec = ImageSpec {
        width: args.width,
        height: args.height,
        channels: args.channels,
        channel_order: args.channel_order,
    };
    let model_cfg = UNetConfig {
        in_channels: args.channels,
        base_filters: args.base_filters,
        depth: args.depth,
        ..Default::default()
    };

    let device = <InferenceBackend as burn::tensor::backend::Backend>::Device::default();
    let segmenter = Segmenter::<InferenceBackend>::from_checkpoint(
        &checkpoint,
        model_cfg,
        spec,
        ImageScaler::default(),
        device,
    )?;
    segmenter.write_mask(&image, &args.out, args.threshold)?;
    println!(
        "saved mask for {} to {}",
        image.display(),
        args.out.display()
    );
    Ok(())
}
