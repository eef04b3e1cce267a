//! End-to-end loading of a miniature membrane-style dataset.

use burn_ndarray::NdArray;
use image::{GrayImage, Luma, Rgb, RgbImage};
use seg_dataset::{
    summarize_split, BatchConfig, BatchIter, ChannelOrder, FileSplit, ImageScaler, ImageSpec,
    SegDatasetError, UnetPathLabelGenerator,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

type B = NdArray<f32>;

/// Writes `count` 8x8 images under `<root>/image` and masks under `<root>/label`.
fn synthetic_split(root: &Path, count: usize, with_labels: usize) -> anyhow::Result<()> {
    fs::create_dir_all(root.join("image"))?;
    fs::create_dir_all(root.join("label"))?;
    for i in 0..count {
        RgbImage::from_fn(8, 8, |x, _| Rgb([(x * 30) as u8, 128, 255]))
            .save(root.join("image").join(format!("{i}.png")))?;
        if i < with_labels {
            GrayImage::from_fn(8, 8, |x, _| if x < 4 { Luma([255]) } else { Luma([0]) })
                .save(root.join("label").join(format!("{i}.png")))?;
        }
    }
    Ok(())
}

fn spec() -> ImageSpec {
    ImageSpec {
        width: 8,
        height: 8,
        channels: 3,
        channel_order: ChannelOrder::Bgr,
    }
}

#[test]
fn batches_cover_split_with_partial_tail() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_split(tmp.path(), 5, 5)?;
    let split = FileSplit::new(&tmp.path().join("image"), false, true, Some(7))?;
    let cfg = BatchConfig {
        batch_size: 2,
        spec: spec(),
        seed: Some(7),
        ..Default::default()
    };
    let mut iter = BatchIter::new(split, cfg, Arc::new(UnetPathLabelGenerator::default()))
        .with_preprocessor(ImageScaler::default());
    assert_eq!(iter.batches_per_epoch(), 3);

    let device = Default::default();
    let mut sizes = Vec::new();
    while let Some(batch) = iter.next_batch::<B>(&device)? {
        assert_eq!(&batch.images.dims()[1..], &[3, 8, 8]);
        assert_eq!(&batch.masks.dims()[1..], &[1, 8, 8]);
        let px = batch.images.clone().into_data().to_vec::<f32>().unwrap();
        assert!(px.iter().all(|v| (0.0..=1.0).contains(v)));
        // Blue plane first: every pixel has blue = 255.
        assert!(px[..64].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        let mask = batch.masks.into_data().to_vec::<f32>().unwrap();
        assert!(mask.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert_eq!(&mask[..8], &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        sizes.push(batch.paths.len());
    }
    assert_eq!(sizes, vec![2, 2, 1]);

    iter.reset();
    assert!(iter.next_batch::<B>(&device)?.is_some());
    Ok(())
}

#[test]
fn drop_last_discards_partial_batch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_split(tmp.path(), 3, 3)?;
    let split = FileSplit::new(&tmp.path().join("image"), false, false, None)?;
    let cfg = BatchConfig {
        batch_size: 2,
        spec: spec(),
        shuffle: false,
        drop_last: true,
        ..Default::default()
    };
    let mut iter = BatchIter::new(split, cfg, Arc::new(UnetPathLabelGenerator::default()));
    let device = Default::default();
    assert!(iter.next_batch::<B>(&device)?.is_some());
    assert!(iter.next_batch::<B>(&device)?.is_none());
    Ok(())
}

#[test]
fn missing_label_aborts_unless_skipping() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    synthetic_split(tmp.path(), 3, 2)?;
    let labeler = Arc::new(UnetPathLabelGenerator::default());
    let split = FileSplit::new(&tmp.path().join("image"), false, false, None)?;
    assert_eq!(summarize_split(split.files(), labeler.as_ref()).missing_labels, 1);

    let strict = BatchConfig {
        batch_size: 3,
        spec: spec(),
        shuffle: false,
        ..Default::default()
    };
    let device = Default::default();
    let mut iter = BatchIter::new(split.clone(), strict.clone(), labeler.clone());
    let err = iter.next_batch::<B>(&device).err().expect("missing label");
    assert!(matches!(err, SegDatasetError::MissingLabel { .. }));

    let lenient = BatchConfig {
        skip_errors: true,
        ..strict
    };
    let mut iter = BatchIter::new(split, lenient, labeler);
    let batch = iter.next_batch::<B>(&device)?.expect("two labeled samples");
    assert_eq!(batch.len(), 2);
    assert_eq!(iter.skipped(), 1);
    Ok(())
}
