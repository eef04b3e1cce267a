//! Indexing image directories into a (optionally shuffled) file split.

use crate::labels::PathLabelGenerator;
use crate::types::{DatasetResult, SegDatasetError, SplitSummary};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions the image loader accepts, compared case-insensitively.
pub const ALLOWED_FORMATS: &[&str] = &[
    "bmp", "gif", "jpg", "jpeg", "jp2", "pbm", "pgm", "ppm", "pnm", "png", "tif", "tiff", "exr",
    "webp",
];

pub fn is_allowed_format(path: &Path) -> bool {
    has_extension(path, ALLOWED_FORMATS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Collect every file under `root` whose extension is in `extensions`
/// (case-insensitive), sorted by path.
pub fn index_images(
    root: &Path,
    extensions: &[&str],
    recursive: bool,
) -> DatasetResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect(root, extensions, recursive, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect(
    dir: &Path,
    extensions: &[&str],
    recursive: bool,
    out: &mut Vec<PathBuf>,
) -> DatasetResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| SegDatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect(&path, extensions, recursive, out)?;
            }
            continue;
        }
        if has_extension(&path, extensions) {
            out.push(path);
        }
    }
    Ok(())
}

/// The list of training images, in iteration order.
#[derive(Debug, Clone)]
pub struct FileSplit {
    files: Vec<PathBuf>,
}

impl FileSplit {
    /// Index `root` and shuffle once with `seed` (entropy when `None`).
    pub fn new(root: &Path, recursive: bool, shuffle: bool, seed: Option<u64>) -> DatasetResult<Self> {
        let mut files = index_images(root, ALLOWED_FORMATS, recursive)?;
        if files.is_empty() {
            return Err(SegDatasetError::EmptySplit {
                root: root.to_path_buf(),
            });
        }
        if shuffle {
            let mut rng = match seed {
                Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
                None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
            };
            files.shuffle(&mut rng);
        }
        Ok(Self { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Keep only images whose label file exists.
    pub fn retain_labeled(&mut self, labeler: &dyn PathLabelGenerator) {
        self.files
            .retain(|img| labeler.label_path(img).map(|p| p.exists()).unwrap_or(false));
    }
}

pub fn summarize_split(files: &[PathBuf], labeler: &dyn PathLabelGenerator) -> SplitSummary {
    let mut summary = SplitSummary {
        images: files.len(),
        ..Default::default()
    };
    for img in files {
        match labeler.label_path(img) {
            Ok(path) if path.exists() => summary.labeled += 1,
            _ => summary.missing_labels += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_formats_ignore_case() {
        assert!(is_allowed_format(Path::new("a/0.png")));
        assert!(is_allowed_format(Path::new("a/0.PNG")));
        assert!(is_allowed_format(Path::new("a/0.TiF")));
        assert!(!is_allowed_format(Path::new("a/0.txt")));
        assert!(!is_allowed_format(Path::new("a/README")));
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..12 {
            fs::write(tmp.path().join(format!("{i}.png")), b"").unwrap();
        }
        let a = FileSplit::new(tmp.path(), false, true, Some(1234)).unwrap();
        let b = FileSplit::new(tmp.path(), false, true, Some(1234)).unwrap();
        assert_eq!(a.files(), b.files());
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn empty_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        let err = FileSplit::new(tmp.path(), true, false, None).unwrap_err();
        assert!(matches!(err, SegDatasetError::EmptySplit { .. }));
    }

    #[test]
    fn recursion_is_optional() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("top.png"), b"").unwrap();
        fs::write(tmp.path().join("nested/deep.png"), b"").unwrap();
        assert_eq!(index_images(tmp.path(), ALLOWED_FORMATS, false).unwrap().len(), 1);
        assert_eq!(index_images(tmp.path(), ALLOWED_FORMATS, true).unwrap().len(), 2);
    }

    #[test]
    fn extensions_filter_the_index() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.png"), b"").unwrap();
        fs::write(tmp.path().join("b.TIF"), b"").unwrap();
        fs::write(tmp.path().join("c.jpg"), b"").unwrap();
        let found = index_images(tmp.path(), &["png", "tif"], false).unwrap();
        assert_eq!(found, vec![tmp.path().join("a.png"), tmp.path().join("b.TIF")]);
    }
}
