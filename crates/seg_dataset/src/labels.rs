//! Mapping training images to their mask files.

use crate::types::{DatasetResult, SegDatasetError};
use std::path::{Path, PathBuf};

/// Resolves the label (mask) file that belongs to an image.
pub trait PathLabelGenerator: Send + Sync {
    fn label_path(&self, image: &Path) -> DatasetResult<PathBuf>;
}

/// `<dataset>/image/<name>` -> `<dataset>/label/<name>`.
///
/// The image's parent directory must be named `image_dir`; the mask keeps the
/// same file name inside the sibling `label_dir`.
#[derive(Debug, Clone)]
pub struct UnetPathLabelGenerator {
    pub image_dir: String,
    pub label_dir: String,
}

impl Default for UnetPathLabelGenerator {
    fn default() -> Self {
        Self {
            image_dir: "image".to_string(),
            label_dir: "label".to_string(),
        }
    }
}

impl UnetPathLabelGenerator {
    pub fn new(image_dir: impl Into<String>, label_dir: impl Into<String>) -> Self {
        Self {
            image_dir: image_dir.into(),
            label_dir: label_dir.into(),
        }
    }
}

impl PathLabelGenerator for UnetPathLabelGenerator {
    fn label_path(&self, image: &Path) -> DatasetResult<PathBuf> {
        let err = |msg: String| SegDatasetError::LabelPath {
            image: image.to_path_buf(),
            msg,
        };
        let file_name = image
            .file_name()
            .ok_or_else(|| err("path has no file name".to_string()))?;
        let parent = image
            .parent()
            .ok_or_else(|| err("path has no parent directory".to_string()))?;
        let parent_name = parent.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if parent_name != self.image_dir {
            return Err(err(format!(
                "parent directory '{parent_name}' is not '{}'",
                self.image_dir
            )));
        }
        let dataset_root = parent.parent().unwrap_or_else(|| Path::new(""));
        Ok(dataset_root.join(&self.label_dir).join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_image_dir_for_label_dir() {
        let gen = UnetPathLabelGenerator::default();
        let label = gen
            .label_path(Path::new("/data/membrane/train/image/7.png"))
            .unwrap();
        assert_eq!(label, PathBuf::from("/data/membrane/train/label/7.png"));
    }

    #[test]
    fn custom_directory_names() {
        let gen = UnetPathLabelGenerator::new("aug_img", "aug_mask");
        let label = gen.label_path(Path::new("aug/aug_img/img_0_1.png")).unwrap();
        assert_eq!(label, PathBuf::from("aug/aug_mask/img_0_1.png"));
    }

    #[test]
    fn rejects_images_outside_image_dir() {
        let gen = UnetPathLabelGenerator::default();
        let err = gen
            .label_path(Path::new("/data/membrane/test/0.png"))
            .unwrap_err();
        assert!(matches!(err, SegDatasetError::LabelPath { .. }));
    }
}
