use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use crate::common::{DatasetInfo, ModelVersion};
use crate::utils;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model config `{}`", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse model config `{}`", path.display()))
}

/// Person detector description, read from a JSON config file next to the ONNX checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_version: ModelVersion,
    pub input_width: u32,
    pub input_height: u32,
    pub num_classes: usize,
    pub names: Option<Vec<String>>,
    /// One label per line; resolved relative to the config file.
    pub labels_path: Option<PathBuf>,
    pub iou: f32,
    pub conf: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_version: ModelVersion::YoloV8,
            input_width: 640,
            input_height: 640,
            num_classes: 80, // Default COCO class number
            names: None,
            labels_path: None,
            iou: 0.45,
            conf: 0.25,
        }
    }
}

impl DetectorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = read_json(path)?;

        if config.names.is_none() {
            if let Some(labels_path) = &config.labels_path {
                let labels_path = match path.parent() {
                    Some(dir) if labels_path.is_relative() => dir.join(labels_path),
                    _ => labels_path.clone(),
                };
                let names = utils::file_to_vec(&labels_path)
                    .with_context(|| format!("Failed to read labels file `{}`", labels_path.display()))?;
                config.names = Some(names);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            bail!("Detector input size must be non-zero, got {}x{}", self.input_width, self.input_height);
        }
        if let Some(names) = &self.names {
            if names.len() != self.num_classes {
                bail!(
                    "The lengths of class names: {} and num_classes: {} do not match.",
                    names.len(),
                    self.num_classes,
                );
            }
        }
        Ok(())
    }

    /// Class names, falling back to `# i` placeholders.
    pub fn class_names(&self) -> Vec<String> {
        match &self.names {
            Some(names) => names.clone(),
            None => (0..self.num_classes).map(|x| format!("# {}", x)).collect(),
        }
    }
}

/// Heatmap decoding strategy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostProcess {
    /// Plain argmax.
    None,
    /// Argmax shifted a quarter pixel toward the higher neighbour.
    #[default]
    Default,
    /// Distribution-aware refinement: Gaussian blur, log, second-order Taylor step.
    Unbiased,
}

/// Top-down pose model description, read from a JSON config file next to the ONNX checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub bbox_padding: f32,
    pub flip_test: bool,
    pub shift_heatmap: bool,
    pub post_process: PostProcess,
    pub blur_kernel: usize,
    pub dataset: String,
    pub dataset_info: Option<DatasetInfo>,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            input_width: 192,
            input_height: 256,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            bbox_padding: 1.25,
            flip_test: true,
            shift_heatmap: true,
            post_process: PostProcess::Default,
            blur_kernel: 11,
            dataset: "TopDownCocoDataset".to_string(),
            dataset_info: None,
        }
    }
}

impl PoseConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            bail!("Pose input size must be non-zero, got {}x{}", self.input_width, self.input_height);
        }
        if self.std.iter().any(|&s| s == 0.) {
            bail!("Pose normalisation std must be non-zero, got {:?}", self.std);
        }
        if self.bbox_padding <= 0. {
            bail!("bbox_padding must be positive, got {}", self.bbox_padding);
        }
        if self.post_process == PostProcess::Unbiased && self.blur_kernel % 2 == 0 {
            bail!("blur_kernel must be odd, got {}", self.blur_kernel);
        }
        if let Some(info) = &self.dataset_info {
            info.validate()?;
        }
        Ok(())
    }

    /// Width over height of the network input.
    pub fn aspect_ratio(&self) -> f32 {
        self.input_width as f32 / self.input_height as f32
    }

    /// The configured dataset info, or COCO when the config carries none.
    pub fn resolve_dataset_info(&self) -> DatasetInfo {
        match &self.dataset_info {
            Some(info) => info.clone(),
            None => {
                log::warn!(
                    "No `dataset_info` in the pose config for dataset `{}`, assuming the COCO keypoint convention",
                    self.dataset
                );
                DatasetInfo::coco()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_config_defaults_fill_missing_fields() {
        let config: PoseConfig = serde_json::from_str(r#"{"input_width": 288, "input_height": 384}"#).unwrap();
        assert_eq!(config.input_width, 288);
        assert_eq!(config.bbox_padding, 1.25);
        assert!(config.flip_test);
        assert_eq!(config.post_process, PostProcess::Default);
        assert!((config.aspect_ratio() - 0.75).abs() < 1e-6);
        assert_eq!(config.resolve_dataset_info().num_keypoints(), 17);
    }

    #[test]
    fn unbiased_requires_odd_kernel() {
        let config = PoseConfig {
            post_process: PostProcess::Unbiased,
            blur_kernel: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn detector_names_must_match_class_count() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"model_version": "yolov5", "num_classes": 2, "names": ["person"]}"#).unwrap();
        assert_eq!(config.model_version, ModelVersion::YoloV5);
        assert!(config.validate().is_err());
        assert_eq!(DetectorConfig::default().class_names()[3], "# 3");
    }

    #[test]
    fn detector_labels_resolve_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("labels.txt"), "person\nbicycle\n").unwrap();
        let config_path = dir.path().join("det.json");
        std::fs::write(&config_path, r#"{"num_classes": 2, "labels_path": "labels.txt"}"#).unwrap();

        let config = DetectorConfig::from_file(&config_path).unwrap();
        assert_eq!(config.class_names(), vec!["person".to_string(), "bicycle".to_string()]);
    }
}
