use std::path::PathBuf;
use clap::Parser;
use pose_dump::common::RunMode;
use pose_dump::ExportConfig;

/// Runs a person detector and a top-down pose model over a set of images and saves the
/// keypoints of each image as a `.npy` file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Detector config file (JSON)
    #[arg(value_name = "DET_CONFIG")]
    pub det_config: PathBuf,

    /// Detector checkpoint (ONNX)
    #[arg(value_name = "DET_CHECKPOINT")]
    pub det_checkpoint: PathBuf,

    /// Pose model config file (JSON)
    #[arg(value_name = "POSE_CONFIG")]
    pub pose_config: PathBuf,

    /// Pose model checkpoint (ONNX)
    #[arg(value_name = "POSE_CHECKPOINT")]
    pub pose_checkpoint: PathBuf,

    /// Image root directory; outputs mirror paths relative to it [default: working directory]
    #[arg(long, value_name = "DIR")]
    pub img_root: Option<PathBuf>,

    /// Glob pattern, relative to the image root
    #[arg(long, default_value = "*/*/*/*.jpg", value_name = "GLOB")]
    pub pattern: String,

    /// Single image file, used instead of the glob
    #[arg(long, value_name = "FILE")]
    pub img: Option<PathBuf>,

    /// Show rendered results (accepted, rendering is not available)
    #[arg(long, default_value_t = false)]
    pub show: bool,

    /// Root for rendered images (accepted, rendering is not available)
    #[arg(long, value_name = "DIR")]
    pub out_img_root: Option<PathBuf>,

    /// Inference device: cpu, cuda[:N], tensorrt[:N], coreml
    #[arg(long, default_value = "cuda:0", value_name = "DEVICE")]
    pub device: String,

    /// Category id of the person class in the detector (1-based)
    #[arg(long, default_value_t = 1)]
    pub det_cat_id: usize,

    /// Bounding box score threshold
    #[arg(long, default_value_t = 0.3, value_name = "THRESHOLD")]
    pub bbox_thr: f32,

    /// Keypoint score threshold
    #[arg(long, default_value_t = 0.3, value_name = "THRESHOLD")]
    pub kpt_thr: f32,

    /// Keypoint radius for rendering
    #[arg(long, default_value_t = 4)]
    pub radius: u32,

    /// Link thickness for rendering
    #[arg(long, default_value_t = 1)]
    pub thickness: u32,

    /// What to run
    #[arg(long, value_enum, default_value_t = RunMode::FullFrame)]
    pub mode: RunMode,

    /// Output root for `.npy` keypoint files
    #[arg(long, default_value = "npy_out", value_name = "DIR")]
    pub npy_out: PathBuf,

    /// Trace report written in export-trace mode
    #[arg(long, default_value = "pose_trace.json", value_name = "FILE")]
    pub trace_out: PathBuf,

    /// ONNX Runtime shared library to load
    #[arg(long, value_name = "FILE")]
    pub ort_lib: Option<String>,
}

impl Args {
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            img_root: self.img_root.clone().unwrap_or_default(),
            out_root: self.npy_out.clone(),
            mode: self.mode,
            det_cat_id: self.det_cat_id,
            bbox_thr: self.bbox_thr,
            kpt_thr: self.kpt_thr,
        }
    }

    pub fn wants_rendering(&self) -> bool {
        self.show || self.out_img_root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["pose-dump", "d.json", "d.onnx", "p.json", "p.onnx"]).unwrap();
        assert_eq!(args.device, "cuda:0");
        assert_eq!(args.pattern, "*/*/*/*.jpg");
        assert_eq!(args.mode, RunMode::FullFrame);
        assert_eq!(args.npy_out, PathBuf::from("npy_out"));
        assert_eq!((args.det_cat_id, args.radius, args.thickness), (1, 4, 1));
        assert!(!args.wants_rendering());
        assert_eq!(args.img_root, None);
        assert_eq!(args.export_config().img_root, PathBuf::new());
    }

    #[test]
    fn mode_and_thresholds_parse() {
        let args = Args::try_parse_from([
            "pose-dump", "d.json", "d.onnx", "p.json", "p.onnx",
            "--mode", "detect", "--bbox-thr", "0.5", "--img-root", "data", "--show",
        ])
        .unwrap();
        let config = args.export_config();
        assert_eq!(config.mode, RunMode::Detect);
        assert_eq!(config.bbox_thr, 0.5);
        assert_eq!(config.img_root, PathBuf::from("data"));
        assert!(args.wants_rendering());
    }
}
