mod utils;
pub mod data;
pub mod detection_runners;
pub mod common;
pub mod driver;
pub mod export;
pub mod images;

use std::path::Path;
use anyhow::anyhow;
use crate::common::{DetectorConfig, InferenceDevice, PoseConfig};
use crate::data::ConfigOrt;
use crate::detection_runners::{OrtTopDown, OrtYOLO};

pub use crate::detection_runners::{InferenceProcess, PersonDetector, PoseEstimator};
pub use crate::driver::{Driver, ExportConfig, ExportSummary};

/// Sets up the ONNX Runtime environment, from `ort_lib` when given, otherwise from the
/// library ONNX Runtime finds on its own (`ORT_DYLIB_PATH`). Call once, before loading models.
pub fn init_runtime(ort_lib: Option<&str>) -> anyhow::Result<()> {
    let ort_init = match ort_lib {
        Some(path) => {
            log::info!("Loading ONNX Runtime from {path}");
            ort::init_from(path)
        }
        None => ort::init(),
    };

    match ort_init.commit() {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow!("Failed to commit ORT: {:?}", e)),
    }
}

/// Loads the person detector described by `config` with weights from `checkpoint`.
pub fn load_detector<P: AsRef<Path>, Q: AsRef<Path>>(
    config: P,
    checkpoint: Q,
    device: InferenceDevice,
) -> anyhow::Result<OrtYOLO> {
    let det_config = DetectorConfig::from_file(config)?;
    let ort_options = ConfigOrt::new()
        .with_model(checkpoint)?
        .with_input_name("images")
        .with_device(device)
        .with_trt_fp16(false)
        .with_profile(false);

    log::info!("Initializing detector ORT session with ({}) execution provider", device);
    let mut yolo = OrtYOLO::new(det_config, ort_options)?;
    // surfaces an input geometry the model rejects before any image is read
    yolo.engine_mut().warm_up()?;
    Ok(yolo)
}

/// Loads the top-down pose model described by `config` with weights from `checkpoint`.
pub fn load_pose_model<P: AsRef<Path>, Q: AsRef<Path>>(
    config: P,
    checkpoint: Q,
    device: InferenceDevice,
) -> anyhow::Result<OrtTopDown> {
    let pose_config = PoseConfig::from_file(config)?;
    let ort_options = ConfigOrt::new()
        .with_model(checkpoint)?
        .with_input_name("input")
        .with_device(device)
        .with_trt_fp16(false)
        .with_profile(false);

    log::info!("Initializing pose ORT session with ({}) execution provider", device);
    let mut pose = OrtTopDown::new(pose_config, ort_options)?;
    pose.engine_mut().warm_up()?;
    Ok(pose)
}
