//! End-to-end runs against real ONNX models. Set `POSE_DUMP_MODELS` to a directory holding
//! `det.json`, `det.onnx`, `pose.json`, `pose.onnx` and `person.jpg`, and optionally
//! `ORT_DYLIB_PATH` to the ONNX Runtime library. Skipped otherwise.

use std::path::PathBuf;
use std::sync::Once;
use std::time::Instant;
use pose_dump::common::{InferenceDevice, PoseBox};
use pose_dump::driver::read_image;
use pose_dump::{init_runtime, load_detector, load_pose_model, PersonDetector, PoseEstimator};

static ORT_INIT: Once = Once::new();

fn models_dir() -> Option<PathBuf> {
    match std::env::var_os("POSE_DUMP_MODELS") {
        Some(dir) => {
            ORT_INIT.call_once(|| init_runtime(None).unwrap());
            Some(PathBuf::from(dir))
        }
        None => {
            eprintln!("POSE_DUMP_MODELS not set, skipping");
            None
        }
    }
}

#[test]
fn detect_then_estimate_on_cpu() {
    let Some(dir) = models_dir() else { return };

    let mut detector = load_detector(dir.join("det.json"), dir.join("det.onnx"), InferenceDevice::CPU).unwrap();
    let mut pose = load_pose_model(dir.join("pose.json"), dir.join("pose.onnx"), InferenceDevice::CPU).unwrap();
    let image = read_image(&dir.join("person.jpg")).unwrap();

    let now = Instant::now();
    let detections = detector.detect(&image).unwrap();
    assert!(detections.iter().any(|d| d.class_id == 0), "no person in person.jpg");

    let boxes: Vec<PoseBox> = detections.iter().filter(|d| d.class_id == 0).map(|d| d.to_pose_box()).collect();
    let results = pose.estimate(&image, &boxes).unwrap();
    println!("Processing time: {:?}", now.elapsed());

    assert_eq!(results.len(), boxes.len());
    let k = pose.dataset_info().num_keypoints();
    for result in &results {
        assert_eq!(result.keypoints.dim(), (k, 3));
        assert!(result.keypoints.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn warm_up_is_left_out_of_timings() {
    let Some(dir) = models_dir() else { return };

    let detector = load_detector(dir.join("det.json"), dir.join("det.onnx"), InferenceDevice::CPU).unwrap();
    let mut pose = load_pose_model(dir.join("pose.json"), dir.join("pose.onnx"), InferenceDevice::CPU).unwrap();
    assert_eq!(detector.engine().infer_time.n(), 0);
    assert_eq!(pose.engine().infer_time.n(), 0);

    let image = read_image(&dir.join("person.jpg")).unwrap();
    pose.estimate(&image, &[PoseBox::full_frame(image.width(), image.height())]).unwrap();
    assert!(pose.engine().infer_time.n() > 0);
}

#[test]
fn full_frame_pose_stays_near_image() {
    let Some(dir) = models_dir() else { return };

    let mut pose = load_pose_model(dir.join("pose.json"), dir.join("pose.onnx"), InferenceDevice::CPU).unwrap();
    let image = read_image(&dir.join("person.jpg")).unwrap();
    let (w, h) = (image.width() as f32, image.height() as f32);

    let results = pose.estimate(&image, &[PoseBox::full_frame(image.width(), image.height())]).unwrap();
    let first = &results[0];
    // crops are padded, so joints may land slightly outside the frame
    for j in 0..first.num_keypoints() {
        let kp = first.keypoint(j).unwrap();
        assert!(kp.x > -0.5 * w && kp.x < 1.5 * w);
        assert!(kp.y > -0.5 * h && kp.y < 1.5 * h);
    }
}
