pub mod inference_process;
pub mod ort_detector;
pub mod ort_pose;

pub use inference_process::*;
pub use ort_detector::*;
pub use ort_pose::*;
