mod dataset_info;
mod detection;
mod inference_device;
mod model_config;
mod model_version;
mod pose_box;
mod pose_result;
mod run_mode;

pub use dataset_info::*;
pub use detection::*;
pub use inference_device::*;
pub use model_config::*;
pub use model_version::*;
pub use pose_box::*;
pub use pose_result::*;
pub use run_mode::*;
