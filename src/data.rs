mod config_ort;
mod time_calc;

pub use config_ort::ConfigOrt;
pub use time_calc::TimeCalc;

pub use crate::detection_runners::ort_detector::input_wrapper::{X, Xs};
pub use crate::detection_runners::ort_detector::y::Y;

pub(crate) const CROSS_MARK: &str = "❌";
