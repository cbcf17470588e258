//! File/code adapted from https://github.com/jamjamjon/usls
//!
//! Options for building ONNX Runtime sessions.

use std::path::Path;
use anyhow::{bail, Result};
use crate::common::InferenceDevice;
use crate::data::CROSS_MARK;

#[derive(Debug, Clone)]
pub struct ConfigOrt {
    pub onnx_path: String,
    pub input_name: String,
    pub device: InferenceDevice,
    pub batch_size: usize,
    pub model_width: u32,
    pub model_height: u32,
    pub profile: bool,

    // trt related
    pub trt_engine_cache_enable: bool,
    pub trt_fp16_enable: bool,
}

impl Default for ConfigOrt {
    fn default() -> Self {
        Self {
            onnx_path: String::new(),
            input_name: "images".to_string(),
            device: InferenceDevice::CPU,
            profile: false,
            batch_size: 1,
            model_height: 640,
            model_width: 640,

            trt_engine_cache_enable: true,
            trt_fp16_enable: false,
        }
    }
}

impl ConfigOrt {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the checkpoint path; the file must exist.
    pub fn with_model<P: AsRef<Path>>(mut self, onnx_path: P) -> Result<Self> {
        let onnx_path = onnx_path.as_ref();
        if !onnx_path.is_file() {
            bail!("{CROSS_MARK} Model checkpoint `{}` does not exist or is not a file", onnx_path.display());
        }
        self.onnx_path = onnx_path.to_string_lossy().into_owned();
        Ok(self)
    }

    /// Name of the image input, used for TensorRT optimisation profiles.
    pub fn with_input_name(mut self, name: &str) -> Self {
        self.input_name = name.to_string();
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_model_width(mut self, n: u32) -> Self {
        self.model_width = n;
        self
    }

    pub fn with_model_height(mut self, n: u32) -> Self {
        self.model_height = n;
        self
    }

    pub fn with_device(mut self, device_type: InferenceDevice) -> Self {
        self.device = device_type;
        self
    }

    pub fn with_trt_fp16(mut self, x: bool) -> Self {
        self.trt_fp16_enable = x;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }
}
