use anyhow::{anyhow, Result};
use regex::Regex;
use crate::data::CROSS_MARK;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InferenceDevice {
    #[default] CPU,
    CUDA(usize),
    TensorRT(usize),
    CoreML(usize),
}

// Hardcoded device names. Storing the "proper" spelling and the lowercase version.
const CPU: [&str; 2] = ["CPU","cpu"];
const CUDA: [&str; 2] = ["CUDA","cuda"];
const TENSOR_RT: [&str; 2] = ["TensorRT","tensorrt"];
const CORE_ML: [&str; 2] = ["CoreML","coreml"];

impl InferenceDevice {
    pub fn from_str(device: &str, device_id: usize) -> Option<Self> {
        match device.to_lowercase().as_str() {
            "cpu" => Some(InferenceDevice::CPU),
            "cuda" => Some(InferenceDevice::CUDA(device_id)),
            "tensorrt" => Some(InferenceDevice::TensorRT(device_id)),
            "coreml" => Some(InferenceDevice::CoreML(device_id)),
            _ => None,
        }
    }

    /// Parses a device string of the form `name[:id]`, e.g. `cpu`, `cuda:0` or `TensorRT:1`.
    pub fn parse(device: &str) -> Result<Self> {
        let re = Regex::new(r"^\s*([A-Za-z]+)(?::(\d+))?\s*$")?;
        let caps = re
            .captures(device)
            .ok_or_else(|| anyhow!("{CROSS_MARK} Malformed device string `{device}`, expected `name[:id]`"))?;
        let device_id = match caps.get(2) {
            Some(id) => id.as_str().parse::<usize>()?,
            None => 0,
        };

        Self::from_str(&caps[1], device_id).ok_or_else(|| {
            anyhow!(
                "{CROSS_MARK} Unknown inference device `{device}`. Supported: {:?}",
                Self::all_inference_devices()
            )
        })
    }

    pub fn device_id(&self) -> usize {
        match self {
            InferenceDevice::CPU => 0,
            InferenceDevice::CUDA(id)
            | InferenceDevice::TensorRT(id)
            | InferenceDevice::CoreML(id) => *id,
        }
    }

    pub fn str(&self) -> &'static str {
        match self {
            InferenceDevice::CPU => CPU[0],
            InferenceDevice::CUDA(_) => CUDA[0],
            InferenceDevice::TensorRT(_) => TENSOR_RT[0],
            InferenceDevice::CoreML(_) => CORE_ML[0],
        }
    }

    pub fn str_lowercase(&self) -> &'static str {
        match self {
            InferenceDevice::CPU => CPU[1],
            InferenceDevice::CUDA(_) => CUDA[1],
            InferenceDevice::TensorRT(_) => TENSOR_RT[1],
            InferenceDevice::CoreML(_) => CORE_ML[1],
        }
    }

    pub fn all_inference_devices() -> Vec<String> {
        vec![
            InferenceDevice::CPU.str_lowercase().to_string(),
            InferenceDevice::CUDA(0).str_lowercase().to_string(),
            InferenceDevice::TensorRT(0).str_lowercase().to_string(),
            InferenceDevice::CoreML(0).str_lowercase().to_string(),
        ]
    }
}

impl std::fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceDevice::CPU => write!(f, "{}", self.str_lowercase()),
            _ => write!(f, "{}:{}", self.str_lowercase(), self.device_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_strings() {
        assert_eq!(InferenceDevice::parse("cpu").unwrap(), InferenceDevice::CPU);
        assert_eq!(InferenceDevice::parse("cuda").unwrap(), InferenceDevice::CUDA(0));
        assert_eq!(InferenceDevice::parse("CUDA:1").unwrap(), InferenceDevice::CUDA(1));
        assert_eq!(InferenceDevice::parse("tensorrt:2").unwrap(), InferenceDevice::TensorRT(2));
        assert_eq!(InferenceDevice::parse("CoreML").unwrap(), InferenceDevice::CoreML(0));
    }

    #[test]
    fn rejects_unknown_devices() {
        assert!(InferenceDevice::parse("rocm:0").is_err());
        assert!(InferenceDevice::parse("cuda:").is_err());
        assert!(InferenceDevice::parse("").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for device in [InferenceDevice::CPU, InferenceDevice::CUDA(3), InferenceDevice::TensorRT(1)] {
            assert_eq!(InferenceDevice::parse(&device.to_string()).unwrap(), device);
        }
    }
}
