//! File/code adapted from https://github.com/jamjamjon/usls

use std::time::Instant;
use anyhow::{anyhow, bail, Result};
use half::{bf16, f16};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{ExecutionProvider,
                          CPUExecutionProvider,
                          CUDAExecutionProvider,
                          TensorRTExecutionProvider,
                          CoreMLExecutionProvider},
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::{Session, SessionInputValue},
    tensor::TensorElementType,
    value::{DynValue, Value},
};
use crate::common::InferenceDevice;
use crate::data::{ConfigOrt, TimeCalc, Xs, X, CROSS_MARK};

/// ONNX Runtime tensor attributes: names and element types, in session order.
#[derive(Debug, Clone, Default)]
pub struct OrtTensorAttr {
    pub names: Vec<String>,
    pub dtypes: Vec<TensorElementType>,
}

impl OrtTensorAttr {
    fn from_io<'a>(io: impl Iterator<Item = (&'a str, Option<TensorElementType>)>) -> Result<Self> {
        let mut attrs = Self::default();
        for (name, dtype) in io {
            let dtype = dtype.ok_or_else(|| anyhow!("{CROSS_MARK} `{name}` is not a tensor, only tensor I/O is supported"))?;
            attrs.names.push(name.to_string());
            attrs.dtypes.push(dtype);
        }
        Ok(attrs)
    }
}

/// ONNXRuntime Backend
#[derive(Debug)]
pub struct OrtEngine {
    session: Session,
    onnx_path: String,
    device: InferenceDevice,
    inputs_attrs: OrtTensorAttr,
    outputs_attrs: OrtTensorAttr,
    batch: usize,
    model_width: u32,
    model_height: u32,
    profile: bool,
    pub infer_time: TimeCalc,
}

impl OrtEngine {
    pub fn new(config: &ConfigOrt) -> Result<Self> {
        let mut builder = Session::builder()?;

        let mut device = config.device.to_owned();
        match device {
            InferenceDevice::TensorRT(device_id) => {
                Self::build_trt(config, &mut builder, device_id)?;
            }
            InferenceDevice::CUDA(device_id) => {
                Self::build_cuda(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CoreML(_) => Self::build_coreml(&mut builder).unwrap_or_else(|err| {
                log::warn!("{err}, Using cpu");
                device = InferenceDevice::CPU;
            }),
            InferenceDevice::CPU => {
                Self::build_cpu(&mut builder)?;
            }
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.onnx_path)
            .map_err(|err| anyhow!("{CROSS_MARK} Failed to load ONNX model `{}`: {err}", config.onnx_path))?;

        let inputs_attrs = OrtTensorAttr::from_io(
            session.inputs.iter().map(|x| (x.name.as_str(), x.input_type.tensor_type())),
        )?;
        let outputs_attrs = OrtTensorAttr::from_io(
            session.outputs.iter().map(|x| (x.name.as_str(), x.output_type.tensor_type())),
        )?;
        if inputs_attrs.names.is_empty() || outputs_attrs.names.is_empty() {
            bail!("{CROSS_MARK} Model `{}` must have at least one input and one output", config.onnx_path);
        }

        log::info!(
            "Backend: ONNXRuntime | Model: {} | Device: {} | Inputs: {:?} | Outputs: {:?}",
            config.onnx_path,
            device,
            inputs_attrs.names,
            outputs_attrs.names,
        );

        Ok(Self {
            session,
            onnx_path: config.onnx_path.to_owned(),
            device,
            inputs_attrs,
            outputs_attrs,
            batch: config.batch_size,
            model_width: config.model_width,
            model_height: config.model_height,
            profile: config.profile,
            infer_time: TimeCalc::default(),
        })
    }

    fn build_trt(config: &ConfigOrt, builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        // static profile matching the configured model input
        let shape = format!(
            "{}x3x{}x{}",
            config.batch_size, config.model_height, config.model_width
        );
        let profile_shape = format!("{}:{shape}", config.input_name);
        let trt = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_fp16(config.trt_fp16_enable)
            .with_engine_cache(config.trt_engine_cache_enable)
            .with_engine_cache_path("trt-cache")
            .with_timing_cache(false)
            .with_profile_min_shapes(profile_shape.clone())
            .with_profile_opt_shapes(profile_shape.clone())
            .with_profile_max_shapes(profile_shape);
        if trt.is_available()? {
            match trt.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} TensorRT initialization failed: {:?}", err) }
            }
            log::info!("🐢 Initial model serialization with TensorRT may takes some time...");
            Ok(())
        } else {
            bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32);
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} CUDA initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_coreml(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CoreMLExecutionProvider::default()
            .with_subgraphs(false);
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} CoreML initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            bail!("{CROSS_MARK} CoreML execution provider not available")
        }
    }

    fn build_cpu(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} CPU initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn tensor_preprocess(x: X, dtype: &TensorElementType) -> Result<DynValue> {
        let x = match dtype {
            TensorElementType::Float32 => Value::from_array(x.into_inner())?.into_dyn(),
            TensorElementType::Float64 => Value::from_array(x.mapv(|x_| x_ as f64))?.into_dyn(),
            TensorElementType::Float16 => Value::from_array(x.mapv(f16::from_f32))?.into_dyn(),
            TensorElementType::Bfloat16 => Value::from_array(x.mapv(bf16::from_f32))?.into_dyn(),
            TensorElementType::Int8 => Value::from_array(x.mapv(|x_| x_ as i8))?.into_dyn(),
            TensorElementType::Int32 => Value::from_array(x.mapv(|x_| x_ as i32))?.into_dyn(),
            TensorElementType::Int64 => Value::from_array(x.mapv(|x_| x_ as i64))?.into_dyn(),
            TensorElementType::Uint8 => Value::from_array(x.mapv(|x_| x_ as u8))?.into_dyn(),
            _ => bail!("{CROSS_MARK} Unsupported model input type: {:?}", dtype),
        };
        Ok(x)
    }

    fn tensor_postprocess(x: &DynValue, dtype: &TensorElementType) -> Result<Array<f32, IxDyn>> {
        fn _extract_and_convert<T>(x: &DynValue, map_fn: impl Fn(T) -> f32) -> Result<Array<f32, IxDyn>>
        where
            T: Clone + 'static + ort::tensor::PrimitiveTensorElementType,
        {
            // for version 2.0.0-rc.10 of ORT
            let x = x.try_extract_array::<T>()?;
            Ok(x.mapv(map_fn))
        }
        match dtype {
            TensorElementType::Float32 => _extract_and_convert::<f32>(x, |x| x),
            TensorElementType::Float16 => _extract_and_convert::<f16>(x, f16::to_f32),
            TensorElementType::Bfloat16 => _extract_and_convert::<bf16>(x, bf16::to_f32),
            TensorElementType::Float64 => _extract_and_convert::<f64>(x, |x| x as f32),
            TensorElementType::Int64 => _extract_and_convert::<i64>(x, |x| x as f32),
            TensorElementType::Int32 => _extract_and_convert::<i32>(x, |x| x as f32),
            TensorElementType::Int8 => _extract_and_convert::<i8>(x, |x| x as f32),
            TensorElementType::Uint8 => _extract_and_convert::<u8>(x, |x| x as f32),
            _ => Err(anyhow!("{CROSS_MARK} Unsupported ort tensor type: {:?}", dtype)),
        }
    }

    /// Runs one forward pass. Inputs are matched to model inputs by position and cast to the
    /// element type each input declares; every output comes back as `f32`, keyed by output name.
    pub fn engine_run(&mut self, xs: Xs) -> Result<Xs> {
        if xs.len() != self.inputs_attrs.names.len() {
            bail!(
                "{CROSS_MARK} Model `{}` expects {} input(s), got {}",
                self.onnx_path,
                self.inputs_attrs.names.len(),
                xs.len()
            );
        }

        // alignment
        let t_pre = Instant::now();
        let mut xs_ = Vec::with_capacity(xs.len());
        for (dtype, x) in self.inputs_attrs.dtypes.iter().zip(xs.into_iter()) {
            xs_.push(Into::<SessionInputValue<'_>>::into(Self::tensor_preprocess(
                x, dtype,
            )?));
        }
        let t_pre = t_pre.elapsed();

        // run
        let t_run = Instant::now();
        let onnx_path = &self.onnx_path;
        let outputs = self
            .session
            .run(&xs_[..])
            .map_err(|err| anyhow!("{CROSS_MARK} Inference failed for `{onnx_path}`: {err}"))?;
        let t_run = t_run.elapsed();

        // extract
        let t_post = Instant::now();
        let mut ys = Xs::new();
        for (dtype, name) in self.outputs_attrs.dtypes.iter().zip(self.outputs_attrs.names.iter()) {
            let y = Self::tensor_postprocess(&outputs[name.as_str()], dtype)?;
            ys.push_kv(name.as_str(), X::from(y))?;
        }
        drop(outputs);
        let t_post = t_post.elapsed();

        self.infer_time.add_or_push(0, t_pre);
        self.infer_time.add_or_push(1, t_run);
        self.infer_time.add_or_push(2, t_post);

        if self.profile {
            log::info!(
                "[Profile] {:.2?} | alignment: {:.2?} | inference: {:.2?} | to_f32: {:.2?} | avg: {:.2?}",
                t_pre + t_run + t_post,
                t_pre,
                t_run,
                t_post,
                self.infer_time.avg(),
            );
        }

        Ok(ys)
    }

    /// Runs the model once on a zero image batch of the configured geometry.
    pub fn dry_run(&mut self) -> Result<Xs> {
        let x = X::zeros(&[
            self.batch,
            3,
            self.model_height as usize,
            self.model_width as usize,
        ]);
        self.engine_run(Xs::from(x))
    }

    /// Dry run whose timings are left out of the averages.
    pub fn warm_up(&mut self) -> Result<()> {
        self.dry_run()?;
        self.infer_time.clear();
        Ok(())
    }

    pub fn onnx_path(&self) -> &str {
        &self.onnx_path
    }

    pub fn out_names(&self) -> &Vec<String> {
        &self.outputs_attrs.names
    }

    pub fn out_dtypes(&self) -> &Vec<TensorElementType> {
        &self.outputs_attrs.dtypes
    }

    pub fn in_names(&self) -> &Vec<String> {
        &self.inputs_attrs.names
    }

    pub fn in_dtypes(&self) -> &Vec<TensorElementType> {
        &self.inputs_attrs.dtypes
    }

    pub fn device(&self) -> &InferenceDevice {
        &self.device
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn model_width(&self) -> u32 { self.model_width }

    pub fn model_height(&self) -> u32 { self.model_height }
}
