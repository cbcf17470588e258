use std::time::Instant;
use anyhow::Result;
use image::RgbImage;
use crate::common::{DatasetInfo, Detection, PoseBox, PoseResult};
use crate::data::Xs;
use crate::utils;

/// The three stages every ONNX-backed model goes through.
pub trait InferenceProcess {
    type Input<'a>;
    /// Whatever preprocessing computed that postprocessing needs to map outputs back.
    type Meta;
    type Output;

    /// Pre-process the input data.
    fn preprocess(&self, x: Self::Input<'_>) -> Result<(Xs, Self::Meta)>;

    /// Executes the model on the preprocessed data.
    fn inference(&mut self, xs: Xs) -> Result<Xs>;

    /// Post-process the model's output.
    fn postprocess(&self, ys: Xs, meta: Self::Meta) -> Result<Self::Output>;

    /// Executes the full pipeline.
    fn run(&mut self, x: Self::Input<'_>) -> Result<Self::Output> {
        let (xs, meta) = self.preprocess(x)?;
        let ys = self.inference(xs)?;
        self.postprocess(ys, meta)
    }

    /// Executes the full pipeline, tracing each stage.
    fn forward(&mut self, x: Self::Input<'_>, profile: bool) -> Result<Self::Output> {
        let detect_time = Instant::now();

        let t_pre = Instant::now();
        let (xs, meta) = self.preprocess(x)?;
        let t_pre = t_pre.elapsed();

        let mut _detect_elapsed = detect_time.elapsed();
        _detect_elapsed = utils::trace("TIME", "Preprocessing input", detect_time, _detect_elapsed);

        let t_exe = Instant::now();
        let ys = self.inference(xs)?;
        let t_exe = t_exe.elapsed();

        _detect_elapsed = utils::trace("TIME", "Model run", detect_time, _detect_elapsed);

        let t_post = Instant::now();
        let ys = self.postprocess(ys, meta)?;
        let t_post = t_post.elapsed();

        utils::trace("TIME", "Postprocessing", detect_time, _detect_elapsed);

        if profile {
            log::info!("> Preprocess: {t_pre:?} | Inference: {t_exe:?} | Postprocess: {t_post:?}");
        }

        Ok(ys)
    }
}

/// Produces candidate boxes for an image, in image pixel coordinates.
pub trait PersonDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Estimates one keypoint set per input box, in input order.
pub trait PoseEstimator {
    fn dataset_info(&self) -> &DatasetInfo;

    fn estimate(&mut self, image: &RgbImage, boxes: &[PoseBox]) -> Result<Vec<PoseResult>>;
}
