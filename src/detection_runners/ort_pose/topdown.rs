use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use anyhow::{bail, Context, Result};
use image::{imageops, RgbImage};
use ndarray::{Array3, Axis, Ix3};
use serde::Serialize;

use crate::common::{DatasetInfo, PoseBox, PoseConfig, PoseResult};
use crate::data::{ConfigOrt, Xs};
use crate::detection_runners::inference_process::{InferenceProcess, PoseEstimator};
use crate::detection_runners::ort_detector::{image_ops, OrtEngine};
use super::affine::{warp_crop, CenterScale};
use super::heatmap;

const FLIP_SUFFIX: &str = "_flip";

/// Boxes and their crop geometry, in the order they were submitted.
#[derive(Debug, Clone)]
pub struct CropMeta {
    pub boxes: Vec<PoseBox>,
    pub crops: Vec<CenterScale>,
}

/// One tensor seen while tracing the pose model.
#[derive(Debug, Clone, Serialize)]
pub struct TraceTensor {
    pub name: String,
    pub dtype: String,
    pub shape: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f32>,
}

/// Written by export-trace mode.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub model: String,
    pub device: String,
    pub dataset: String,
    pub num_keypoints: usize,
    pub inputs: Vec<TraceTensor>,
    pub outputs: Vec<TraceTensor>,
}

/// Top-down keypoint estimator: one affine crop per person box, heatmap decode back to the image.
#[derive(Debug)]
pub struct OrtTopDown {
    engine: OrtEngine,
    config: PoseConfig,
    dataset_info: DatasetInfo,
    profile: bool,
}

impl OrtTopDown {
    pub fn new(config: PoseConfig, options: ConfigOrt) -> Result<Self> {
        // one crop per run, whatever the number of boxes
        let options = options
            .with_batch_size(1)
            .with_model_width(config.input_width)
            .with_model_height(config.input_height);
        let profile = options.profile;
        let dataset_info = config.resolve_dataset_info();
        dataset_info.validate()?;
        let engine = OrtEngine::new(&options)?;

        log::info!(
            "Pose input: {}x{} | Dataset: {} ({} keypoints) | flip_test: {} | post_process: {:?}",
            config.input_width,
            config.input_height,
            dataset_info.dataset_name,
            dataset_info.num_keypoints(),
            config.flip_test,
            config.post_process,
        );

        Ok(Self {
            engine,
            config,
            dataset_info,
            profile,
        })
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    pub fn engine(&self) -> &OrtEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut OrtEngine {
        &mut self.engine
    }

    pub fn print_time(&self) {
        log::info!("Pose avg: {:?}", self.engine.infer_time.avg());
    }

    /// Runs the model once on a zero input of its configured shape and writes what it saw to `path`.
    pub fn export_trace<P: AsRef<Path>>(&mut self, path: P) -> Result<TraceReport> {
        let path = path.as_ref();
        let ys = self.engine.dry_run()?;

        let inputs = self
            .engine
            .in_names()
            .iter()
            .zip(self.engine.in_dtypes())
            .map(|(name, dtype)| TraceTensor {
                name: name.clone(),
                dtype: format!("{dtype:?}"),
                shape: vec![
                    self.engine.batch(),
                    3,
                    self.config.input_height as usize,
                    self.config.input_width as usize,
                ],
                mean: None,
            })
            .collect();
        let outputs = ys
            .iter()
            .zip(self.engine.out_dtypes())
            .map(|((name, y), dtype)| TraceTensor {
                name: name.to_string(),
                dtype: format!("{dtype:?}"),
                shape: y.shape().to_vec(),
                mean: y.mean(),
            })
            .collect();

        let report = TraceReport {
            model: self.engine.onnx_path().to_string(),
            device: self.engine.device().to_string(),
            dataset: self.dataset_info.dataset_name.clone(),
            num_keypoints: self.dataset_info.num_keypoints(),
            inputs,
            outputs,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create `{}`", dir.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create trace file `{}`", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .with_context(|| format!("Failed to write trace file `{}`", path.display()))?;
        log::info!("Pose trace written to {}", path.display());

        Ok(report)
    }

    fn crop_tensor(&self, crop: &RgbImage) -> Result<crate::data::X> {
        image_ops::nchw_normalize(
            crop.as_raw(),
            crop.width(),
            crop.height(),
            self.config.mean,
            self.config.std,
        )
    }
}

/// Heatmaps `[K, H, W]` of the first batch item under `key`.
fn heatmaps_of(ys: &Xs, key: &str, dataset_info: &DatasetInfo) -> Result<Array3<f32>> {
    let y = ys
        .get(key)
        .with_context(|| format!("No heatmaps produced for crop `{key}`"))?;
    if y.ndim() != 4 || y.shape()[0] == 0 {
        bail!("Pose output must be [batch, keypoints, height, width], got {:?}", y.shape());
    }
    let k = y.shape()[1];
    if k != dataset_info.num_keypoints() {
        bail!(
            "Pose model produced {} heatmaps, dataset `{}` has {} keypoints",
            k,
            dataset_info.dataset_name,
            dataset_info.num_keypoints()
        );
    }
    Ok(y.index_axis(Axis(0), 0).to_owned().into_dimensionality::<Ix3>()?)
}

/// Decodes per-crop heatmaps into one result per box, in box order. Crop `i` is keyed `"i"`;
/// with flip test its mirrored pass is keyed `"i_flip"` and is flipped back, optionally shifted,
/// and averaged in before decoding.
pub fn decode_crops(ys: &Xs, meta: &CropMeta, config: &PoseConfig, dataset_info: &DatasetInfo) -> Result<Vec<PoseResult>> {
    let flip_index = dataset_info.flip_index();
    let mut results = Vec::with_capacity(meta.boxes.len());

    for (i, (bbox, cs)) in meta.boxes.iter().zip(meta.crops.iter()).enumerate() {
        let mut heatmaps = heatmaps_of(ys, &i.to_string(), dataset_info)?;

        if config.flip_test {
            let flipped = heatmaps_of(ys, &format!("{i}{FLIP_SUFFIX}"), dataset_info)?;
            let mut flipped = heatmap::flip_back(flipped.view(), &flip_index);
            if config.shift_heatmap {
                heatmap::shift_right(&mut flipped);
            }
            heatmaps = (heatmaps + flipped) * 0.5;
        }

        let keypoints = heatmap::decode(heatmaps.view(), cs, config.post_process, config.blur_kernel);
        results.push(PoseResult::new(*bbox, keypoints));
    }

    Ok(results)
}

impl InferenceProcess for OrtTopDown {
    type Input<'a> = (&'a RgbImage, &'a [PoseBox]);
    type Meta = CropMeta;
    type Output = Vec<PoseResult>;

    fn preprocess(&self, (image, boxes): Self::Input<'_>) -> Result<(Xs, Self::Meta)> {
        let (w, h) = (self.config.input_width, self.config.input_height);
        let mut xs = Xs::new();
        let mut crops = Vec::with_capacity(boxes.len());

        for (i, bbox) in boxes.iter().enumerate() {
            let cs = CenterScale::from_box(bbox, self.config.aspect_ratio(), self.config.bbox_padding);
            let crop = warp_crop(image, &cs, w, h);
            xs.push_kv(&i.to_string(), self.crop_tensor(&crop)?)?;
            if self.config.flip_test {
                let flipped = imageops::flip_horizontal(&crop);
                xs.push_kv(&format!("{i}{FLIP_SUFFIX}"), self.crop_tensor(&flipped)?)?;
            }
            crops.push(cs);
        }

        Ok((xs, CropMeta { boxes: boxes.to_vec(), crops }))
    }

    fn inference(&mut self, xs: Xs) -> Result<Xs> {
        let names = xs.names().to_vec();
        let mut ys = Xs::new();
        for (name, x) in names.iter().zip(xs) {
            let out = self.engine.engine_run(Xs::from(x))?;
            // first output carries the heatmaps
            let heatmaps = out.into_iter().next().context("Pose model returned no outputs")?;
            ys.push_kv(name, heatmaps)?;
        }
        Ok(ys)
    }

    fn postprocess(&self, ys: Xs, meta: Self::Meta) -> Result<Self::Output> {
        decode_crops(&ys, &meta, &self.config, &self.dataset_info)
    }
}

impl PoseEstimator for OrtTopDown {
    fn dataset_info(&self) -> &DatasetInfo {
        &self.dataset_info
    }

    fn estimate(&mut self, image: &RgbImage, boxes: &[PoseBox]) -> Result<Vec<PoseResult>> {
        let profile = self.profile;
        self.forward((image, boxes), profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PostProcess;
    use crate::data::X;

    const HM: usize = 8;

    fn three_joints() -> DatasetInfo {
        DatasetInfo {
            dataset_name: "tiny".to_string(),
            keypoint_names: vec!["head".to_string(), "left_hand".to_string(), "right_hand".to_string()],
            flip_pairs: vec![[1, 2]],
            skeleton: vec![],
        }
    }

    /// `[1, 3, 8, 8]` heatmaps with one `(joint, y, x, value)` peak per entry.
    fn heatmaps(peaks: &[(usize, usize, usize, f32)]) -> X {
        let mut x = ndarray::Array4::<f32>::zeros((1, 3, HM, HM));
        for &(j, y, col, v) in peaks {
            x[[0, j, y, col]] = v;
        }
        X::from(x.into_dyn())
    }

    /// A crop mapping heatmap pixels one to one, shifted right by `dx`.
    fn crop_at(dx: f32) -> CenterScale {
        let half = HM as f32 / 2.;
        CenterScale { center: [half + dx, half], scale: [HM as f32 / 200., HM as f32 / 200.] }
    }

    fn assert_row(keypoints: &ndarray::Array2<f32>, j: usize, expected: [f32; 3]) {
        for (got, want) in keypoints.row(j).iter().zip(expected) {
            assert!((got - want).abs() < 1e-4, "joint {j}: {:?} != {expected:?}", keypoints.row(j));
        }
    }

    fn flip_config() -> PoseConfig {
        PoseConfig {
            flip_test: true,
            shift_heatmap: true,
            post_process: PostProcess::None,
            ..Default::default()
        }
    }

    #[test]
    fn flipped_pass_is_paired_shifted_and_averaged() {
        let info = three_joints();
        let boxes = vec![PoseBox::new(0., 0., 7., 7., 0.9), PoseBox::new(100., 0., 107., 7., 0.8)];
        let meta = CropMeta { boxes: boxes.clone(), crops: vec![crop_at(0.), crop_at(100.)] };

        // the mirrored crop sees left and right swapped and x mirrored; the flipped-back
        // peaks land one column left of the upright ones until shifted
        let upright = [(0, 2, 3, 1.0), (1, 1, 2, 0.8), (2, 5, 6, 0.6)];
        let mirrored = [(0, 2, 5, 1.0), (2, 1, 6, 0.8), (1, 5, 2, 0.6)];
        let mut ys = Xs::new();
        for i in 0..2 {
            ys.push_kv(&i.to_string(), heatmaps(&upright)).unwrap();
            ys.push_kv(&format!("{i}_flip"), heatmaps(&mirrored)).unwrap();
        }

        let results = decode_crops(&ys, &meta, &flip_config(), &info).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].bbox, boxes[0]);
        assert_eq!(results[1].bbox, boxes[1]);

        assert_row(&results[0].keypoints, 0, [3., 2., 1.0]);
        assert_row(&results[0].keypoints, 1, [2., 1., 0.8]);
        assert_row(&results[0].keypoints, 2, [6., 5., 0.6]);
        assert_row(&results[1].keypoints, 0, [103., 2., 1.0]);
    }

    #[test]
    fn without_shift_the_flipped_peak_is_halved() {
        let info = three_joints();
        let meta = CropMeta { boxes: vec![PoseBox::new(0., 0., 7., 7., 1.)], crops: vec![crop_at(0.)] };
        let mut ys = Xs::new();
        ys.push_kv("0", heatmaps(&[(0, 2, 3, 1.0)])).unwrap();
        ys.push_kv("0_flip", heatmaps(&[(0, 2, 5, 1.0)])).unwrap();

        let config = PoseConfig { shift_heatmap: false, ..flip_config() };
        let results = decode_crops(&ys, &meta, &config, &info).unwrap();
        assert_row(&results[0].keypoints, 0, [2., 2., 0.5]);
    }

    #[test]
    fn missing_flipped_pass_is_an_error() {
        let info = three_joints();
        let meta = CropMeta { boxes: vec![PoseBox::new(0., 0., 7., 7., 1.)], crops: vec![crop_at(0.)] };
        let mut ys = Xs::new();
        ys.push_kv("0", heatmaps(&[])).unwrap();

        let err = decode_crops(&ys, &meta, &flip_config(), &info).unwrap_err();
        assert!(err.to_string().contains("0_flip"));
    }

    #[test]
    fn heatmap_count_must_match_dataset() {
        let meta = CropMeta { boxes: vec![PoseBox::new(0., 0., 7., 7., 1.)], crops: vec![crop_at(0.)] };
        let mut ys = Xs::new();
        ys.push_kv("0", heatmaps(&[])).unwrap();

        let config = PoseConfig { flip_test: false, ..flip_config() };
        let err = decode_crops(&ys, &meta, &config, &DatasetInfo::coco()).unwrap_err();
        assert!(err.to_string().contains("17 keypoints"));
    }
}
