//! File/code adapted from https://github.com/jamjamjon/usls

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{s, Axis};

use crate::common::{BoxType, Detection, DetectorConfig, ModelVersion, YoloPreds};
use crate::data::{ConfigOrt, Xs, Y};
use crate::detection_runners::inference_process::{InferenceProcess, PersonDetector};
use crate::detection_runners::ort_detector::{image_ops, OrtEngine};

/// Original image size and the letterbox scale applied to it.
#[derive(Debug, Clone, Copy)]
pub struct LetterboxMeta {
    pub width: u32,
    pub height: u32,
    pub ratio: f32,
}

#[derive(Debug)]
pub struct OrtYOLO {
    engine: OrtEngine,
    config: DetectorConfig,
    names: Vec<String>,
    layout: YoloPreds,
    profile: bool,
}

impl OrtYOLO {
    pub fn new(config: DetectorConfig, options: ConfigOrt) -> Result<Self> {
        let options = options
            .with_model_width(config.input_width)
            .with_model_height(config.input_height);
        let profile = options.profile;
        let engine = OrtEngine::new(&options)?;

        // YOLO Outputs Format
        let layout = config.model_version.layout();
        let names = config.class_names();

        // Summary
        log::info!(
            "YOLO Version: {} | Classes: {} | conf: {} | iou: {}",
            config.model_version.name(),
            config.num_classes,
            config.conf,
            config.iou,
        );

        Ok(Self {
            engine,
            config,
            names,
            layout,
            profile,
        })
    }

    pub fn width(&self) -> u32 {
        self.config.input_width
    }

    pub fn height(&self) -> u32 {
        self.config.input_height
    }

    pub fn version(&self) -> &ModelVersion {
        &self.config.model_version
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn layout(&self) -> &YoloPreds {
        &self.layout
    }

    pub fn engine(&self) -> &OrtEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut OrtEngine {
        &mut self.engine
    }

    pub fn print_time(&self) {
        log::info!("Detector avg: {:?}", self.engine.infer_time.avg());
    }
}

/// Turns raw YOLO predictions for one letterboxed image into detections in source image pixels:
/// confidence cut, box conversion and rescale, clamp to the image, then per-class NMS.
pub fn decode_detections(
    ys: &Xs,
    config: &DetectorConfig,
    layout: &YoloPreds,
    names: &[String],
    meta: LetterboxMeta,
) -> Result<Vec<Detection>> {
    if ys.is_empty() || ys[0].ndim() != 3 || ys[0].shape()[0] == 0 {
        bail!("Detector output must be a single [batch, features, anchors] tensor");
    }
    let nc = config.num_classes;
    let feature_axis = if layout.is_anchors_first() { 2 } else { 1 };
    let features = ys[0].shape()[feature_axis];
    if features < layout.num_features(nc) {
        bail!(
            "Detector output has {} features per anchor, {} needs at least {} for {} classes",
            features,
            config.model_version.name(),
            layout.num_features(nc),
            nc
        );
    }
    let preds = ys[0].index_axis(Axis(0), 0);

    // parse preditions
    let (slice_bboxes, slice_id, slice_clss, slice_confs) = layout.parse_preds(preds, nc);

    let mut y_bboxes = Vec::new();
    for (i, bbox) in slice_bboxes.axis_iter(Axis(0)).enumerate() {
        // confidence & class_id
        let (class_id, confidence) = match &slice_id {
            Some(ids) => (ids[[i, 0]] as usize, slice_clss[[i, 0]]),
            None => {
                let Some((class_id, &confidence)) = slice_clss
                    .slice(s![i, ..])
                    .into_iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                else {
                    continue;
                };

                match &slice_confs {
                    None => (class_id, confidence),
                    Some(slice_confs) => (class_id, confidence * slice_confs[[i, 0]]),
                }
            }
        };

        // filtering low scores
        if confidence < config.conf {
            continue;
        }

        // Bounding boxes, back in source image pixels
        let bbox = bbox.mapv(|x| x / meta.ratio);
        let (x1, y1, x2, y2) = match layout.box_type() {
            BoxType::Cxcywh => {
                let (cx, cy, w, h) = (bbox[0], bbox[1], bbox[2], bbox[3]);
                (cx - w / 2., cy - h / 2., cx + w / 2., cy + h / 2.)
            }
            BoxType::Xyxy => (bbox[0], bbox[1], bbox[2], bbox[3]),
        };

        let mut y_bbox = Detection::default()
            .with_x1y1_x2y2(x1, y1, x2, y2)
            .with_confidence(confidence)
            .with_class_id(class_id as isize);
        y_bbox.bbox = y_bbox.bbox.clamp_to(meta.width, meta.height);
        if let Some(name) = names.get(class_id) {
            y_bbox = y_bbox.with_label(name);
        }

        y_bboxes.push(y_bbox);
    }

    let mut y = Y::default();
    if !y_bboxes.is_empty() {
        y = y.with_detections(&y_bboxes);
        if layout.apply_nms {
            y = y.apply_nms(config.iou);
        }
    }

    Ok(y.into_detections())
}

impl InferenceProcess for OrtYOLO {
    type Input<'a> = &'a RgbImage;
    type Meta = LetterboxMeta;
    type Output = Vec<Detection>;

    fn preprocess(&self, x: Self::Input<'_>) -> Result<(Xs, Self::Meta)> {
        let (xs_, ratio) = image_ops::letterbox(x, self.height(), self.width())?;
        let meta = LetterboxMeta {
            width: x.width(),
            height: x.height(),
            ratio,
        };
        Ok((Xs::from(xs_), meta))
    }

    fn inference(&mut self, xs: Xs) -> Result<Xs> {
        self.engine.engine_run(xs)
    }

    fn postprocess(&self, ys: Xs, meta: Self::Meta) -> Result<Self::Output> {
        decode_detections(&ys, &self.config, &self.layout, &self.names, meta)
    }
}

impl PersonDetector for OrtYOLO {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let profile = self.profile;
        self.forward(image, profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::X;

    fn v8_output() -> Xs {
        // features-first [1, 4 + 2, 5]
        let values = vec![
            20., 21., 95., 60., 20.5, // cx
            20., 20., 10., 60., 20.,  // cy
            10., 10., 20., 20., 10.,  // w
            10., 10., 10., 20., 10.,  // h
            0.9, 0.1, 0.2, 0.7, 0.6,  // person
            0.1, 0.8, 0.1, 0.1, 0.1,  // horse
        ];
        Xs::from(X::from_shape_vec(&[1, 6, 5], values).unwrap())
    }

    fn two_class_config() -> DetectorConfig {
        DetectorConfig {
            num_classes: 2,
            names: Some(vec!["person".to_string(), "horse".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn v8_predictions_decode_to_source_pixels() {
        let config = two_class_config();
        let meta = LetterboxMeta { width: 120, height: 130, ratio: 0.5 };
        let dets = decode_detections(&v8_output(), &config, &config.model_version.layout(), &config.class_names(), meta)
            .unwrap();

        // anchor 2 is under `conf`, anchor 4 is a same-class duplicate of anchor 0
        assert_eq!(dets.len(), 3);

        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[0].label.as_deref(), Some("person"));
        assert_eq!(dets[0].bbox.xy1_xy2(), (30., 30., 50., 50.));
        assert_eq!(dets[0].confidence, 0.9);

        // overlaps the person but is another class
        assert_eq!(dets[1].class_id, 1);
        assert_eq!(dets[1].bbox.xy1_xy2(), (32., 30., 52., 50.));

        // clamped to the 120x130 source image
        assert_eq!(dets[2].bbox.xy1_xy2(), (100., 100., 119., 129.));
        assert_eq!(dets[2].confidence, 0.7);
    }

    #[test]
    fn too_few_features_for_class_count_is_an_error() {
        let config = DetectorConfig::default();
        let meta = LetterboxMeta { width: 64, height: 64, ratio: 1. };
        let err = decode_detections(&v8_output(), &config, &config.model_version.layout(), &config.class_names(), meta)
            .unwrap_err();
        assert!(err.to_string().contains("80 classes"));
    }

    #[test]
    fn nothing_above_conf_yields_no_detections() {
        let config = DetectorConfig { conf: 0.95, ..two_class_config() };
        let meta = LetterboxMeta { width: 64, height: 64, ratio: 1. };
        let dets = decode_detections(&v8_output(), &config, &config.model_version.layout(), &[], meta).unwrap();
        assert!(dets.is_empty());
    }
}
