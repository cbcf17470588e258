//! File/code adapted from https://github.com/jamjamjon/usls

use ndarray::{ArrayView, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVersion {
    YoloV5,
    YoloV6,
    YoloV7,
    #[default] YoloV8,
    YoloV9,
    YoloV10,
    YoloV11,
}

impl ModelVersion {
    pub fn name(&self) -> String {
        match self {
            Self::YoloV5 => "YoloV5".to_string(),
            Self::YoloV6 => "YoloV6".to_string(),
            Self::YoloV7 => "YoloV7".to_string(),
            Self::YoloV8 => "YoloV8".to_string(),
            Self::YoloV9 => "YoloV9".to_string(),
            Self::YoloV10 => "YoloV10".to_string(),
            Self::YoloV11 => "YoloV11".to_string(),
        }
    }

    /// Output tensor layout produced by this family of exports.
    pub fn layout(&self) -> YoloPreds {
        match self {
            ModelVersion::YoloV5 | ModelVersion::YoloV6 | ModelVersion::YoloV7 => YoloPreds::n_a_cxcywh_confclss(),
            ModelVersion::YoloV8 | ModelVersion::YoloV9 | ModelVersion::YoloV11 => YoloPreds::n_cxcywh_clss_a(),
            ModelVersion::YoloV10 => YoloPreds::n_a_xyxy_confcls().apply_nms(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxType {
    Cxcywh,
    Xyxy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClssType {
    Clss,
    ConfCls,
    ConfClss,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnchorsPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YoloPreds {
    pub clss: ClssType,
    pub bbox: BoxType,
    pub anchors: AnchorsPosition,
    pub apply_nms: bool,
}

impl Default for YoloPreds {
    fn default() -> Self {
        Self {
            clss: ClssType::Clss,
            bbox: BoxType::Cxcywh,
            anchors: AnchorsPosition::After,
            apply_nms: true,
        }
    }
}

/// Per-anchor slices of one image's predictions: boxes, class ids (if the model emits them),
/// class scores, and objectness (if separate from the class scores).
pub type PredSlices<'a> = (
    ArrayView<'a, f32, IxDyn>,
    Option<ArrayView<'a, f32, IxDyn>>,
    ArrayView<'a, f32, IxDyn>,
    Option<ArrayView<'a, f32, IxDyn>>,
);

impl YoloPreds {
    pub fn apply_nms(mut self, x: bool) -> Self {
        self.apply_nms = x;
        self
    }

    pub fn n_a_cxcywh_confclss() -> Self {
        // YOLOv5 | YOLOv6 | YOLOv7 : NACxcywhConfClss
        Self {
            bbox: BoxType::Cxcywh,
            clss: ClssType::ConfClss,
            anchors: AnchorsPosition::Before,
            ..Default::default()
        }
    }

    pub fn n_cxcywh_clss_a() -> Self {
        // YOLOv8 | YOLOv9 | YOLO11 : NCxcywhClssA
        Self {
            bbox: BoxType::Cxcywh,
            clss: ClssType::Clss,
            anchors: AnchorsPosition::After,
            ..Default::default()
        }
    }

    pub fn n_a_xyxy_confcls() -> Self {
        // YOLOv10 : NAXyxyConfCls
        Self {
            bbox: BoxType::Xyxy,
            clss: ClssType::ConfCls,
            anchors: AnchorsPosition::Before,
            ..Default::default()
        }
    }

    pub fn box_type(&self) -> &BoxType {
        &self.bbox
    }

    pub fn is_anchors_first(&self) -> bool {
        matches!(self.anchors, AnchorsPosition::Before)
    }

    /// Number of per-anchor features the layout needs for `nc` classes.
    pub fn num_features(&self, nc: usize) -> usize {
        4 + match self.clss {
            ClssType::ConfClss => 1 + nc,
            ClssType::ConfCls => 2,
            ClssType::Clss => nc,
        }
    }

    /// Splits a single image's `[anchors, features]` (or `[features, anchors]`) predictions.
    pub fn parse_preds<'a>(&self, x: ArrayViewD<'a, f32>, nc: usize) -> PredSlices<'a> {
        let x = if self.is_anchors_first() {
            x
        } else {
            x.reversed_axes()
        };

        let (slice_bboxes, xs) = x.split_at(Axis(1), 4);

        let (slice_id, slice_clss, slice_confs) = match self.clss {
            ClssType::ConfClss => {
                let (confs, xs) = xs.split_at(Axis(1), 1);
                let (clss, _) = xs.split_at(Axis(1), nc);
                (None, clss, Some(confs))
            }
            ClssType::ConfCls => {
                let (clss, xs) = xs.split_at(Axis(1), 1);
                let (ids, _) = xs.split_at(Axis(1), 1);
                (Some(ids), clss, None)
            }
            ClssType::Clss => {
                let (clss, _) = xs.split_at(Axis(1), nc);
                (None, clss, None)
            }
        };

        (slice_bboxes, slice_id, slice_clss, slice_confs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn v8_layout_is_transposed_before_splitting() {
        // 4 box features + 2 classes over 3 anchors, features-first as YOLOv8 exports it
        let preds = Array::from_shape_vec(
            (6, 3),
            vec![
                10., 20., 30., // cx
                11., 21., 31., // cy
                4., 4., 4.,    // w
                5., 5., 5.,    // h
                0.1, 0.9, 0.2, // class 0
                0.8, 0.05, 0.3, // class 1
            ],
        )
        .unwrap()
        .into_dyn();

        let layout = ModelVersion::YoloV8.layout();
        let (bboxes, ids, clss, confs) = layout.parse_preds(preds.view(), 2);
        assert!(ids.is_none());
        assert!(confs.is_none());
        assert_eq!(bboxes.shape(), &[3, 4]);
        assert_eq!(clss.shape(), &[3, 2]);
        assert_eq!(bboxes[[1, 0]], 20.);
        assert_eq!(clss[[0, 1]], 0.8);
    }

    #[test]
    fn versions_deserialize_from_lowercase_names() {
        let v: ModelVersion = serde_json::from_str("\"yolov10\"").unwrap();
        assert_eq!(v, ModelVersion::YoloV10);
        assert!(!v.layout().apply_nms);
    }
}
