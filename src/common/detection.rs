use serde::{Deserialize, Serialize};
use crate::common::PoseBox;
use crate::detection_runners::ort_detector::nms::Nms;

#[derive(Default, Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: isize,
    pub bbox: PoseBox,
    pub label: Option<String>,
    pub confidence: f32,
}

impl Nms for Detection {
    /// Computes the intersection over union (IoU) between this bounding box and another.
    fn iou(&self, other: &Self) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    /// Returns the confidence score of the bounding box.
    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn class_id(&self) -> isize {
        self.class_id
    }
}

impl Detection {
    /// Sets the bounding box's coordinates using `(x1, y1, x2, y2)` and calculates width and height.
    pub fn with_x1y1_x2y2(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = PoseBox::default().with_x1y1_x2y2(x1, y1, x2, y2);
        self
    }

    /// Sets the confidence score of the detection, mirrored onto the box.
    pub fn with_confidence(mut self, conf: f32) -> Self {
        self.confidence = conf;
        self.bbox.conf = conf;
        self
    }

    pub fn with_class_id(mut self, class_id: isize) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// The detection as a pose input box carrying the detection score.
    pub fn to_pose_box(&self) -> PoseBox {
        self.bbox.with_confidence(self.confidence)
    }
}
