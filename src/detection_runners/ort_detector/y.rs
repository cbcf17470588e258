//! File/code adapted from https://github.com/jamjamjon/usls

use crate::common::Detection;
use crate::detection_runners::ort_detector::nms::Nms;

/// Detector output for one image.
#[derive(Clone, PartialEq, Default)]
pub struct Y {
    detections: Option<Vec<Detection>>,
}

impl std::fmt::Debug for Y {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = f.debug_struct("Y");
        if let Some(x) = &self.detections {
            if !x.is_empty() {
                f.field("Detections", &x);
            }
        }
        f.finish()
    }
}

impl Y {
    /// Sets the `detections` field with the provided vector of detections.
    pub fn with_detections(mut self, detections: &[Detection]) -> Self {
        self.detections = Some(detections.to_vec());
        self
    }

    pub fn into_detections(self) -> Vec<Detection> {
        self.detections.unwrap_or_default()
    }

    pub fn apply_nms(mut self, iou_threshold: f32) -> Self {
        if let Some(ref mut bboxes) = self.detections {
            Self::nms(bboxes, iou_threshold);
        }
        self
    }

    /// Greedy per-class NMS: keeps the highest-confidence box of every same-class cluster
    /// overlapping above `iou_threshold`. Survivors are left sorted by descending confidence.
    pub fn nms<T: Nms>(boxes: &mut Vec<T>, iou_threshold: f32) {
        boxes.sort_by(|b1, b2| {
            b2.confidence()
                .partial_cmp(&b1.confidence())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut current_index = 0;
        for index in 0..boxes.len() {
            let mut drop = false;
            for prev_index in 0..current_index {
                if boxes[prev_index].class_id() != boxes[index].class_id() {
                    continue;
                }
                let iou = boxes[prev_index].iou(&boxes[index]);
                if iou > iou_threshold {
                    drop = true;
                    break;
                }
            }
            if !drop {
                boxes.swap(current_index, index);
                current_index += 1;
            }
        }
        boxes.truncate(current_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_drops_overlapping_lower_confidence_boxes() {
        let dets = vec![
            Detection::default().with_x1y1_x2y2(0., 0., 100., 100.).with_confidence(0.6),
            Detection::default().with_x1y1_x2y2(5., 5., 105., 105.).with_confidence(0.9),
            Detection::default().with_x1y1_x2y2(300., 300., 400., 400.).with_confidence(0.5),
        ];
        let y = Y::default().with_detections(&dets).apply_nms(0.45);
        let kept = y.into_detections();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.5);
    }

    #[test]
    fn nms_keeps_person_under_overlapping_horse() {
        let dets = vec![
            Detection::default().with_x1y1_x2y2(100., 50., 200., 300.).with_confidence(0.85).with_class_id(0),
            Detection::default().with_x1y1_x2y2(90., 60., 210., 310.).with_confidence(0.95).with_class_id(17),
            Detection::default().with_x1y1_x2y2(102., 52., 202., 302.).with_confidence(0.6).with_class_id(0),
        ];
        assert!(dets[0].bbox.iou(&dets[1].bbox) > 0.45);

        let kept = Y::default().with_detections(&dets).apply_nms(0.45).into_detections();
        assert_eq!(kept.len(), 2);
        assert_eq!((kept[0].class_id, kept[0].confidence), (17, 0.95));
        assert_eq!((kept[1].class_id, kept[1].confidence), (0, 0.85));
    }
}
