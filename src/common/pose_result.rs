use ndarray::Array2;
use crate::common::PoseBox;

/// A single joint: image-space position plus heatmap confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Pose estimate for one input box.
///
/// `keypoints` has shape `[K, 3]`, one `(x, y, score)` row per joint in dataset order.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseResult {
    pub bbox: PoseBox,
    pub keypoints: Array2<f32>,
}

impl PoseResult {
    pub fn new(bbox: PoseBox, keypoints: Array2<f32>) -> Self {
        Self { bbox, keypoints }
    }

    pub fn num_keypoints(&self) -> usize {
        self.keypoints.nrows()
    }

    pub fn keypoint(&self, index: usize) -> Option<Keypoint> {
        if index >= self.num_keypoints() {
            return None;
        }
        let row = self.keypoints.row(index);
        Some(Keypoint { x: row[0], y: row[1], score: row[2] })
    }

    /// Number of joints whose score exceeds `threshold`.
    pub fn count_confident(&self, threshold: f32) -> usize {
        self.keypoints.column(2).iter().filter(|&&s| s > threshold).count()
    }
}
