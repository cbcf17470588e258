use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Number of keypoints in the COCO person convention.
pub const COCO_KEYPOINT_COUNT: usize = 17;

const COCO_KEYPOINT_NAMES: [&str; COCO_KEYPOINT_COUNT] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

const COCO_FLIP_PAIRS: [[usize; 2]; 8] = [
    [1, 2], [3, 4], [5, 6], [7, 8], [9, 10], [11, 12], [13, 14], [15, 16],
];

const COCO_SKELETON: [[usize; 2]; 19] = [
    [15, 13], [13, 11], [16, 14], [14, 12], [11, 12],
    [5, 11], [6, 12], [5, 6], [5, 7], [6, 8], [7, 9], [8, 10],
    [1, 2], [0, 1], [0, 2], [1, 3], [2, 4], [3, 5], [4, 6],
];

/// Labeling convention a pose model was trained on: joint names and their order,
/// left/right pairs swapped under horizontal flip, and skeleton links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetInfo {
    pub dataset_name: String,
    pub keypoint_names: Vec<String>,
    pub flip_pairs: Vec<[usize; 2]>,
    pub skeleton: Vec<[usize; 2]>,
}

impl Default for DatasetInfo {
    fn default() -> Self {
        Self::coco()
    }
}

impl DatasetInfo {
    pub fn coco() -> Self {
        Self {
            dataset_name: "coco".to_string(),
            keypoint_names: COCO_KEYPOINT_NAMES.iter().map(|x| x.to_string()).collect(),
            flip_pairs: COCO_FLIP_PAIRS.to_vec(),
            skeleton: COCO_SKELETON.to_vec(),
        }
    }

    pub fn num_keypoints(&self) -> usize {
        self.keypoint_names.len()
    }

    /// Permutation mapping each joint to its mirror image (identity for unpaired joints).
    pub fn flip_index(&self) -> Vec<usize> {
        let mut index: Vec<usize> = (0..self.num_keypoints()).collect();
        for &[a, b] in self.flip_pairs.iter() {
            index[a] = b;
            index[b] = a;
        }
        index
    }

    pub fn validate(&self) -> Result<()> {
        let k = self.num_keypoints();
        if k == 0 {
            bail!("Dataset `{}` declares no keypoints", self.dataset_name);
        }
        for pair in self.flip_pairs.iter().chain(self.skeleton.iter()) {
            if pair[0] >= k || pair[1] >= k {
                bail!(
                    "Dataset `{}`: keypoint pair {:?} out of range for {} keypoints",
                    self.dataset_name, pair, k
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_flip_index_swaps_left_and_right() {
        let info = DatasetInfo::coco();
        let index = info.flip_index();
        assert_eq!(index.len(), COCO_KEYPOINT_COUNT);
        assert_eq!(index[0], 0);
        assert_eq!(info.keypoint_names[index[9]], "right_wrist");
        assert_eq!(index[16], 15);
        assert!(info.validate().is_ok());
    }

    #[test]
    fn out_of_range_pairs_fail_validation() {
        let info = DatasetInfo {
            dataset_name: "tiny".to_string(),
            keypoint_names: vec!["a".to_string(), "b".to_string()],
            flip_pairs: vec![[0, 2]],
            skeleton: vec![],
        };
        assert!(info.validate().is_err());
    }
}
