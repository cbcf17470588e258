//! Per-image detect, estimate and export loop.

use std::path::{Path, PathBuf};
use std::time::Instant;
use anyhow::{bail, Context, Result};
use image::RgbImage;

use crate::common::{Detection, PoseBox, RunMode};
use crate::data::TimeCalc;
use crate::detection_runners::{PersonDetector, PoseEstimator};
use crate::export;

/// Settings shared by every image of a run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub img_root: PathBuf,
    pub out_root: PathBuf,
    pub mode: RunMode,
    /// 1-based category id of the person class.
    pub det_cat_id: usize,
    pub bbox_thr: f32,
    pub kpt_thr: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            img_root: PathBuf::new(),
            out_root: PathBuf::from("npy_out"),
            mode: RunMode::FullFrame,
            det_cat_id: 1,
            bbox_thr: 0.3,
            kpt_thr: 0.3,
        }
    }
}

/// Outcome of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReport {
    pub image: PathBuf,
    pub output: PathBuf,
    pub num_boxes: usize,
    pub confident_keypoints: usize,
}

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub artifacts: Vec<PathBuf>,
    /// Read, boxes, pose, write.
    pub stages: TimeCalc,
}

impl ExportSummary {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Detections of the 1-based category `det_cat_id`, as pose input boxes.
pub fn select_person_boxes(detections: &[Detection], det_cat_id: usize) -> Vec<PoseBox> {
    let Some(class_id) = det_cat_id.checked_sub(1) else {
        return Vec::new();
    };
    detections
        .iter()
        .filter(|d| d.class_id == class_id as isize)
        .map(Detection::to_pose_box)
        .collect()
}

/// Boxes scoring strictly above `bbox_thr`.
pub fn filter_by_score(boxes: Vec<PoseBox>, bbox_thr: f32) -> Vec<PoseBox> {
    boxes.into_iter().filter(|b| b.conf > bbox_thr).collect()
}

pub fn read_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .with_context(|| format!("Failed to read image `{}`", path.display()))?;
    Ok(image.to_rgb8())
}

pub struct Driver<D, P> {
    detector: D,
    estimator: P,
    config: ExportConfig,
}

impl<D: PersonDetector, P: PoseEstimator> Driver<D, P> {
    pub fn new(detector: D, estimator: P, config: ExportConfig) -> Self {
        Self {
            detector,
            estimator,
            config,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn estimator(&self) -> &P {
        &self.estimator
    }

    /// Boxes the pose model should look at in `image`.
    pub fn person_boxes(&mut self, image: &RgbImage) -> Result<Vec<PoseBox>> {
        let boxes = match self.config.mode {
            RunMode::Detect => {
                let detections = self.detector.detect(image)?;
                log::debug!("{} detection(s)", detections.len());
                select_person_boxes(&detections, self.config.det_cat_id)
            }
            RunMode::FullFrame => vec![PoseBox::full_frame(image.width(), image.height())],
            RunMode::ExportTrace => bail!("Export-trace mode writes a model trace, not per-image keypoints"),
        };
        Ok(filter_by_score(boxes, self.config.bbox_thr))
    }

    /// Runs one image end to end and writes its artifact.
    pub fn process_image(&mut self, path: &Path, stages: &mut TimeCalc) -> Result<ImageReport> {
        let t = Instant::now();
        let image = read_image(path)?;
        stages.add_or_push(0, t.elapsed());

        let t = Instant::now();
        let boxes = self.person_boxes(&image)?;
        stages.add_or_push(1, t.elapsed());

        let t = Instant::now();
        let results = self
            .estimator
            .estimate(&image, &boxes)
            .with_context(|| format!("Pose estimation failed for `{}`", path.display()))?;
        stages.add_or_push(2, t.elapsed());

        let Some(first) = results.first() else {
            bail!(
                "No pose result for `{}` ({} box(es) above bbox_thr {})",
                path.display(),
                boxes.len(),
                self.config.bbox_thr
            );
        };
        let expected = self.estimator.dataset_info().num_keypoints();
        if first.num_keypoints() != expected {
            bail!(
                "Pose result for `{}` has {} keypoints, expected {}",
                path.display(),
                first.num_keypoints(),
                expected
            );
        }

        let t = Instant::now();
        let output = export::output_path(path, &self.config.img_root, &self.config.out_root);
        export::save_keypoints(&output, &first.keypoints)?;
        stages.add_or_push(3, t.elapsed());

        Ok(ImageReport {
            image: path.to_path_buf(),
            output,
            num_boxes: boxes.len(),
            confident_keypoints: first.count_confident(self.config.kpt_thr),
        })
    }

    /// Processes every image in order, stopping at the first error.
    pub fn run<I>(&mut self, images: I) -> Result<ExportSummary>
    where
        I: IntoIterator<Item = PathBuf>,
        I::IntoIter: ExactSizeIterator,
    {
        if self.config.mode == RunMode::ExportTrace {
            bail!("Export-trace mode writes a model trace, not per-image keypoints");
        }
        let images = images.into_iter();
        let n = images.len();
        let mut summary = ExportSummary::default();
        let started = Instant::now();

        for (i, path) in images.enumerate() {
            let report = self.process_image(&path, &mut summary.stages)?;
            log::info!(
                "[{}/{}] {} -> {} | boxes: {} | keypoints > {}: {}",
                i + 1,
                n,
                report.image.display(),
                report.output.display(),
                report.num_boxes,
                self.config.kpt_thr,
                report.confident_keypoints,
            );
            summary.artifacts.push(report.output);
        }

        if summary.is_empty() {
            log::warn!("No images matched, nothing written");
        } else {
            let ts = &summary.stages;
            log::info!(
                "Wrote {} file(s) in {:.2?} | read: {:.2?} | boxes: {:.2?} | pose: {:.2?} | write: {:.2?} (avg per image)",
                summary.len(),
                started.elapsed(),
                ts.avg_i(0),
                ts.avg_i(1),
                ts.avg_i(2),
                ts.avg_i(3),
            );
        }

        Ok(summary)
    }
}
