use std::{collections::HashMap, path::PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::pipeline::Frame;

use super::landmarks::{Landmark, LandmarkPoint, LandmarkSet};

/// Source of body landmarks for a frame.
///
/// `Ok(None)` means no person was detected. `Err` is a per-frame failure; the
/// frame processor records it and moves on.
pub trait PoseEstimator: Send + Sync {
    fn estimate(&self, frame: &Frame) -> Result<Option<LandmarkSet>>;
}

/// Reads landmarks that an external estimator exported next to each frame.
///
/// For `Frame_12.png` the file is `Frame_12.png.landmarks.json`, holding either
/// named points or the raw 33-point BlazePose list:
///
/// ```json
/// { "pose": { "left_hip": { "x": 0.41, "y": 0.52, "visibility": 0.98 }, ... } }
/// { "pose": [ { "x": 0.5, "y": 0.1, "visibility": 0.99 }, ... ] }
/// { "pose": null }
/// ```
///
/// A missing file or a `null` pose means no detection.
#[derive(Debug, Clone)]
pub struct SidecarPoseEstimator {
    suffix: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SidecarPose {
    Indexed(Vec<LandmarkPoint>),
    Named(HashMap<String, LandmarkPoint>),
}

#[derive(Debug, Deserialize)]
struct SidecarFile {
    pose: Option<SidecarPose>,
}

impl SidecarPoseEstimator {
    pub fn new() -> Self {
        Self {
            suffix: ".landmarks.json".into(),
        }
    }

    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn sidecar_path(&self, frame: &Frame) -> PathBuf {
        let mut name = frame.path.as_os_str().to_owned();
        name.push(&self.suffix);
        PathBuf::from(name)
    }
}

impl Default for SidecarPoseEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseEstimator for SidecarPoseEstimator {
    fn estimate(&self, frame: &Frame) -> Result<Option<LandmarkSet>> {
        if frame.path.as_os_str().is_empty() {
            bail!("frame {} has no file to read landmarks beside", frame.index);
        }
        let path = self.sidecar_path(frame);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read landmarks {}", path.display()))?;
        parse_landmarks(&contents).with_context(|| format!("malformed landmarks {}", path.display()))
    }
}

/// Landmarks supplied alongside an uploaded image instead of a sidecar file.
#[derive(Debug, Clone)]
pub struct FixedPoseEstimator {
    pose: Option<LandmarkSet>,
}

impl FixedPoseEstimator {
    pub fn new(pose: Option<LandmarkSet>) -> Self {
        Self { pose }
    }

    /// Accepts the sidecar document format.
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(Self::new(parse_landmarks(contents)?))
    }
}

impl PoseEstimator for FixedPoseEstimator {
    fn estimate(&self, _frame: &Frame) -> Result<Option<LandmarkSet>> {
        Ok(self.pose.clone())
    }
}

/// Decode a `{ "pose": ... }` landmark document.
pub fn parse_landmarks(contents: &str) -> Result<Option<LandmarkSet>> {
    let file: SidecarFile = serde_json::from_str(contents)?;
    match file.pose {
        None => Ok(None),
        Some(SidecarPose::Indexed(points)) => LandmarkSet::from_blazepose(&points)
            .map(Some)
            .ok_or_else(|| anyhow!("expected 33 landmarks, found {}", points.len())),
        Some(SidecarPose::Named(points)) => {
            let mut set = LandmarkSet::new();
            for (name, point) in points {
                // Estimators may report more points than the pipeline uses.
                if let Some(landmark) = Landmark::from_name(&name) {
                    set.insert(landmark, point);
                }
            }
            Ok(Some(set))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame_at(path: PathBuf) -> Frame {
        Frame {
            index: 0,
            path,
            image: RgbImage::new(4, 4),
        }
    }

    #[test]
    fn missing_sidecar_means_no_detection() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame_at(dir.path().join("Frame_0.png"));
        assert!(SidecarPoseEstimator::new().estimate(&frame).unwrap().is_none());
    }

    #[test]
    fn null_pose_means_no_detection() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame_at(dir.path().join("Frame_0.png"));
        let estimator = SidecarPoseEstimator::new();
        std::fs::write(estimator.sidecar_path(&frame), r#"{"pose": null}"#).unwrap();
        assert!(estimator.estimate(&frame).unwrap().is_none());
    }

    #[test]
    fn named_points_are_read_and_extras_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame_at(dir.path().join("Frame_0.png"));
        let estimator = SidecarPoseEstimator::new();
        std::fs::write(
            estimator.sidecar_path(&frame),
            r#"{"pose": {
                "left_hip": {"x": 0.4, "y": 0.5, "visibility": 0.9},
                "left_elbow": {"x": 0.1, "y": 0.1, "visibility": 0.9}
            }}"#,
        )
        .unwrap();

        let set = estimator.estimate(&frame).unwrap().unwrap();
        assert_eq!(set.get(Landmark::LeftHip), Some(&LandmarkPoint::new(0.4, 0.5, 0.9)));
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn indexed_points_follow_blazepose_layout() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame_at(dir.path().join("Frame_0.png"));
        let estimator = SidecarPoseEstimator::new();
        let points: Vec<String> = (0..33)
            .map(|i| format!(r#"{{"x": {}, "y": 0.5, "visibility": 0.8}}"#, i as f64 / 100.0))
            .collect();
        std::fs::write(
            estimator.sidecar_path(&frame),
            format!(r#"{{"pose": [{}]}}"#, points.join(",")),
        )
        .unwrap();

        let set = estimator.estimate(&frame).unwrap().unwrap();
        assert!(set.is_complete());
        assert_eq!(set.get(Landmark::Nose).unwrap().x, 0.0);
        assert_eq!(set.get(Landmark::RightKnee).unwrap().x, 0.26);
    }

    #[test]
    fn malformed_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame_at(dir.path().join("Frame_0.png"));
        let estimator = SidecarPoseEstimator::new();
        std::fs::write(estimator.sidecar_path(&frame), "{ not json").unwrap();
        assert!(estimator.estimate(&frame).is_err());

        std::fs::write(estimator.sidecar_path(&frame), r#"{"pose": [{"x": 0.1, "y": 0.1}]}"#)
            .unwrap();
        assert!(estimator.estimate(&frame).is_err());
    }

    #[test]
    fn pathless_frame_is_an_error_not_a_cwd_lookup() {
        let frame = frame_at(PathBuf::new());
        let err = SidecarPoseEstimator::new().estimate(&frame).unwrap_err();
        assert!(err.to_string().contains("no file to read landmarks"));
    }

    #[test]
    fn fixed_estimator_returns_supplied_pose() {
        let frame = frame_at(PathBuf::new());
        let estimator = FixedPoseEstimator::from_json(
            r#"{"pose": {"right_knee": {"x": 0.5, "y": 0.6, "visibility": 0.9}}}"#,
        )
        .unwrap();
        let set = estimator.estimate(&frame).unwrap().unwrap();
        assert_eq!(set.get(Landmark::RightKnee), Some(&LandmarkPoint::new(0.5, 0.6, 0.9)));

        let none = FixedPoseEstimator::from_json(r#"{"pose": null}"#).unwrap();
        assert!(none.estimate(&frame).unwrap().is_none());
        assert!(FixedPoseEstimator::from_json("[1, 2").is_err());
    }
}
