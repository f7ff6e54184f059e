pub mod estimator;
pub mod landmarks;

pub use estimator::{parse_landmarks, FixedPoseEstimator, PoseEstimator, SidecarPoseEstimator};
pub use landmarks::{Landmark, LandmarkPoint, LandmarkSet, PixelPoint, Side};
