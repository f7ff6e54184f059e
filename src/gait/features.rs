//! Bilateral joint angles and the classifier feature vector.

use serde::Serialize;

use crate::error::FrameError;
use crate::pose::{Landmark, LandmarkSet, PixelPoint, Side};

use super::geometry::joint_angle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Joint {
    Hip,
    Knee,
    Ankle,
}

impl Joint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::Hip => "Hip",
            Joint::Knee => "Knee",
            Joint::Ankle => "Ankle",
        }
    }
}

/// One measured joint angle, in clinical convention (0 = neutral).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JointAngle {
    pub joint: Joint,
    pub side: Side,
    pub degrees: i32,
    /// Joint vertex in pixels, where the value is drawn.
    pub anchor: PixelPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SideAngles {
    pub side: Side,
    pub hip: JointAngle,
    pub knee: JointAngle,
    pub ankle: JointAngle,
}

impl SideAngles {
    pub fn degrees(&self) -> [i32; 3] {
        [self.hip.degrees, self.knee.degrees, self.ankle.degrees]
    }

    pub fn iter(&self) -> impl Iterator<Item = &JointAngle> {
        [&self.hip, &self.knee, &self.ankle].into_iter()
    }
}

/// Which way the subject walks across the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Facing {
    /// Nose is right of the left hip: the left leg is the far side.
    Right,
    Left,
}

/// `[Δhip, Δknee, Δankle, Δhip_x, Δhip_y, Δknee_x, Δknee_y, Δankle_x, Δankle_y]`
///
/// Angle and y terms are far side minus near side; x terms are always left
/// minus right. Coordinates are normalized image fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector(pub [f64; FeatureVector::LEN]);

impl FeatureVector {
    pub const LEN: usize = 9;

    pub fn as_array(&self) -> &[f64; FeatureVector::LEN] {
        &self.0
    }
}

/// Everything the extractor derived from one frame's landmarks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BilateralResult {
    pub right: Option<SideAngles>,
    pub left: Option<SideAngles>,
    pub facing: Option<Facing>,
    pub features: Option<FeatureVector>,
}

impl BilateralResult {
    /// Hip, knee, ankle degrees for `side`, zeros when the chain was gated out.
    pub fn degrees(&self, side: Side) -> [i32; 3] {
        let chain = match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        };
        chain.map(SideAngles::degrees).unwrap_or([0; 3])
    }

    pub fn angles(&self) -> impl Iterator<Item = &JointAngle> {
        self.right
            .iter()
            .chain(self.left.iter())
            .flat_map(SideAngles::iter)
    }
}

#[derive(Debug, Clone)]
pub struct BilateralExtractor {
    visibility_threshold: f64,
}

impl BilateralExtractor {
    pub fn new(visibility_threshold: f64) -> Self {
        Self {
            visibility_threshold,
        }
    }

    pub fn visibility_threshold(&self) -> f64 {
        self.visibility_threshold
    }

    /// A chain counts only when hip, knee and ankle each clear the threshold.
    pub fn chain_visible(&self, landmarks: &LandmarkSet, side: Side) -> bool {
        [Landmark::hip(side), Landmark::knee(side), Landmark::ankle(side)]
            .into_iter()
            .all(|landmark| landmarks.visibility(landmark) > self.visibility_threshold)
    }

    pub fn extract(
        &self,
        landmarks: &LandmarkSet,
        width: u32,
        height: u32,
    ) -> Result<BilateralResult, FrameError> {
        let right = self.side_angles(landmarks, Side::Right, width, height)?;
        let left = self.side_angles(landmarks, Side::Left, width, height)?;

        let (facing, features) = match (&right, &left) {
            (Some(right), Some(left)) => {
                let facing = facing(landmarks, width, height)?;
                let features = feature_vector(landmarks, right, left, facing)?;
                (Some(facing), Some(features))
            }
            _ => (None, None),
        };

        Ok(BilateralResult {
            right,
            left,
            facing,
            features,
        })
    }

    fn side_angles(
        &self,
        landmarks: &LandmarkSet,
        side: Side,
        width: u32,
        height: u32,
    ) -> Result<Option<SideAngles>, FrameError> {
        if !self.chain_visible(landmarks, side) {
            return Ok(None);
        }

        let px = |landmark: Landmark| -> Result<PixelPoint, FrameError> {
            Ok(landmarks.require(landmark)?.to_pixel(width, height))
        };

        let shoulder = px(Landmark::shoulder(side))?;
        let hip = px(Landmark::hip(side))?;
        let knee = px(Landmark::knee(side))?;
        let ankle = px(Landmark::ankle(side))?;
        let toe = px(Landmark::toe(side))?;

        let (hip_raw, hip_anchor) = joint_angle(shoulder, hip, knee);
        let (knee_raw, knee_anchor) = joint_angle(hip, knee, ankle);
        let (ankle_raw, ankle_anchor) = joint_angle(knee, ankle, toe);

        Ok(Some(SideAngles {
            side,
            hip: JointAngle {
                joint: Joint::Hip,
                side,
                degrees: hip_raw,
                anchor: hip_anchor,
            },
            knee: JointAngle {
                joint: Joint::Knee,
                side,
                degrees: 180 - knee_raw,
                anchor: knee_anchor,
            },
            ankle: JointAngle {
                joint: Joint::Ankle,
                side,
                degrees: 180 - (ankle_raw - 45),
                anchor: ankle_anchor,
            },
        }))
    }
}

fn facing(landmarks: &LandmarkSet, width: u32, height: u32) -> Result<Facing, FrameError> {
    let nose = landmarks.require(Landmark::Nose)?.to_pixel(width, height);
    let left_hip = landmarks.require(Landmark::LeftHip)?.to_pixel(width, height);
    Ok(if nose.x > left_hip.x {
        Facing::Right
    } else {
        Facing::Left
    })
}

fn feature_vector(
    landmarks: &LandmarkSet,
    right: &SideAngles,
    left: &SideAngles,
    facing: Facing,
) -> Result<FeatureVector, FrameError> {
    let (far, near) = match facing {
        Facing::Right => (Side::Left, Side::Right),
        Facing::Left => (Side::Right, Side::Left),
    };
    let chain = |side: Side| match side {
        Side::Left => left,
        Side::Right => right,
    };

    let angle_diff = |pick: fn(&SideAngles) -> i32| (pick(chain(far)) - pick(chain(near))) as f64;

    let mut values = [0.0; FeatureVector::LEN];
    values[0] = angle_diff(|s| s.hip.degrees);
    values[1] = angle_diff(|s| s.knee.degrees);
    values[2] = angle_diff(|s| s.ankle.degrees);

    let pairs = [
        (Landmark::hip as fn(Side) -> Landmark),
        Landmark::knee,
        Landmark::ankle,
    ];
    for (i, landmark_of) in pairs.into_iter().enumerate() {
        let l = landmarks.require(landmark_of(Side::Left))?;
        let r = landmarks.require(landmark_of(Side::Right))?;
        let far_y = landmarks.require(landmark_of(far))?.y;
        let near_y = landmarks.require(landmark_of(near))?.y;
        values[3 + 2 * i] = l.x - r.x;
        values[4 + 2 * i] = far_y - near_y;
    }

    Ok(FeatureVector(values))
}
