use serde::{Deserialize, Serialize};

use crate::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "L",
            Side::Right => "R",
        }
    }
}

/// The anatomical points the gait pipeline consumes.
///
/// Any pose estimator can be plugged in as long as it reports these points;
/// the estimator's own index scheme is translated at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftShoulder = 1,
    RightShoulder = 2,
    LeftHip = 3,
    RightHip = 4,
    LeftKnee = 5,
    RightKnee = 6,
    LeftAnkle = 7,
    RightAnkle = 8,
    LeftToe = 9,
    RightToe = 10,
}

impl Landmark {
    pub const COUNT: usize = 11;

    pub const ALL: [Landmark; Landmark::COUNT] = [
        Landmark::Nose,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftKnee,
        Landmark::RightKnee,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
        Landmark::LeftToe,
        Landmark::RightToe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Landmark::Nose => "nose",
            Landmark::LeftShoulder => "left_shoulder",
            Landmark::RightShoulder => "right_shoulder",
            Landmark::LeftHip => "left_hip",
            Landmark::RightHip => "right_hip",
            Landmark::LeftKnee => "left_knee",
            Landmark::RightKnee => "right_knee",
            Landmark::LeftAnkle => "left_ankle",
            Landmark::RightAnkle => "right_ankle",
            Landmark::LeftToe => "left_toe",
            Landmark::RightToe => "right_toe",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|landmark| landmark.name() == name)
    }

    /// Position in the 33-point BlazePose topology.
    ///
    /// The foot tip maps to the heel keypoint (29/30): the phase model's ankle
    /// angle was fit on that point.
    pub fn blazepose_index(&self) -> usize {
        match self {
            Landmark::Nose => 0,
            Landmark::LeftShoulder => 11,
            Landmark::RightShoulder => 12,
            Landmark::LeftHip => 23,
            Landmark::RightHip => 24,
            Landmark::LeftKnee => 25,
            Landmark::RightKnee => 26,
            Landmark::LeftAnkle => 27,
            Landmark::RightAnkle => 28,
            Landmark::LeftToe => 29,
            Landmark::RightToe => 30,
        }
    }

    pub fn shoulder(side: Side) -> Self {
        match side {
            Side::Left => Landmark::LeftShoulder,
            Side::Right => Landmark::RightShoulder,
        }
    }

    pub fn hip(side: Side) -> Self {
        match side {
            Side::Left => Landmark::LeftHip,
            Side::Right => Landmark::RightHip,
        }
    }

    pub fn knee(side: Side) -> Self {
        match side {
            Side::Left => Landmark::LeftKnee,
            Side::Right => Landmark::RightKnee,
        }
    }

    pub fn ankle(side: Side) -> Self {
        match side {
            Side::Left => Landmark::LeftAnkle,
            Side::Right => Landmark::RightAnkle,
        }
    }

    pub fn toe(side: Side) -> Self {
        match side {
            Side::Left => Landmark::LeftToe,
            Side::Right => Landmark::RightToe,
        }
    }

    /// Same point on the other side of the body; the nose maps to itself.
    pub fn mirrored(&self) -> Self {
        match self {
            Landmark::Nose => Landmark::Nose,
            Landmark::LeftShoulder => Landmark::RightShoulder,
            Landmark::RightShoulder => Landmark::LeftShoulder,
            Landmark::LeftHip => Landmark::RightHip,
            Landmark::RightHip => Landmark::LeftHip,
            Landmark::LeftKnee => Landmark::RightKnee,
            Landmark::RightKnee => Landmark::LeftKnee,
            Landmark::LeftAnkle => Landmark::RightAnkle,
            Landmark::RightAnkle => Landmark::LeftAnkle,
            Landmark::LeftToe => Landmark::RightToe,
            Landmark::RightToe => Landmark::LeftToe,
        }
    }
}

/// A single landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    /// Fraction of image width, 0.0..=1.0 when inside the frame.
    pub x: f64,
    /// Fraction of image height, 0.0..=1.0 when inside the frame.
    pub y: f64,
    #[serde(default)]
    pub visibility: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self { x, y, visibility }
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility > threshold
    }

    /// Pixel coordinates, truncated toward zero.
    pub fn to_pixel(&self, width: u32, height: u32) -> PixelPoint {
        PixelPoint {
            x: (self.x * width as f64) as i32,
            y: (self.y * height as f64) as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Landmarks reported for one frame. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: [Option<LandmarkPoint>; Landmark::COUNT],
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, landmark: Landmark, point: LandmarkPoint) -> Self {
        self.insert(landmark, point);
        self
    }

    pub fn insert(&mut self, landmark: Landmark, point: LandmarkPoint) {
        self.points[landmark as usize] = Some(point);
    }

    pub fn get(&self, landmark: Landmark) -> Option<&LandmarkPoint> {
        self.points[landmark as usize].as_ref()
    }

    /// Look up a landmark the pipeline cannot do without.
    pub fn require(&self, landmark: Landmark) -> Result<&LandmarkPoint, FrameError> {
        let point = self
            .get(landmark)
            .ok_or(FrameError::MissingLandmark(landmark.name()))?;
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(FrameError::NonFiniteLandmark {
                name: landmark.name(),
                x: point.x,
                y: point.y,
            });
        }
        Ok(point)
    }

    pub fn visibility(&self, landmark: Landmark) -> f64 {
        self.get(landmark).map(|p| p.visibility).unwrap_or(0.0)
    }

    pub fn is_complete(&self) -> bool {
        self.points.iter().all(Option::is_some)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Landmark, &LandmarkPoint)> {
        Landmark::ALL
            .into_iter()
            .filter_map(|landmark| self.get(landmark).map(|point| (landmark, point)))
    }

    /// Build from a 33-entry BlazePose landmark list.
    pub fn from_blazepose(points: &[LandmarkPoint]) -> Option<Self> {
        let mut set = Self::new();
        for landmark in Landmark::ALL {
            set.insert(landmark, *points.get(landmark.blazepose_index())?);
        }
        Some(set)
    }
}
