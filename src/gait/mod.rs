pub mod classifier;
pub mod features;
pub mod geometry;
pub mod phase;

pub use classifier::{FeatureScaler, LinearPhaseModel, PhaseClassifier};
pub use features::{BilateralExtractor, BilateralResult, FeatureVector, Joint, JointAngle, SideAngles};
pub use geometry::joint_angle;
pub use phase::{GaitPhase, PhaseAnnotator, PhaseLabel};
