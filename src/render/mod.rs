pub mod font;
pub mod overlay;
pub mod video;

pub use overlay::{draw_joint_angles, draw_no_person, draw_phase_banner, draw_skeleton};
pub use video::{GifVideoWriter, VideoSink, VIDEO_EXTENSION, VIDEO_MEDIA_TYPE};
