//! Annotation layer burned into every output frame.

use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut},
    rect::Rect,
};

use crate::gait::{BilateralResult, Joint, JointAngle};
use crate::pose::{Landmark, LandmarkSet, Side};

use super::font::{draw_text, text_size};

const LINE_COLOR: Rgb<u8> = Rgb([40, 140, 130]);
const POINT_COLOR: Rgb<u8> = Rgb([56, 218, 205]);
const WARNING_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BANNER_FILL: Rgb<u8> = Rgb([255, 255, 255]);
const BANNER_INK: Rgb<u8> = Rgb([0, 0, 0]);

const TEXT_SCALE: u32 = 2;
const STROKE: u32 = 3;
const JOINT_RADIUS: i32 = (STROKE * 2) as i32;
const BANNER_ORIGIN: i32 = 5;
const BANNER_MAX_RIGHT: i32 = 600;

pub const NO_PERSON_WARNING: &str = "PERSON OUT OF FRAME";

const CONNECTIONS: [(Landmark, Landmark); 10] = [
    (Landmark::LeftShoulder, Landmark::RightShoulder),
    (Landmark::LeftHip, Landmark::RightHip),
    (Landmark::LeftShoulder, Landmark::LeftHip),
    (Landmark::RightShoulder, Landmark::RightHip),
    (Landmark::LeftHip, Landmark::LeftKnee),
    (Landmark::RightHip, Landmark::RightKnee),
    (Landmark::LeftKnee, Landmark::LeftAnkle),
    (Landmark::RightKnee, Landmark::RightAnkle),
    (Landmark::LeftAnkle, Landmark::LeftToe),
    (Landmark::RightAnkle, Landmark::RightToe),
];

fn joint_color(angle: &JointAngle) -> Rgb<u8> {
    match (angle.side, angle.joint) {
        (Side::Right, Joint::Hip) => Rgb([30, 180, 200]),
        (Side::Right, Joint::Knee) => Rgb([30, 120, 200]),
        (Side::Right, Joint::Ankle) => Rgb([30, 60, 200]),
        (Side::Left, Joint::Hip) => Rgb([200, 180, 30]),
        (Side::Left, Joint::Knee) => Rgb([200, 120, 30]),
        (Side::Left, Joint::Ankle) => Rgb([200, 60, 30]),
    }
}

/// Red warning across the middle of a frame with nobody detected.
pub fn draw_no_person(image: &mut RgbImage) {
    let (width, height) = image.dimensions();
    let scale = TEXT_SCALE + 1;
    let (_, text_h) = text_size(NO_PERSON_WARNING, scale);
    let x = (width / 4) as i32;
    let y = (height / 2) as i32 - text_h as i32;
    draw_text(image, x, y, NO_PERSON_WARNING, WARNING_COLOR, scale);
}

/// Connections and points for landmarks the estimator is confident about.
pub fn draw_skeleton(image: &mut RgbImage, landmarks: &LandmarkSet, visibility_threshold: f64) {
    let (width, height) = image.dimensions();
    let visible = |landmark: Landmark| {
        landmarks
            .get(landmark)
            .filter(|p| p.visibility >= visibility_threshold && p.x.is_finite() && p.y.is_finite())
            .map(|p| p.to_pixel(width, height))
    };

    for (from, to) in CONNECTIONS {
        if let (Some(a), Some(b)) = (visible(from), visible(to)) {
            for offset in -1..=1 {
                let o = offset as f32;
                draw_line_segment_mut(
                    image,
                    (a.x as f32 + o, a.y as f32),
                    (b.x as f32 + o, b.y as f32),
                    LINE_COLOR,
                );
            }
        }
    }

    for landmark in Landmark::ALL {
        if let Some(p) = visible(landmark) {
            draw_filled_circle_mut(image, (p.x, p.y), STROKE as i32, POINT_COLOR);
        }
    }
}

/// A dot at every measured joint with its value beside it: right-side values
/// to the right of the joint, left-side values to the left.
pub fn draw_joint_angles(image: &mut RgbImage, result: &BilateralResult) {
    let width = image.width() as f64;
    let right_offset = (width / 55.0).round() as i32;
    let left_offset = -(width / 17.0).round() as i32;

    for angle in result.angles() {
        let color = joint_color(angle);
        let anchor = angle.anchor;
        draw_filled_circle_mut(image, (anchor.x, anchor.y), JOINT_RADIUS, color);

        let text = angle.degrees.to_string();
        let (_, text_h) = text_size(&text, TEXT_SCALE);
        let dx = match angle.side {
            Side::Right => right_offset,
            Side::Left => left_offset,
        };
        // Baseline sits one pixel above the joint.
        draw_text(
            image,
            anchor.x + dx,
            anchor.y - 1 - text_h as i32,
            &text,
            color,
            TEXT_SCALE,
        );
    }
}

/// Banner rectangle in the top-left corner: `(x, y, width, height)`.
pub fn banner_rect(image_width: u32, label: &str) -> (i32, i32, u32, u32) {
    let (_, text_h) = text_size(label, TEXT_SCALE);
    let right = BANNER_MAX_RIGHT.min(image_width as i32 - BANNER_ORIGIN - 1);
    let bottom = ((image_width as f64 / 24.0).round() as i32).max(BANNER_ORIGIN + text_h as i32 + 10);
    let width = (right - BANNER_ORIGIN).max(1) as u32;
    let height = (bottom - BANNER_ORIGIN).max(1) as u32;
    (BANNER_ORIGIN, BANNER_ORIGIN, width, height)
}

/// Predicted phase centered in a white, black-bordered banner.
pub fn draw_phase_banner(image: &mut RgbImage, label: &str) {
    let (x, y, width, height) = banner_rect(image.width(), label);
    let rect = Rect::at(x, y).of_size(width, height);
    draw_filled_rect_mut(image, rect, BANNER_FILL);
    for inset in 0..STROKE as i32 {
        let w = width as i32 - 2 * inset;
        let h = height as i32 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(x + inset, y + inset).of_size(w as u32, h as u32),
            BANNER_INK,
        );
    }

    let (text_w, text_h) = text_size(label, TEXT_SCALE);
    let center_x = x + width as i32 / 2;
    let center_y = y + height as i32 / 2;
    draw_text(
        image,
        center_x - text_w as i32 / 2,
        center_y - text_h as i32 / 2,
        label,
        BANNER_INK,
        TEXT_SCALE,
    );
}
