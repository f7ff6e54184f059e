//! Joint angle from three 2-D points.
//!
//! The fold/reflect convention below is what the phase model was trained on,
//! so the operation order (clamp, acos, degrees, fold, reflect, round) must not
//! change.

use crate::pose::PixelPoint;

/// Angle at vertex `b` between `a - b` and `c - b`, normalized to [90, 180].
///
/// Returns the angle together with `b` so callers can annotate at the joint.
/// Coincident points count as a fully extended joint (180).
pub fn joint_angle(a: PixelPoint, b: PixelPoint, c: PixelPoint) -> (i32, PixelPoint) {
    let ba = ((a.x - b.x) as f64, (a.y - b.y) as f64);
    let bc = ((c.x - b.x) as f64, (c.y - b.y) as f64);

    let dot = ba.0 * bc.0 + ba.1 * bc.1;
    let norms = ba.0.hypot(ba.1) * bc.0.hypot(bc.1);

    let cosine = if norms > 0.0 {
        (dot / norms).clamp(-1.0, 1.0)
    } else {
        1.0
    };

    let mut angle = cosine.acos().to_degrees();
    if angle > 180.0 {
        angle -= 180.0;
    }
    if angle < 90.0 {
        angle = 180.0 - angle;
    }

    (angle.round_ties_even().abs() as i32, b)
}
