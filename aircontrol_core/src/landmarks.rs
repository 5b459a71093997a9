//! Hand landmark indices and small geometry helpers.
//!
//! Indices follow the 21-point MediaPipe hand topology.

use aircontrol_env::{Landmark, LANDMARK_COUNT};
use nalgebra::Vector3;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// (MCP, PIP, TIP) triples for the four non-thumb fingers.
pub const FINGERS: [(usize, usize, usize); 4] = [
    (INDEX_MCP, INDEX_PIP, INDEX_TIP),
    (MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP),
    (RING_MCP, RING_PIP, RING_TIP),
    (PINKY_MCP, PINKY_PIP, PINKY_TIP),
];

pub type Landmarks = [Landmark; LANDMARK_COUNT];

#[inline]
pub fn point(lm: &Landmark) -> Vector3<f64> {
    Vector3::new(lm.x, lm.y, lm.z)
}

/// Image-plane (x, y) distance between two keypoints.
#[inline]
pub fn planar_distance(a: &Landmark, b: &Landmark) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Mean of the wrist and the four finger MCP joints.
pub fn palm_center(landmarks: &Landmarks) -> Vector3<f64> {
    let ids = [WRIST, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];
    let sum = ids
        .iter()
        .fold(Vector3::zeros(), |acc, &i| acc + point(&landmarks[i]));
    sum / ids.len() as f64
}

/// Wrist to middle-MCP distance, the scale every pose measure is divided by.
#[inline]
pub fn palm_length(landmarks: &Landmarks) -> f64 {
    planar_distance(&landmarks[WRIST], &landmarks[MIDDLE_MCP])
}

/// Image-plane angle (radians) of the wrist → middle-MCP vector.
#[inline]
pub fn orientation_angle(landmarks: &Landmarks) -> f64 {
    let w = &landmarks[WRIST];
    let m = &landmarks[MIDDLE_MCP];
    (m.y - w.y).atan2(m.x - w.x)
}

/// Wraps an angle into (-π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    use std::f64::consts::PI;
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(0.5), 0.5);
        assert_relative_eq!(wrap_angle(PI + 0.1), -PI + 0.1, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-PI - 0.1), PI - 0.1, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(4.0 * PI + 0.2), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_palm_length_and_orientation() {
        let mut lm = [Landmark::default(); LANDMARK_COUNT];
        lm[WRIST] = Landmark::new(0.5, 0.6, 0.0);
        lm[MIDDLE_MCP] = Landmark::new(0.5, 0.5, 0.0);

        assert_relative_eq!(palm_length(&lm), 0.1, epsilon = 1e-12);
        // Fingers pointing up the image (y decreasing)
        assert_relative_eq!(orientation_angle(&lm), -PI / 2.0, epsilon = 1e-12);
    }
}
