//! Synthetic hand generator
//!
//! Builds plausible 21-point hands for a handful of canonical shapes so the
//! engine can be driven without a camera. Shapes are authored in a local
//! frame where the wrist sits at the origin and the wrist → middle-MCP
//! distance is 1.0 with fingers pointing toward -y, then rotated, scaled
//! and translated into normalized camera space.

use crate::landmarks::*;
use aircontrol_env::{HandObservation, Handedness, Landmark, LANDMARK_COUNT};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Canonical hand shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandShape {
    OpenPalm,
    Fist,
    Pinch,
    /// Index + middle extended; combine with a downward roll for TWO_DOWN
    TwoUp,
    Point,
    /// Fingers half bent; matches no static pose
    Relaxed,
}

#[derive(Clone, Copy)]
enum Finger {
    Extended,
    Half,
    Curled,
}

const MCP_LOCAL: [(f64, f64); 4] = [(-0.2, -0.95), (0.0, -1.0), (0.18, -0.95), (0.34, -0.85)];

/// Local (pip, dip, tip) offsets from the MCP.
fn finger_offsets(finger: Finger) -> [(f64, f64); 3] {
    match finger {
        Finger::Extended => [(0.0, -0.35), (0.0, -0.6), (0.0, -0.8)],
        Finger::Half => [(0.0, -0.32), (0.0, -0.42), (0.0, -0.45)],
        Finger::Curled => [(0.0, -0.3), (0.0, -0.15), (0.0, 0.05)],
    }
}

/// Configurable synthetic hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticHand {
    pub shape: HandShape,
    /// Wrist position (normalized image units)
    pub wrist: (f64, f64),
    /// Wrist → middle-MCP length (normalized image units)
    pub scale: f64,
    /// Image-plane angle of the wrist → middle-MCP vector (radians)
    pub roll: f64,
    /// Depth toward the camera; landmarks get `z = -depth`
    pub depth: f64,
}

impl SyntheticHand {
    pub fn new(shape: HandShape) -> Self {
        Self {
            shape,
            wrist: (0.5, 0.7),
            scale: 0.1,
            roll: -FRAC_PI_2,
            depth: 0.0,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.wrist = (x, y);
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn roll(mut self, roll: f64) -> Self {
        self.roll = roll;
        self
    }

    pub fn depth(mut self, depth: f64) -> Self {
        self.depth = depth;
        self
    }

    /// Fingers pointing down the image (TWO_DOWN with `HandShape::TwoUp`).
    pub fn pointing_down(self) -> Self {
        self.roll(FRAC_PI_2)
    }

    fn local_points(&self) -> [(f64, f64); LANDMARK_COUNT] {
        use Finger::*;

        let (fingers, thumb): ([Finger; 4], [(f64, f64); 4]) = match self.shape {
            HandShape::OpenPalm => (
                [Extended; 4],
                [(-0.25, -0.25), (-0.45, -0.45), (-0.6, -0.65), (-0.7, -0.85)],
            ),
            HandShape::Fist => (
                [Curled; 4],
                [(-0.25, -0.25), (-0.4, -0.45), (-0.45, -0.5), (-0.45, -0.55)],
            ),
            HandShape::TwoUp => (
                [Extended, Extended, Curled, Curled],
                [(-0.25, -0.25), (-0.4, -0.45), (-0.45, -0.5), (-0.45, -0.55)],
            ),
            HandShape::Point => (
                [Extended, Curled, Curled, Curled],
                [(-0.25, -0.25), (-0.4, -0.45), (-0.45, -0.5), (-0.45, -0.55)],
            ),
            HandShape::Relaxed => (
                [Half; 4],
                [(-0.25, -0.25), (-0.42, -0.42), (-0.52, -0.52), (-0.6, -0.6)],
            ),
            HandShape::Pinch => (
                [Extended; 4],
                [(-0.25, -0.25), (-0.4, -0.55), (-0.42, -0.95), (-0.32, -1.38)],
            ),
        };

        let mut pts = [(0.0, 0.0); LANDMARK_COUNT];
        pts[WRIST] = (0.0, 0.0);
        pts[THUMB_CMC] = thumb[0];
        pts[THUMB_MCP] = thumb[1];
        pts[THUMB_IP] = thumb[2];
        pts[THUMB_TIP] = thumb[3];

        for (f, &(mcp_id, pip_id, tip_id)) in FINGERS.iter().enumerate() {
            let mcp = MCP_LOCAL[f];
            let [pip, dip, tip] = finger_offsets(fingers[f]);
            pts[mcp_id] = mcp;
            pts[pip_id] = (mcp.0 + pip.0, mcp.1 + pip.1);
            pts[pip_id + 1] = (mcp.0 + dip.0, mcp.1 + dip.1);
            pts[tip_id] = (mcp.0 + tip.0, mcp.1 + tip.1);
        }

        if self.shape == HandShape::Pinch {
            // Index bends toward the thumb
            pts[INDEX_PIP] = (-0.25, -1.3);
            pts[INDEX_DIP] = (-0.32, -1.4);
            pts[INDEX_TIP] = (-0.35, -1.4);
        }

        pts
    }

    /// Landmarks in normalized camera space.
    pub fn landmarks(&self) -> Landmarks {
        // Local frame points fingers along -y, i.e. at angle -π/2
        let theta = self.roll + FRAC_PI_2;
        let (sin, cos) = theta.sin_cos();
        let z = -self.depth;

        let local = self.local_points();
        let mut out = [Landmark::default(); LANDMARK_COUNT];
        for (i, (u, v)) in local.iter().enumerate() {
            let x = (u * cos - v * sin) * self.scale + self.wrist.0;
            let y = (u * sin + v * cos) * self.scale + self.wrist.1;
            out[i] = Landmark::new(x, y, z);
        }
        out
    }

    /// Wraps the landmarks into a tracker observation.
    pub fn observation(&self, handedness: Handedness, confidence: f64) -> HandObservation {
        HandObservation::new(handedness, confidence, self.landmarks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_palm_length_matches_scale() {
        let lm = SyntheticHand::new(HandShape::OpenPalm).scale(0.12).roll(0.7).landmarks();
        assert_relative_eq!(palm_length(&lm), 0.12, epsilon = 1e-12);
        assert_relative_eq!(orientation_angle(&lm), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_depth_sets_z() {
        let lm = SyntheticHand::new(HandShape::Fist).depth(0.2).landmarks();
        assert!(lm.iter().all(|p| (p.z + 0.2).abs() < 1e-12));
    }
}
