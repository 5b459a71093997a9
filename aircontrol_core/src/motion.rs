//! The "MOTION" Engine - per-hand smoothing and kinematics
//!
//! Turns the raw anchor position of each tracked hand into a smoothed
//! kinematic state:
//! - Exponential low-pass filter on position (sensor jitter)
//! - Velocity and acceleration by finite differences over the smoothed
//!   history, using frame timestamps rather than frame counts
//! - Depth from the anchor z, smoothed with a wider window
//! - Hand roll (wrist → middle-MCP angle) and its angular velocity

use crate::landmarks::{self, Landmarks};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Which point of the hand drives position and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPoint {
    /// Mean of wrist and the four MCP joints (stable under finger motion)
    #[default]
    PalmCenter,
    /// Index fingertip
    IndexTip,
    Wrist,
}

/// Tunables for the motion filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Smoothing factor for position, (0, 1] (default: 0.35; 1.0 = no smoothing)
    pub position_alpha: f64,

    /// Smoothing factor for velocity/acceleration (default: 0.35)
    pub derivative_alpha: f64,

    /// Smoothing factor for depth, wider window than position (default: 0.15)
    pub depth_alpha: f64,

    /// Smoothing factor for the roll angle (default: 0.5)
    pub orientation_alpha: f64,

    /// Lower bound on dt between two samples (default: 1 ms)
    pub min_dt_ms: u64,

    /// Anchor keypoint (default: palm center)
    pub anchor: AnchorPoint,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            position_alpha: 0.35,
            derivative_alpha: 0.35,
            depth_alpha: 0.15,
            orientation_alpha: 0.5,
            min_dt_ms: 1,
            anchor: AnchorPoint::PalmCenter,
        }
    }
}

// ============================================================================
// MOTION STATE
// ============================================================================

/// Smoothed kinematic state of one hand at one instant.
///
/// The most recent state doubles as the filter's internal state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    /// Frame timestamp this state was computed for
    pub timestamp_ms: u64,

    /// Smoothed anchor position (normalized camera space)
    pub position: Vector3<f64>,

    /// Velocity (units/s)
    pub velocity: Vector3<f64>,

    /// Acceleration (units/s²)
    pub acceleration: Vector3<f64>,

    /// Unsmoothed depth of the latest observation (−z of the anchor)
    pub raw_depth: f64,

    /// Smoothed depth (larger = closer to the camera)
    pub depth: f64,

    /// Rate of change of smoothed depth (units/s)
    pub depth_velocity: f64,

    /// Smoothed, unwrapped roll angle (radians)
    pub orientation: f64,

    /// Roll rate (rad/s, positive = clockwise on screen)
    pub angular_velocity: f64,
}

impl MotionState {
    /// Magnitude of the 3D velocity.
    #[inline]
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Magnitude of the acceleration.
    #[inline]
    pub fn acceleration_magnitude(&self) -> f64 {
        self.acceleration.norm()
    }

    /// Image-plane motion plus depth rate: `(vx, vy, d depth/dt)`.
    ///
    /// Dynamic gestures are matched against axes in this space so push/pull
    /// use the dedicated depth estimate instead of the raw z velocity.
    #[inline]
    pub fn motion_vector(&self) -> Vector3<f64> {
        Vector3::new(self.velocity.x, self.velocity.y, self.depth_velocity)
    }

    /// Image-plane position plus depth: `(x, y, depth)`.
    #[inline]
    pub fn motion_position(&self) -> Vector3<f64> {
        Vector3::new(self.position.x, self.position.y, self.depth)
    }

    fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.acceleration.iter().all(|v| v.is_finite())
            && self.depth.is_finite()
            && self.depth_velocity.is_finite()
            && self.orientation.is_finite()
            && self.angular_velocity.is_finite()
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[inline]
fn lerp(a: f64, b: f64, alpha: f64) -> f64 {
    a * (1.0 - alpha) + b * alpha
}

#[inline]
fn lerp_vec(a: &Vector3<f64>, b: &Vector3<f64>, alpha: f64) -> Vector3<f64> {
    a * (1.0 - alpha) + b * alpha
}

/// Exponential smoothing filter for one hand.
#[derive(Debug, Clone)]
pub struct MotionFilter {
    config: MotionConfig,
    last: Option<MotionState>,
}

impl MotionFilter {
    pub fn new(config: MotionConfig) -> Self {
        Self { config, last: None }
    }

    /// Last computed state, if any sample has been seen.
    pub fn last(&self) -> Option<&MotionState> {
        self.last.as_ref()
    }

    /// Forgets all history (fresh identity).
    pub fn reset(&mut self) {
        self.last = None;
    }

    fn anchor(&self, landmarks: &Landmarks) -> Vector3<f64> {
        match self.config.anchor {
            AnchorPoint::PalmCenter => landmarks::palm_center(landmarks),
            AnchorPoint::IndexTip => landmarks::point(&landmarks[landmarks::INDEX_TIP]),
            AnchorPoint::Wrist => landmarks::point(&landmarks[landmarks::WRIST]),
        }
    }

    /// Feeds one observation and returns the new smoothed state.
    ///
    /// Returns `None` and keeps the previous state if any resulting value is
    /// non-finite, including on the first sample.
    pub fn update(&mut self, landmarks: &Landmarks, timestamp_ms: u64) -> Option<MotionState> {
        let raw_position = self.anchor(landmarks);
        let raw_depth = -raw_position.z;
        let raw_orientation = landmarks::orientation_angle(landmarks);

        let prev = match self.last {
            Some(prev) => prev,
            None => {
                let first = MotionState {
                    timestamp_ms,
                    position: raw_position,
                    velocity: Vector3::zeros(),
                    acceleration: Vector3::zeros(),
                    raw_depth,
                    depth: raw_depth,
                    depth_velocity: 0.0,
                    orientation: raw_orientation,
                    angular_velocity: 0.0,
                };
                if !first.is_finite() {
                    return None;
                }
                self.last = Some(first);
                return Some(first);
            }
        };

        let cfg = &self.config;
        let dt_ms = timestamp_ms.saturating_sub(prev.timestamp_ms).max(cfg.min_dt_ms.max(1));
        let dt = dt_ms as f64 / 1000.0;

        // Position → velocity → acceleration over the smoothed history
        let position = lerp_vec(&prev.position, &raw_position, cfg.position_alpha);
        let raw_velocity = (position - prev.position) / dt;
        let velocity = lerp_vec(&prev.velocity, &raw_velocity, cfg.derivative_alpha);
        let raw_acceleration = (velocity - prev.velocity) / dt;
        let acceleration = lerp_vec(&prev.acceleration, &raw_acceleration, cfg.derivative_alpha);

        // Depth uses its own, wider window
        let depth = lerp(prev.depth, raw_depth, cfg.depth_alpha);
        let depth_velocity = lerp(
            prev.depth_velocity,
            (depth - prev.depth) / dt,
            cfg.derivative_alpha,
        );

        // Unwrap the roll angle against the previous estimate
        let unwrapped = prev.orientation + landmarks::wrap_angle(raw_orientation - prev.orientation);
        let orientation = lerp(prev.orientation, unwrapped, cfg.orientation_alpha);
        let angular_velocity = lerp(
            prev.angular_velocity,
            (orientation - prev.orientation) / dt,
            cfg.derivative_alpha,
        );

        let next = MotionState {
            timestamp_ms,
            position,
            velocity,
            acceleration,
            raw_depth,
            depth,
            depth_velocity,
            orientation,
            angular_velocity,
        };

        if !next.is_finite() {
            return None;
        }

        self.last = Some(next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{HandShape, SyntheticHand};
    use approx::assert_relative_eq;

    fn hand_at(x: f64, y: f64) -> Landmarks {
        SyntheticHand::new(HandShape::OpenPalm).at(x, y).landmarks()
    }

    #[test]
    fn test_first_sample_has_zero_derivatives() {
        let mut filter = MotionFilter::new(MotionConfig::default());
        let state = filter.update(&hand_at(0.5, 0.5), 0).unwrap();

        assert_relative_eq!(state.velocity.norm(), 0.0);
        assert_relative_eq!(state.acceleration.norm(), 0.0);
        assert_relative_eq!(state.depth, state.raw_depth);
    }

    #[test]
    fn test_stationary_hand_stays_still() {
        let mut filter = MotionFilter::new(MotionConfig::default());
        let lm = hand_at(0.4, 0.6);
        let first = filter.update(&lm, 0).unwrap();

        let mut last = first;
        for i in 1..30 {
            last = filter.update(&lm, i * 33).unwrap();
        }

        assert_relative_eq!(last.position, first.position, epsilon = 1e-12);
        assert!(last.speed() < 1e-9);
    }

    #[test]
    fn test_velocity_sign_follows_motion() {
        let mut filter = MotionFilter::new(MotionConfig::default());
        let mut state = filter.update(&hand_at(0.2, 0.5), 0).unwrap();
        for i in 1..10 {
            state = filter.update(&hand_at(0.2 + 0.02 * i as f64, 0.5), i * 33).unwrap();
        }

        assert!(state.velocity.x > 0.0, "moving +x must give positive vx");
        assert!(state.velocity.y.abs() < 1e-9);
    }

    #[test]
    fn test_dt_uses_timestamps_not_frame_count() {
        // Same displacement per frame, twice the frame interval → half the speed
        let run = |interval: u64| {
            let mut filter = MotionFilter::new(MotionConfig {
                position_alpha: 1.0,
                derivative_alpha: 1.0,
                ..Default::default()
            });
            filter.update(&hand_at(0.2, 0.5), 0).unwrap();
            filter.update(&hand_at(0.25, 0.5), interval).unwrap().velocity.x
        };

        let fast = run(20);
        let slow = run(40);
        assert_relative_eq!(fast, 2.0 * slow, epsilon = 1e-9);
    }

    #[test]
    fn test_depth_smoothed_more_than_position() {
        let mut filter = MotionFilter::new(MotionConfig::default());
        let near = SyntheticHand::new(HandShape::OpenPalm).at(0.5, 0.5).depth(0.0).landmarks();
        let far = SyntheticHand::new(HandShape::OpenPalm).at(0.6, 0.5).depth(0.1).landmarks();

        let a = filter.update(&near, 0).unwrap();
        let b = filter.update(&far, 33).unwrap();

        let pos_fraction = (b.position.x - a.position.x) / 0.1;
        let depth_fraction = (b.depth - a.depth) / (b.raw_depth - a.raw_depth);
        assert!(depth_fraction < pos_fraction);
    }

    #[test]
    fn test_orientation_unwraps_across_pi() {
        let mut filter = MotionFilter::new(MotionConfig {
            orientation_alpha: 1.0,
            ..Default::default()
        });
        // Roll the hand steadily past the ±π seam
        let mut last = None;
        for i in 0..40 {
            let roll = 2.5 + 0.05 * i as f64;
            let lm = SyntheticHand::new(HandShape::OpenPalm).at(0.5, 0.5).roll(roll).landmarks();
            let state = filter.update(&lm, i * 33).unwrap();
            if let Some(prev) = last {
                let step: f64 = state.orientation - prev;
                assert!(step.abs() < 0.1, "orientation jumped by {}", step);
            }
            last = Some(state.orientation);
        }
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut filter = MotionFilter::new(MotionConfig::default());
        filter.update(&hand_at(0.2, 0.5), 0).unwrap();
        filter.reset();
        assert!(filter.last().is_none());

        let state = filter.update(&hand_at(0.8, 0.5), 33).unwrap();
        assert_relative_eq!(state.velocity.norm(), 0.0);
    }

    #[test]
    fn test_overflowing_first_sample_rejected() {
        let mut filter = MotionFilter::new(MotionConfig::default());
        let mut huge = hand_at(0.5, 0.5);
        for lm in huge.iter_mut() {
            lm.x = 1.7e308;
        }

        // Palm-center mean overflows: no state is stored
        assert!(filter.update(&huge, 0).is_none());
        assert!(filter.last().is_none());

        let state = filter.update(&hand_at(0.5, 0.5), 33).unwrap();
        assert!(state.position.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_non_finite_step_keeps_previous_state() {
        let mut filter = MotionFilter::new(MotionConfig::default());
        let first = filter.update(&hand_at(0.5, 0.5), 0).unwrap();

        let mut huge = hand_at(0.5, 0.5);
        for lm in huge.iter_mut() {
            lm.y = 1.7e308;
        }
        assert!(filter.update(&huge, 33).is_none());
        assert_eq!(filter.last(), Some(&first));
    }
}
