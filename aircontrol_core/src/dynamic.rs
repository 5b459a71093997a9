//! Dynamic gesture detector
//!
//! Looks at a short, time-bounded window of motion states per hand and
//! reports the motion pattern the hand is currently performing, if any.
//!
//! Linear kinds (swipes, push, pull) work in the motion space
//! `(vx, vy, d depth/dt)`: the trailing run of samples that are fast enough
//! and point inside the kind's direction cone must last long enough and
//! travel far enough along the kind's axis. Rotations do the same with the
//! roll angular velocity and the accumulated roll angle.

use crate::gesture::{GestureFeatures, Hand, MotionKind};
use crate::identity::TrackId;
use crate::motion::MotionState;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    /// Window length (default: 300 ms)
    pub window_ms: u64,

    /// Samples needed in the window before anything is reported (default: 4)
    pub min_samples: usize,

    /// Minimum swipe speed, units/s (default: 0.8)
    pub swipe_min_speed: f64,

    /// Minimum swipe travel along its axis (default: 0.12)
    pub swipe_min_displacement: f64,

    /// Minimum depth rate for push/pull, units/s (default: 0.3)
    pub push_pull_min_speed: f64,

    /// Minimum depth travel for push/pull (default: 0.045)
    pub push_pull_min_displacement: f64,

    /// Half-angle of the direction cone (default: 30°)
    pub direction_tolerance_deg: f64,

    /// Minimum length of the qualifying run (default: 80 ms)
    pub min_duration_ms: u64,

    /// Minimum roll rate for rotations, rad/s (default: 3.0)
    pub rotation_min_angular_speed: f64,

    /// Minimum accumulated roll for rotations, rad (default: 0.6)
    pub rotation_min_angle: f64,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            window_ms: 300,
            min_samples: 4,
            swipe_min_speed: 0.8,
            swipe_min_displacement: 0.12,
            push_pull_min_speed: 0.3,
            push_pull_min_displacement: 0.045,
            direction_tolerance_deg: 30.0,
            min_duration_ms: 80,
            rotation_min_angular_speed: 3.0,
            rotation_min_angle: 0.6,
        }
    }
}

/// A detected motion pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionMatch {
    pub kind: MotionKind,
    pub confidence: f64,
    pub features: GestureFeatures,
}

/// Unit axis of a linear kind in `(vx, vy, depth rate)` space; image y grows downward.
fn axis(kind: MotionKind) -> Option<Vector3<f64>> {
    match kind {
        MotionKind::SwipeRight => Some(Vector3::new(1.0, 0.0, 0.0)),
        MotionKind::SwipeLeft => Some(Vector3::new(-1.0, 0.0, 0.0)),
        MotionKind::SwipeUp => Some(Vector3::new(0.0, -1.0, 0.0)),
        MotionKind::SwipeDown => Some(Vector3::new(0.0, 1.0, 0.0)),
        MotionKind::Push => Some(Vector3::new(0.0, 0.0, 1.0)),
        MotionKind::Pull => Some(Vector3::new(0.0, 0.0, -1.0)),
        MotionKind::RotateCw | MotionKind::RotateCcw => None,
    }
}

#[inline]
fn unit_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Final confidence: a barely passing window scores 0.4, a clear one 1.0.
fn combine(speed: f64, displacement: f64, direction: f64) -> f64 {
    0.4 + 0.6 * (0.4 * unit_score(speed) + 0.35 * unit_score(displacement) + 0.25 * unit_score(direction))
}

/// Per-hand sliding-window motion detector.
#[derive(Debug, Clone)]
pub struct DynamicDetector {
    config: DynamicConfig,
    windows: [VecDeque<MotionState>; 2],
    owners: [Option<TrackId>; 2],
}

impl DynamicDetector {
    pub fn new(config: DynamicConfig) -> Self {
        Self {
            config,
            windows: [VecDeque::new(), VecDeque::new()],
            owners: [None, None],
        }
    }

    pub fn config(&self) -> &DynamicConfig {
        &self.config
    }

    /// Forgets the window of one hand.
    pub fn reset(&mut self, hand: Hand) {
        self.windows[hand.index()].clear();
        self.owners[hand.index()] = None;
    }

    pub fn window_len(&self, hand: Hand) -> usize {
        self.windows[hand.index()].len()
    }

    /// Adds a fresh motion state for `hand` and returns the best motion match.
    ///
    /// A different `track` than last time (re-acquired hand) starts an empty window.
    pub fn observe(&mut self, hand: Hand, track: TrackId, state: MotionState) -> Option<MotionMatch> {
        let i = hand.index();
        if self.owners[i] != Some(track) {
            self.windows[i].clear();
            self.owners[i] = Some(track);
        }

        let window = &mut self.windows[i];
        window.push_back(state);
        let horizon = state.timestamp_ms.saturating_sub(self.config.window_ms);
        while window.front().is_some_and(|s| s.timestamp_ms < horizon) {
            window.pop_front();
        }

        self.detect(hand)
    }

    /// Best match over the current window of `hand`.
    pub fn detect(&self, hand: Hand) -> Option<MotionMatch> {
        let window = &self.windows[hand.index()];
        if window.len() < self.config.min_samples.max(2) {
            return None;
        }
        let samples: Vec<&MotionState> = window.iter().collect();

        let mut best: Option<MotionMatch> = None;
        for kind in MotionKind::ALL {
            let found = match axis(kind) {
                Some(a) => self.detect_linear(kind, a, &samples),
                None => self.detect_rotation(kind, &samples),
            };
            if let Some(m) = found {
                // Strictly greater keeps the earlier kind on ties
                if best.map_or(true, |b| m.confidence > b.confidence) {
                    best = Some(m);
                }
            }
        }
        best
    }

    fn detect_linear(&self, kind: MotionKind, axis: Vector3<f64>, samples: &[&MotionState]) -> Option<MotionMatch> {
        let cfg = &self.config;
        let (min_speed, min_disp) = match kind {
            MotionKind::Push | MotionKind::Pull => (cfg.push_pull_min_speed, cfg.push_pull_min_displacement),
            _ => (cfg.swipe_min_speed, cfg.swipe_min_displacement),
        };
        let cos_tol = cfg.direction_tolerance_deg.to_radians().cos();

        // Trailing run of qualifying samples, newest first
        let mut run_start = samples.len();
        let mut peak_speed: f64 = 0.0;
        let mut cos_sum = 0.0;
        for (idx, s) in samples.iter().enumerate().rev() {
            let v = s.motion_vector();
            let speed = v.norm();
            if speed < min_speed || !speed.is_finite() {
                break;
            }
            let cos = v.dot(&axis) / speed;
            if cos < cos_tol {
                break;
            }
            run_start = idx;
            peak_speed = peak_speed.max(speed);
            cos_sum += cos;
        }

        let newest = samples[samples.len() - 1];
        let run_len = samples.len() - run_start;
        if run_len < 2 {
            return None;
        }
        let duration = newest.timestamp_ms.saturating_sub(samples[run_start].timestamp_ms);
        if duration < cfg.min_duration_ms {
            return None;
        }

        // Measure travel from the last sample before the run when there is one
        let origin = samples[run_start.saturating_sub(1)];
        let displacement = (newest.motion_position() - origin.motion_position()).dot(&axis);
        if !(displacement >= min_disp) {
            return None;
        }

        let mean_cos = cos_sum / run_len as f64;
        let confidence = combine(
            peak_speed / min_speed - 1.0,
            displacement / min_disp - 1.0,
            (mean_cos - cos_tol) / (1.0 - cos_tol).max(f64::EPSILON),
        );

        let v = newest.motion_vector();
        let norm = v.norm();
        let direction = if norm > 0.0 { v / norm } else { axis };

        Some(MotionMatch {
            kind,
            confidence,
            features: GestureFeatures {
                speed: peak_speed,
                depth: newest.depth,
                direction: [direction.x, direction.y, direction.z],
            },
        })
    }

    fn detect_rotation(&self, kind: MotionKind, samples: &[&MotionState]) -> Option<MotionMatch> {
        let cfg = &self.config;
        // Image y points down, so a growing angle turns clockwise on screen
        let sign = if kind == MotionKind::RotateCw { 1.0 } else { -1.0 };

        let mut run_start = samples.len();
        let mut peak: f64 = 0.0;
        for (idx, s) in samples.iter().enumerate().rev() {
            let rate = s.angular_velocity * sign;
            if !(rate >= cfg.rotation_min_angular_speed) {
                break;
            }
            run_start = idx;
            peak = peak.max(rate);
        }

        let newest = samples[samples.len() - 1];
        if samples.len() - run_start < 2 {
            return None;
        }
        let duration = newest.timestamp_ms.saturating_sub(samples[run_start].timestamp_ms);
        if duration < cfg.min_duration_ms {
            return None;
        }

        let origin = samples[run_start.saturating_sub(1)];
        let angle = (newest.orientation - origin.orientation) * sign;
        if !(angle >= cfg.rotation_min_angle) {
            return None;
        }

        let confidence = combine(
            peak / cfg.rotation_min_angular_speed - 1.0,
            angle / cfg.rotation_min_angle - 1.0,
            1.0,
        );

        Some(MotionMatch {
            kind,
            confidence,
            features: GestureFeatures {
                speed: peak,
                depth: newest.depth,
                direction: [0.0, 0.0, sign],
            },
        })
    }
}
