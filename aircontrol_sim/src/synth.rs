//! Scripted hands and the noisy sensor that observes them.
//!
//! A [`HandScript`] is the ground truth: a sequence of timed segments that
//! hold, translate, roll or push a synthetic hand. [`FrameSynth`] samples the
//! scripts at a fixed frame rate and corrupts the result the way a real
//! landmark model does (jitter, label flicker, NaN dropouts), all drawn from a
//! single seeded RNG.

use aircontrol_core::synthetic::{HandShape, SyntheticHand};
use aircontrol_env::{HandObservation, Handedness, LandmarkFrame};
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// What a hand does during one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentMotion {
    Hold,
    /// Linear move of the wrist to `to` over the segment
    Move { to: [f64; 2] },
    /// Roll change in radians (positive = clockwise on screen)
    Rotate { by: f64 },
    /// Depth change (positive = toward the camera)
    Push { by: f64 },
    /// Hand out of view
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub shape: HandShape,
    pub duration_ms: u64,
    pub motion: SegmentMotion,
}

/// Ground-truth timeline of one hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandScript {
    pub label: Handedness,
    pub start: SyntheticHand,
    pub segments: Vec<Segment>,
}

impl HandScript {
    pub fn new(label: Handedness, start: SyntheticHand) -> Self {
        Self {
            label,
            start,
            segments: Vec::new(),
        }
    }

    fn push(mut self, shape: HandShape, duration_ms: u64, motion: SegmentMotion) -> Self {
        self.segments.push(Segment {
            shape,
            duration_ms,
            motion,
        });
        self
    }

    pub fn hold(self, shape: HandShape, duration_ms: u64) -> Self {
        self.push(shape, duration_ms, SegmentMotion::Hold)
    }

    pub fn move_to(self, shape: HandShape, x: f64, y: f64, duration_ms: u64) -> Self {
        self.push(shape, duration_ms, SegmentMotion::Move { to: [x, y] })
    }

    pub fn rotate(self, shape: HandShape, by: f64, duration_ms: u64) -> Self {
        self.push(shape, duration_ms, SegmentMotion::Rotate { by })
    }

    pub fn push_depth(self, shape: HandShape, by: f64, duration_ms: u64) -> Self {
        self.push(shape, duration_ms, SegmentMotion::Push { by })
    }

    pub fn absent(self, duration_ms: u64) -> Self {
        let shape = self.start.shape;
        self.push(shape, duration_ms, SegmentMotion::Absent)
    }

    pub fn duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }

    /// The hand at `t_ms` into the script, or `None` while absent or after
    /// the last segment.
    pub fn pose_at(&self, t_ms: u64) -> Option<SyntheticHand> {
        let mut hand = self.start;
        let mut elapsed = 0;

        for segment in &self.segments {
            let end = elapsed + segment.duration_ms;
            let inside = t_ms < end;
            let fraction = if inside {
                (t_ms - elapsed) as f64 / segment.duration_ms.max(1) as f64
            } else {
                1.0
            };

            hand.shape = segment.shape;
            match segment.motion {
                SegmentMotion::Hold => {}
                SegmentMotion::Move { to } => {
                    let from = Vector2::new(hand.wrist.0, hand.wrist.1);
                    let p = from.lerp(&Vector2::new(to[0], to[1]), fraction);
                    hand.wrist = (p.x, p.y);
                }
                SegmentMotion::Rotate { by } => hand.roll += by * fraction,
                SegmentMotion::Push { by } => hand.depth += by * fraction,
                SegmentMotion::Absent => {
                    if inside {
                        return None;
                    }
                }
            }
            if inside {
                return Some(hand);
            }
            elapsed = end;
        }
        None
    }
}

/// Both hands of a scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureScript {
    pub hands: Vec<HandScript>,
}

impl GestureScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hand(mut self, hand: HandScript) -> Self {
        self.hands.push(hand);
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.hands.iter().map(HandScript::duration_ms).max().unwrap_or(0)
    }
}

/// Sensor corruption applied to every observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Gaussian jitter on every coordinate (default: 0.0)
    pub position_std: f64,

    /// Chance an observation reports the wrong label at low confidence (default: 0.0)
    pub flicker_prob: f64,

    /// Chance an observation carries a NaN landmark (default: 0.0)
    pub nan_prob: f64,

    /// Handedness confidence of clean observations (default: 0.95)
    pub confidence: f64,

    /// Handedness confidence of flickered observations (default: 0.4)
    pub flicker_confidence: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            position_std: 0.0,
            flicker_prob: 0.0,
            nan_prob: 0.0,
            confidence: 0.95,
            flicker_confidence: 0.4,
        }
    }
}

impl NoiseConfig {
    pub fn with_jitter(mut self, std: f64) -> Self {
        self.position_std = std;
        self
    }

    pub fn with_flicker(mut self, prob: f64) -> Self {
        self.flicker_prob = prob;
        self
    }

    pub fn with_nan(mut self, prob: f64) -> Self {
        self.nan_prob = prob;
        self
    }
}

/// Samples scripts into landmark frames.
pub struct FrameSynth {
    rng: ChaCha8Rng,
    noise: NoiseConfig,
    jitter: Option<Normal<f64>>,
    fps: u32,
}

impl FrameSynth {
    pub fn new(seed: u64, fps: u32, noise: NoiseConfig) -> Self {
        let jitter = (noise.position_std > 0.0)
            .then(|| Normal::new(0.0, noise.position_std).ok())
            .flatten();
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise,
            jitter,
            fps: fps.max(1),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Capture time of frame `sequence`.
    pub fn timestamp_ms(&self, sequence: u64) -> u64 {
        sequence * 1000 / self.fps as u64
    }

    /// Number of frames that cover `duration_ms`.
    pub fn frame_count(&self, duration_ms: u64) -> u64 {
        (duration_ms * self.fps as u64).div_ceil(1000)
    }

    /// Frame `sequence`, sampling `script` at `t_ms` into it.
    pub fn frame(&mut self, script: &GestureScript, sequence: u64, t_ms: u64) -> LandmarkFrame {
        let mut frame = LandmarkFrame::new(sequence, self.timestamp_ms(sequence));
        for hand in &script.hands {
            if let Some(pose) = hand.pose_at(t_ms) {
                frame.hands.push(self.observe(hand.label, &pose));
            }
        }
        frame
    }

    fn observe(&mut self, label: Handedness, pose: &SyntheticHand) -> HandObservation {
        let mut obs = pose.observation(label, self.noise.confidence);

        if let Some(normal) = self.jitter {
            for point in obs.landmarks.iter_mut() {
                point.x += normal.sample(&mut self.rng);
                point.y += normal.sample(&mut self.rng);
                point.z += normal.sample(&mut self.rng);
            }
        }
        if self.noise.flicker_prob > 0.0 && self.rng.gen_bool(self.noise.flicker_prob.min(1.0)) {
            obs.handedness = match label {
                Handedness::Left => Handedness::Right,
                Handedness::Right => Handedness::Left,
                Handedness::Unknown => Handedness::Unknown,
            };
            obs.confidence = self.noise.flicker_confidence;
        }
        if self.noise.nan_prob > 0.0 && self.rng.gen_bool(self.noise.nan_prob.min(1.0)) {
            let index = self.rng.gen_range(0..obs.landmarks.len());
            obs.landmarks[index].y = f64::NAN;
        }
        obs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swipe() -> HandScript {
        HandScript::new(Handedness::Right, SyntheticHand::new(HandShape::OpenPalm).at(0.2, 0.6))
            .hold(HandShape::OpenPalm, 100)
            .move_to(HandShape::OpenPalm, 0.8, 0.6, 200)
            .absent(100)
            .hold(HandShape::Fist, 100)
    }

    #[test]
    fn test_pose_interpolates_segments() {
        let script = swipe();
        assert_eq!(script.duration_ms(), 500);

        assert_eq!(script.pose_at(50).unwrap().wrist, (0.2, 0.6));
        let mid = script.pose_at(200).unwrap();
        assert!((mid.wrist.0 - 0.5).abs() < 1e-12);
        assert!(script.pose_at(350).is_none());

        let last = script.pose_at(450).unwrap();
        assert_eq!(last.shape, HandShape::Fist);
        assert!((last.wrist.0 - 0.8).abs() < 1e-12);
        assert!(script.pose_at(500).is_none());
    }

    #[test]
    fn test_same_seed_same_frames() {
        let script = GestureScript::new().with_hand(swipe());
        let noise = NoiseConfig::default().with_jitter(0.003).with_flicker(0.2);

        let mut a = FrameSynth::new(9, 30, noise);
        let mut b = FrameSynth::new(9, 30, noise);
        for seq in 0..15 {
            let t = a.timestamp_ms(seq);
            assert_eq!(a.frame(&script, seq, t), b.frame(&script, seq, t));
        }
    }

    #[test]
    fn test_nan_injection() {
        let script = GestureScript::new().with_hand(swipe());
        let mut synth = FrameSynth::new(1, 30, NoiseConfig::default().with_nan(1.0));

        let frame = synth.frame(&script, 0, 0);
        assert!(!frame.hands[0].is_finite());
    }

    #[test]
    fn test_frame_timing() {
        let synth = FrameSynth::new(0, 30, NoiseConfig::default());
        assert_eq!(synth.timestamp_ms(3), 100);
        assert_eq!(synth.frame_count(1000), 30);
        assert_eq!(synth.frame_count(333), 10);
    }
}
