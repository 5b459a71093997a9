//! Static pose classifier
//!
//! Pure function of one frame's landmarks. Every measure is divided by the
//! palm length so the same thresholds hold at any distance from the camera.

use crate::gesture::StaticPose;
use crate::landmarks::*;
use serde::{Deserialize, Serialize};

/// Geometric thresholds, all relative to palm length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    /// Thumb-tip/index-tip distance below which the hand pinches (default: 0.35)
    pub pinch_ratio: f64,

    /// Margin past `pinch_ratio` that maps to full confidence (default: 0.15)
    pub pinch_span: f64,

    /// Extension ratio above which a finger counts as extended (default: 1.15)
    pub extended_ratio: f64,

    /// Extension ratio below which a finger counts as curled (default: 1.0)
    pub curled_ratio: f64,

    /// Margin past either extension threshold that maps to full confidence (default: 0.15)
    pub extension_span: f64,

    /// Minimum |cos| between finger direction and the image vertical (default: 0.5)
    pub vertical_cos: f64,

    /// Margin past `vertical_cos` that maps to full confidence (default: 0.3)
    pub vertical_span: f64,

    /// Palm length below which the hand is too small to classify (default: 1e-4)
    pub min_palm_length: f64,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            pinch_ratio: 0.35,
            pinch_span: 0.15,
            extended_ratio: 1.15,
            curled_ratio: 1.0,
            extension_span: 0.15,
            vertical_cos: 0.5,
            vertical_span: 0.3,
            min_palm_length: 1e-4,
        }
    }
}

/// One classified pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMatch {
    pub pose: StaticPose,
    pub confidence: f64,
}

/// Normalized per-finger measures used by every rule.
#[derive(Debug, Clone, Copy)]
struct HandGeometry {
    /// Signed margins past the extended threshold (index, middle, ring, pinky)
    extended: [f64; 4],
    /// Signed margins past the curled threshold
    curled: [f64; 4],
    /// Signed margin past the pinch threshold
    pinch: f64,
    /// Mean "up-ness" of index and middle fingers in [-1, 1]
    up: f64,
}

fn confidence(margin: f64) -> Option<f64> {
    if margin.is_finite() && margin >= 0.0 {
        Some(0.5 + 0.5 * margin.min(1.0))
    } else {
        None
    }
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Classifier for per-frame static poses.
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    config: StaticConfig,
}

impl StaticClassifier {
    pub fn new(config: StaticConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StaticConfig {
        &self.config
    }

    fn geometry(&self, lm: &Landmarks) -> Option<HandGeometry> {
        let cfg = &self.config;
        let palm = palm_length(lm);
        if !palm.is_finite() || palm < cfg.min_palm_length {
            return None;
        }

        let wrist = &lm[WRIST];
        let mut extended = [0.0; 4];
        let mut curled = [0.0; 4];
        for (i, &(_, pip, tip)) in FINGERS.iter().enumerate() {
            let to_pip = planar_distance(wrist, &lm[pip]);
            if to_pip < cfg.min_palm_length {
                return None;
            }
            let ratio = planar_distance(wrist, &lm[tip]) / to_pip;
            extended[i] = (ratio - cfg.extended_ratio) / cfg.extension_span;
            curled[i] = (cfg.curled_ratio - ratio) / cfg.extension_span;
        }

        let pinch_dist = planar_distance(&lm[THUMB_TIP], &lm[INDEX_TIP]) / palm;
        let pinch = (cfg.pinch_ratio - pinch_dist) / cfg.pinch_span;

        // Image y grows downward, so "up" is -y
        let mut up = 0.0;
        for &(mcp, _, tip) in &FINGERS[..2] {
            let dx = lm[tip].x - lm[mcp].x;
            let dy = lm[tip].y - lm[mcp].y;
            let len = (dx * dx + dy * dy).sqrt();
            if len > 0.0 {
                up += -dy / len;
            }
        }
        up /= 2.0;

        Some(HandGeometry {
            extended,
            curled,
            pinch,
            up,
        })
    }

    /// Every pose that matches, ranked by confidence (ties by pose priority).
    ///
    /// Degenerate geometry (collapsed palm) yields nothing.
    pub fn classify(&self, landmarks: &Landmarks) -> Vec<PoseMatch> {
        let Some(g) = self.geometry(landmarks) else {
            return Vec::new();
        };
        let cfg = &self.config;
        let [ext_i, ext_m, _, _] = g.extended;
        let [_, cur_m, cur_r, cur_p] = g.curled;
        let up_margin = (g.up - cfg.vertical_cos) / cfg.vertical_span;
        let down_margin = (-g.up - cfg.vertical_cos) / cfg.vertical_span;

        let two_fingers = min_of(&[ext_i, ext_m, cur_r, cur_p]);

        let margins = [
            (StaticPose::Pinch, g.pinch),
            (StaticPose::Fist, min_of(&g.curled)),
            (StaticPose::OpenPalm, min_of(&g.extended)),
            (StaticPose::TwoUp, two_fingers.min(up_margin)),
            (StaticPose::TwoDown, two_fingers.min(down_margin)),
            (StaticPose::Point, min_of(&[ext_i, cur_m, cur_r, cur_p])),
        ];

        let mut matches: Vec<PoseMatch> = margins
            .iter()
            .filter_map(|&(pose, margin)| {
                confidence(margin).map(|confidence| PoseMatch { pose, confidence })
            })
            .collect();

        // Stable sort keeps the priority order for equal confidences
        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.pose.index().cmp(&b.pose.index()))
        });

        matches
    }

    /// The best pose, if any.
    pub fn best(&self, landmarks: &Landmarks) -> Option<PoseMatch> {
        self.classify(landmarks).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{HandShape, SyntheticHand};
    use aircontrol_env::{Landmark, LANDMARK_COUNT};

    fn best(hand: SyntheticHand) -> Option<StaticPose> {
        StaticClassifier::default().best(&hand.landmarks()).map(|m| m.pose)
    }

    #[test]
    fn test_canonical_shapes() {
        assert_eq!(best(SyntheticHand::new(HandShape::OpenPalm)), Some(StaticPose::OpenPalm));
        assert_eq!(best(SyntheticHand::new(HandShape::Fist)), Some(StaticPose::Fist));
        assert_eq!(best(SyntheticHand::new(HandShape::Pinch)), Some(StaticPose::Pinch));
        assert_eq!(best(SyntheticHand::new(HandShape::TwoUp)), Some(StaticPose::TwoUp));
        assert_eq!(
            best(SyntheticHand::new(HandShape::TwoUp).pointing_down()),
            Some(StaticPose::TwoDown)
        );
        assert_eq!(best(SyntheticHand::new(HandShape::Point)), Some(StaticPose::Point));
        assert_eq!(best(SyntheticHand::new(HandShape::Relaxed)), None);
    }

    #[test]
    fn test_scale_invariance() {
        for scale in [0.04, 0.1, 0.25] {
            let hand = SyntheticHand::new(HandShape::Pinch).scale(scale);
            assert_eq!(best(hand), Some(StaticPose::Pinch), "scale {}", scale);
        }
    }

    #[test]
    fn test_confidence_in_unit_range() {
        let classifier = StaticClassifier::default();
        for shape in [HandShape::OpenPalm, HandShape::Fist, HandShape::TwoUp, HandShape::Point] {
            for m in classifier.classify(&SyntheticHand::new(shape).roll(0.3).landmarks()) {
                assert!((0.5..=1.0).contains(&m.confidence));
            }
        }
    }

    #[test]
    fn test_ties_follow_priority_order() {
        // A pinching fist: thumb meets index tip while every finger is curled
        let mut lm = SyntheticHand::new(HandShape::Fist).landmarks();
        lm[THUMB_TIP] = lm[INDEX_TIP];

        let ranked = StaticClassifier::default().classify(&lm);
        assert_eq!(ranked[0].pose, StaticPose::Pinch);
        assert_eq!(ranked[1].pose, StaticPose::Fist);
        assert_eq!(ranked[0].confidence, ranked[1].confidence);
    }

    #[test]
    fn test_collapsed_hand_yields_nothing() {
        let lm = [Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT];
        assert!(StaticClassifier::default().classify(&lm).is_empty());
    }
}
