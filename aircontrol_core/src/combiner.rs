//! Bi-manual combiner
//!
//! Joins one candidate from each hand into a two-hand candidate when the
//! pair matches a declared definition. Confidence of the pair is the lower
//! of the two constituents.

use crate::gesture::{GestureCandidate, GestureFeatures, GestureKind, Hand, HandGesture, HandSet};
use serde::{Deserialize, Serialize};

fn default_exclusive() -> bool {
    true
}

/// A declared two-hand conjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BimanualDefinition {
    pub left: HandGesture,
    pub right: HandGesture,

    /// Suppress the single-hand constituents on frames the pair fires
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
}

impl BimanualDefinition {
    pub fn new(left: HandGesture, right: HandGesture) -> Self {
        Self {
            left,
            right,
            exclusive: true,
        }
    }

    pub fn kind(&self) -> GestureKind {
        GestureKind::Bimanual {
            left: self.left,
            right: self.right,
        }
    }
}

/// Merges the features of both hands: faster hand wins speed and direction,
/// depth is averaged.
fn merge_features(left: &GestureFeatures, right: &GestureFeatures) -> GestureFeatures {
    let lead = if right.speed >= left.speed { right } else { left };
    GestureFeatures {
        speed: lead.speed,
        depth: 0.5 * (left.depth + right.depth),
        direction: lead.direction,
    }
}

/// Stateless per-frame combiner over the profile's definitions.
#[derive(Debug, Clone, Default)]
pub struct BimanualCombiner {
    definitions: Vec<BimanualDefinition>,
}

impl BimanualCombiner {
    pub fn new(definitions: Vec<BimanualDefinition>) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &[BimanualDefinition] {
        &self.definitions
    }

    pub fn is_active(&self) -> bool {
        !self.definitions.is_empty()
    }

    /// Appends a combined candidate for every satisfied definition and
    /// removes the constituents of exclusive ones.
    pub fn combine(&self, candidates: &mut Vec<GestureCandidate>) {
        if self.definitions.is_empty() {
            return;
        }

        let find = |set: &[GestureCandidate], hand: Hand, gesture: HandGesture| {
            set.iter()
                .find(|c| c.hands == HandSet::from(hand) && c.kind.as_hand_gesture() == Some(gesture))
                .copied()
        };

        let mut combined = Vec::new();
        let mut suppressed: Vec<(Hand, HandGesture)> = Vec::new();
        for def in &self.definitions {
            let (Some(l), Some(r)) = (
                find(&candidates[..], Hand::Left, def.left),
                find(&candidates[..], Hand::Right, def.right),
            ) else {
                continue;
            };

            combined.push(GestureCandidate::new(
                def.kind(),
                HandSet::Both,
                l.confidence.min(r.confidence),
                merge_features(&l.features, &r.features),
            ));
            if def.exclusive {
                suppressed.push((Hand::Left, def.left));
                suppressed.push((Hand::Right, def.right));
            }
        }

        if !suppressed.is_empty() {
            candidates.retain(|c| {
                let Some(hand) = c.hands.single() else {
                    return true;
                };
                !suppressed
                    .iter()
                    .any(|&(h, g)| h == hand && c.kind.as_hand_gesture() == Some(g))
            });
        }
        candidates.extend(combined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{MotionKind, StaticPose};

    fn cand(gesture: HandGesture, hand: Hand, confidence: f64) -> GestureCandidate {
        GestureCandidate::new(gesture.into(), hand.into(), confidence, GestureFeatures::default())
    }

    const PINCH: HandGesture = HandGesture::Static(StaticPose::Pinch);
    const SWIPE_RIGHT: HandGesture = HandGesture::Dynamic(MotionKind::SwipeRight);

    #[test]
    fn test_pair_uses_min_confidence() {
        let combiner = BimanualCombiner::new(vec![BimanualDefinition::new(PINCH, SWIPE_RIGHT)]);
        let mut candidates = vec![cand(PINCH, Hand::Left, 0.9), cand(SWIPE_RIGHT, Hand::Right, 0.7)];
        combiner.combine(&mut candidates);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].hands, HandSet::Both);
        assert!((candidates[0].confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_non_exclusive_keeps_constituents() {
        let mut def = BimanualDefinition::new(PINCH, SWIPE_RIGHT);
        def.exclusive = false;
        let combiner = BimanualCombiner::new(vec![def]);
        let mut candidates = vec![cand(PINCH, Hand::Left, 0.9), cand(SWIPE_RIGHT, Hand::Right, 0.7)];
        combiner.combine(&mut candidates);

        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_missing_hand_yields_nothing() {
        let combiner = BimanualCombiner::new(vec![BimanualDefinition::new(PINCH, SWIPE_RIGHT)]);
        // Pinch on the wrong hand
        let mut candidates = vec![cand(PINCH, Hand::Right, 0.9), cand(SWIPE_RIGHT, Hand::Right, 0.9)];
        combiner.combine(&mut candidates);

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.hands != HandSet::Both));
    }

    #[test]
    fn test_exclusive_definition_deserializes_by_default() {
        let def: BimanualDefinition = serde_json::from_str(
            r#"{"left":{"static":"pinch"},"right":{"dynamic":"swipe_right"}}"#,
        )
        .unwrap();
        assert!(def.exclusive);
    }
}
