//! Gesture vocabulary shared by every pipeline stage.
//!
//! Kinds are small `Copy` enums with a fixed ordering so channels and
//! bindings can be addressed by index instead of hashed per frame.

use aircontrol_env::Handedness;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// HANDS
// ============================================================================

/// Stable hand identity owned by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    /// Array index (Left = 0, Right = 1).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }

    pub fn opposite(self) -> Hand {
        match self {
            Hand::Left => Hand::Right,
            Hand::Right => Hand::Left,
        }
    }

    /// Converts an upstream label; `Unknown` has no identity.
    pub fn from_handedness(label: Handedness) -> Option<Hand> {
        match label {
            Handedness::Left => Some(Hand::Left),
            Handedness::Right => Some(Hand::Right),
            Handedness::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

/// Which hand(s) a gesture or binding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandSet {
    Left,
    Right,
    Both,
}

impl From<Hand> for HandSet {
    fn from(hand: Hand) -> Self {
        match hand {
            Hand::Left => HandSet::Left,
            Hand::Right => HandSet::Right,
        }
    }
}

impl HandSet {
    /// The single hand, if this is not `Both`.
    pub fn single(self) -> Option<Hand> {
        match self {
            HandSet::Left => Some(Hand::Left),
            HandSet::Right => Some(Hand::Right),
            HandSet::Both => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandSet::Left => "left",
            HandSet::Right => "right",
            HandSet::Both => "both",
        }
    }
}

// ============================================================================
// GESTURE KINDS
// ============================================================================

/// Per-frame static poses, declared in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticPose {
    /// Thumb tip touching index tip
    Pinch,
    /// All four fingers curled
    Fist,
    /// All four fingers extended
    OpenPalm,
    /// Index + middle extended, pointing up
    TwoUp,
    /// Index + middle extended, pointing down
    TwoDown,
    /// Index extended, others curled
    Point,
}

impl StaticPose {
    pub const ALL: [StaticPose; 6] = [
        StaticPose::Pinch,
        StaticPose::Fist,
        StaticPose::OpenPalm,
        StaticPose::TwoUp,
        StaticPose::TwoDown,
        StaticPose::Point,
    ];

    /// Position in `ALL`; lower = higher priority.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StaticPose::Pinch => "PINCH",
            StaticPose::Fist => "FIST",
            StaticPose::OpenPalm => "OPEN_PALM",
            StaticPose::TwoUp => "TWO_UP",
            StaticPose::TwoDown => "TWO_DOWN",
            StaticPose::Point => "POINT",
        }
    }
}

/// Temporal motion patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    SwipeLeft,
    SwipeRight,
    SwipeUp,
    SwipeDown,
    /// Hand moving toward the camera
    Push,
    /// Hand moving away from the camera
    Pull,
    /// Clockwise roll as seen by the camera
    RotateCw,
    RotateCcw,
}

impl MotionKind {
    pub const ALL: [MotionKind; 8] = [
        MotionKind::SwipeLeft,
        MotionKind::SwipeRight,
        MotionKind::SwipeUp,
        MotionKind::SwipeDown,
        MotionKind::Push,
        MotionKind::Pull,
        MotionKind::RotateCw,
        MotionKind::RotateCcw,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_rotation(self) -> bool {
        matches!(self, MotionKind::RotateCw | MotionKind::RotateCcw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MotionKind::SwipeLeft => "SWIPE_LEFT",
            MotionKind::SwipeRight => "SWIPE_RIGHT",
            MotionKind::SwipeUp => "SWIPE_UP",
            MotionKind::SwipeDown => "SWIPE_DOWN",
            MotionKind::Push => "PUSH",
            MotionKind::Pull => "PULL",
            MotionKind::RotateCw => "ROTATE_CW",
            MotionKind::RotateCcw => "ROTATE_CCW",
        }
    }
}

/// A gesture one hand can perform on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandGesture {
    Static(StaticPose),
    Dynamic(MotionKind),
}

/// Number of distinct single-hand gesture kinds.
pub const PER_HAND_KIND_COUNT: usize = StaticPose::ALL.len() + MotionKind::ALL.len();

impl HandGesture {
    /// Dense index over static poses followed by motion kinds.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            HandGesture::Static(pose) => pose.index(),
            HandGesture::Dynamic(kind) => StaticPose::ALL.len() + kind.index(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandGesture::Static(pose) => pose.as_str(),
            HandGesture::Dynamic(kind) => kind.as_str(),
        }
    }
}

/// Tagged gesture kind: static pose, dynamic motion or bi-manual conjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Static(StaticPose),
    Dynamic(MotionKind),
    Bimanual { left: HandGesture, right: HandGesture },
}

impl From<HandGesture> for GestureKind {
    fn from(gesture: HandGesture) -> Self {
        match gesture {
            HandGesture::Static(pose) => GestureKind::Static(pose),
            HandGesture::Dynamic(kind) => GestureKind::Dynamic(kind),
        }
    }
}

impl From<StaticPose> for GestureKind {
    fn from(pose: StaticPose) -> Self {
        GestureKind::Static(pose)
    }
}

impl From<MotionKind> for GestureKind {
    fn from(kind: MotionKind) -> Self {
        GestureKind::Dynamic(kind)
    }
}

impl GestureKind {
    /// The single-hand form of this kind, if it is not bi-manual.
    pub fn as_hand_gesture(self) -> Option<HandGesture> {
        match self {
            GestureKind::Static(pose) => Some(HandGesture::Static(pose)),
            GestureKind::Dynamic(kind) => Some(HandGesture::Dynamic(kind)),
            GestureKind::Bimanual { .. } => None,
        }
    }

    pub fn is_bimanual(self) -> bool {
        matches!(self, GestureKind::Bimanual { .. })
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GestureKind::Static(pose) => write!(f, "{}", pose.as_str()),
            GestureKind::Dynamic(kind) => write!(f, "{}", kind.as_str()),
            GestureKind::Bimanual { left, right } => {
                write!(f, "{}+{}", left.as_str(), right.as_str())
            }
        }
    }
}

/// Identifies one debounce channel: gesture kind × hand combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub kind: GestureKind,
    pub hands: HandSet,
}

impl ChannelKey {
    pub fn new(kind: GestureKind, hands: HandSet) -> Self {
        Self { kind, hands }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hands.as_str(), self.kind)
    }
}

// ============================================================================
// CANDIDATES & EVENTS
// ============================================================================

/// Motion snapshot attached to a candidate or event.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GestureFeatures {
    /// Hand speed (normalized units/s, or rad/s for rotations)
    pub speed: f64,

    /// Smoothed depth estimate
    pub depth: f64,

    /// Unit direction of motion (zero for static poses)
    pub direction: [f64; 3],
}

/// Unconfirmed per-frame gesture proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureCandidate {
    pub kind: GestureKind,
    pub hands: HandSet,
    /// Raw confidence [0.0 - 1.0]
    pub confidence: f64,
    pub features: GestureFeatures,
}

impl GestureCandidate {
    pub fn new(kind: GestureKind, hands: HandSet, confidence: f64, features: GestureFeatures) -> Self {
        Self {
            kind,
            hands,
            confidence: confidence.clamp(0.0, 1.0),
            features,
        }
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(self.kind, self.hands)
    }
}

/// Confirmed, debounced gesture occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub hands: HandSet,
    /// Confidence at confirmation
    pub confidence: f64,
    /// Motion parameters at confirmation
    pub features: GestureFeatures,
    pub timestamp_ms: u64,
    pub sequence: u64,
}

impl GestureEvent {
    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(self.kind, self.hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_gesture_indices_are_dense() {
        let mut seen = vec![false; PER_HAND_KIND_COUNT];
        for pose in StaticPose::ALL {
            seen[HandGesture::Static(pose).index()] = true;
        }
        for kind in MotionKind::ALL {
            seen[HandGesture::Dynamic(kind).index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_gesture_kind_serde_shape() {
        let kind = GestureKind::Bimanual {
            left: HandGesture::Static(StaticPose::Pinch),
            right: HandGesture::Dynamic(MotionKind::SwipeRight),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"bimanual":{"left":{"static":"pinch"},"right":{"dynamic":"swipe_right"}}}"#);

        let back: GestureKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
        assert_eq!(kind.to_string(), "PINCH+SWIPE_RIGHT");
    }

    #[test]
    fn test_candidate_confidence_clamped() {
        let c = GestureCandidate::new(
            GestureKind::Static(StaticPose::Fist),
            HandSet::Left,
            1.7,
            GestureFeatures::default(),
        );
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_hand_from_handedness() {
        assert_eq!(Hand::from_handedness(Handedness::Left), Some(Hand::Left));
        assert_eq!(Hand::from_handedness(Handedness::Unknown), None);
        assert_eq!(Hand::Left.opposite(), Hand::Right);
    }
}
