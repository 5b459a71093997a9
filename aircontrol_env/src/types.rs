//! Wire types exchanged with the external collaborators.
//!
//! `LandmarkFrame` comes in from the hand tracker, `ActionCommand` goes out
//! to the input dispatcher. Both are plain values so they can cross task and
//! process boundaries unchanged.

use serde::{Deserialize, Serialize};

/// Number of keypoints the landmark model reports per hand.
pub const LANDMARK_COUNT: usize = 21;

// ============================================================================
// INPUT (from the hand tracker)
// ============================================================================

/// Handedness label assigned by the upstream landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
    /// The model could not decide (or did not report) a label.
    #[default]
    Unknown,
}

/// A single 3D keypoint in normalized camera space.
///
/// `x` and `y` are in [0, 1] image units (y grows downward), `z` is the
/// model's relative depth (more negative = closer to the camera).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True if every coordinate is a finite number.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// True if finite, `x`/`y` inside `[-margin, 1 + margin]` and `|z| <= 1 + margin`.
    pub fn is_within(&self, margin: f64) -> bool {
        let planar = -margin..=1.0 + margin;
        self.is_finite() && planar.contains(&self.x) && planar.contains(&self.y) && self.z.abs() <= 1.0 + margin
    }
}

/// Raw tracker output for one hand in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    /// Upstream handedness label
    pub handedness: Handedness,

    /// Handedness confidence [0.0 - 1.0]
    pub confidence: f64,

    /// Ordered keypoints (wrist first, MediaPipe ordering)
    pub landmarks: [Landmark; LANDMARK_COUNT],
}

impl HandObservation {
    pub fn new(handedness: Handedness, confidence: f64, landmarks: [Landmark; LANDMARK_COUNT]) -> Self {
        Self {
            handedness,
            confidence,
            landmarks,
        }
    }

    /// True if the confidence and every landmark are finite.
    pub fn is_finite(&self) -> bool {
        self.confidence.is_finite() && self.landmarks.iter().all(Landmark::is_finite)
    }

    /// True if the confidence lies in [0, 1] and every landmark is within
    /// `margin` of the normalized image (see [`Landmark::is_within`]).
    pub fn is_well_formed(&self, margin: f64) -> bool {
        (0.0..=1.0).contains(&self.confidence) && self.landmarks.iter().all(|lm| lm.is_within(margin))
    }
}

/// One frame of the landmark stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Monotonic frame counter assigned by the tracker
    pub sequence: u64,

    /// Capture time in milliseconds (monotonic)
    pub timestamp_ms: u64,

    /// Zero, one or two observed hands
    #[serde(default)]
    pub hands: Vec<HandObservation>,
}

impl LandmarkFrame {
    /// Creates an empty frame (no hands visible).
    pub fn new(sequence: u64, timestamp_ms: u64) -> Self {
        Self {
            sequence,
            timestamp_ms,
            hands: Vec::new(),
        }
    }

    /// Adds an observation, builder style.
    pub fn with_hand(mut self, observation: HandObservation) -> Self {
        self.hands.push(observation);
        self
    }
}

// ============================================================================
// OUTPUT (to the input dispatcher)
// ============================================================================

/// Device class the dispatcher routes a command to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    PointerMove,
    PointerClick,
    KeyPress,
    Scroll,
    MacroInvoke,
    /// Emergency stop; the dispatcher must halt any device it drives.
    Stop,
}

/// Mouse button for click actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// One step of a macro sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MacroStep {
    Key { key: String },
    Hotkey { keys: Vec<String> },
    TypeText { text: String },
    OpenUrl { url: String },
    /// Pause inside the macro; executed by the dispatcher, never by the engine.
    Sleep { ms: u64 },
}

/// Device-agnostic action payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Absolute pointer position in normalized screen units [0, 1].
    PointerMove { x: f64, y: f64 },
    #[serde(alias = "mouse_click")]
    PointerClick {
        #[serde(default)]
        button: PointerButton,
    },
    #[serde(alias = "key")]
    KeyPress { key: String },
    Hotkey { keys: Vec<String> },
    /// Scroll by `amount` wheel units (positive = up).
    Scroll { amount: i32 },
    TypeText { text: String },
    OpenUrl { url: String },
    #[serde(alias = "sequence")]
    Macro {
        name: String,
        #[serde(default)]
        steps: Vec<MacroStep>,
    },
    Stop,
}

impl Action {
    /// Device class this action is dispatched to.
    pub fn device_class(&self) -> DeviceClass {
        match self {
            Action::PointerMove { .. } => DeviceClass::PointerMove,
            Action::PointerClick { .. } => DeviceClass::PointerClick,
            Action::KeyPress { .. } | Action::Hotkey { .. } => DeviceClass::KeyPress,
            Action::Scroll { .. } => DeviceClass::Scroll,
            Action::TypeText { .. } | Action::OpenUrl { .. } | Action::Macro { .. } => {
                DeviceClass::MacroInvoke
            }
            Action::Stop => DeviceClass::Stop,
        }
    }
}

/// Abstract output unit consumed by the input dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    /// Sequence number of the frame that produced this command
    pub sequence: u64,

    /// Timestamp of the frame that produced this command
    pub timestamp_ms: u64,

    /// What to do
    pub action: Action,

    /// Intensity scalar derived from the gesture's motion parameters
    pub intensity: f64,
}

impl ActionCommand {
    pub fn new(sequence: u64, timestamp_ms: u64, action: Action, intensity: f64) -> Self {
        Self {
            sequence,
            timestamp_ms,
            action,
            intensity,
        }
    }

    /// The emergency stop command.
    pub fn stop(sequence: u64, timestamp_ms: u64) -> Self {
        Self::new(sequence, timestamp_ms, Action::Stop, 0.0)
    }

    pub fn device_class(&self) -> DeviceClass {
        self.action.device_class()
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.action, Action::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_finite_check() {
        let mut obs = HandObservation::new(Handedness::Right, 0.9, [Landmark::default(); LANDMARK_COUNT]);
        assert!(obs.is_finite());

        obs.landmarks[8].y = f64::NAN;
        assert!(!obs.is_finite());

        obs.landmarks[8].y = 0.5;
        obs.confidence = f64::INFINITY;
        assert!(!obs.is_finite());
    }

    #[test]
    fn test_observation_range_check() {
        let mut obs = HandObservation::new(Handedness::Left, 0.9, [Landmark::new(0.5, 0.5, -0.1); LANDMARK_COUNT]);
        assert!(obs.is_well_formed(0.5));

        // Slightly off-frame is tolerated, far off-frame is not
        obs.landmarks[0].x = 1.3;
        assert!(obs.is_well_formed(0.5));
        obs.landmarks[0].x = 40.0;
        assert!(!obs.is_well_formed(0.5));
        obs.landmarks[0].x = 1.7e308;
        assert!(!obs.is_well_formed(0.5));

        obs.landmarks[0].x = 0.5;
        obs.confidence = 7.5;
        assert!(!obs.is_well_formed(0.5));
        obs.confidence = -0.1;
        assert!(!obs.is_well_formed(0.5));
    }

    #[test]
    fn test_device_class_mapping() {
        assert_eq!(Action::Hotkey { keys: vec!["alt".into(), "right".into()] }.device_class(), DeviceClass::KeyPress);
        assert_eq!(Action::OpenUrl { url: "https://example.com".into() }.device_class(), DeviceClass::MacroInvoke);
        assert_eq!(Action::Scroll { amount: -120 }.device_class(), DeviceClass::Scroll);
        assert!(ActionCommand::stop(1, 10).is_stop());
        assert_eq!(ActionCommand::stop(1, 10).device_class(), DeviceClass::Stop);
    }

    #[test]
    fn test_action_accepts_legacy_type_names() {
        let click: Action = serde_json::from_str(r#"{"type":"mouse_click","button":"right"}"#).unwrap();
        assert_eq!(click, Action::PointerClick { button: PointerButton::Right });

        let key: Action = serde_json::from_str(r#"{"type":"key","key":"space"}"#).unwrap();
        assert_eq!(key, Action::KeyPress { key: "space".into() });

        let seq: Action = serde_json::from_str(
            r#"{"type":"sequence","name":"login","steps":[{"type":"sleep","ms":100},{"type":"type_text","text":"hi"}]}"#,
        )
        .unwrap();
        match seq {
            Action::Macro { name, steps } => {
                assert_eq!(name, "login");
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[0], MacroStep::Sleep { ms: 100 });
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_frame_deserializes_without_hands() {
        let frame: LandmarkFrame = serde_json::from_str(r#"{"sequence":3,"timestamp_ms":99}"#).unwrap();
        assert_eq!(frame, LandmarkFrame::new(3, 99));
    }
}
