//! Operating profiles: binding tables and their options
//!
//! A profile decides what each confirmed gesture does. Exactly one is active
//! at a time; the engine rebuilds its channel bank whenever it changes.

use crate::combiner::BimanualDefinition;
use crate::gesture::{GestureFeatures, GestureKind, Hand, HandGesture, HandSet, MotionKind, StaticPose};
use crate::safety::{RateLimit, SafeZone};
use aircontrol_env::{Action, PointerButton};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Profile validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile name is empty")]
    EmptyName,

    #[error("Duplicate binding: {0}")]
    DuplicateBinding(String),

    #[error("Invalid hand set for {gesture}: {hands}")]
    InvalidHandSet { gesture: String, hands: String },

    #[error("Invalid intensity mapping for {0}")]
    InvalidIntensity(String),

    #[error("Confidence out of range for {0}")]
    InvalidConfidence(String),

    #[error("Invalid confirmation requirement for {0}")]
    InvalidConfirmation(String),

    #[error("Machine profile '{0}' has no safety section")]
    MissingSafety(String),

    #[error("Invalid safety section: {0}")]
    InvalidSafety(String),

    #[error("Invalid pointer section: {0}")]
    InvalidPointer(String),
}

// ============================================================================
// INTENSITY
// ============================================================================

/// Gesture feature an intensity mapping reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensitySource {
    Speed,
    Depth,
    Confidence,
}

/// How a binding turns gesture features into the command intensity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IntensityMapping {
    Constant {
        value: f64,
    },
    /// Clamped linear map from `[in_min, in_max]` to `[out_min, out_max]`
    Linear {
        source: IntensitySource,
        in_min: f64,
        in_max: f64,
        out_min: f64,
        out_max: f64,
    },
    /// `min(scale · ln(1 + x), max)`
    Log {
        source: IntensitySource,
        scale: f64,
        max: f64,
    },
}

impl Default for IntensityMapping {
    fn default() -> Self {
        IntensityMapping::Constant { value: 1.0 }
    }
}

impl IntensitySource {
    fn read(self, features: &GestureFeatures, confidence: f64) -> f64 {
        match self {
            IntensitySource::Speed => features.speed,
            IntensitySource::Depth => features.depth,
            IntensitySource::Confidence => confidence,
        }
    }
}

impl IntensityMapping {
    pub fn evaluate(&self, features: &GestureFeatures, confidence: f64) -> f64 {
        let value = match *self {
            IntensityMapping::Constant { value } => value,
            IntensityMapping::Linear {
                source,
                in_min,
                in_max,
                out_min,
                out_max,
            } => {
                let x = source.read(features, confidence);
                let t = ((x - in_min) / (in_max - in_min)).clamp(0.0, 1.0);
                out_min + t * (out_max - out_min)
            }
            IntensityMapping::Log { source, scale, max } => {
                let x = source.read(features, confidence).max(0.0);
                (scale * x.ln_1p()).min(max)
            }
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    fn is_valid(&self) -> bool {
        match *self {
            IntensityMapping::Constant { value } => value.is_finite(),
            IntensityMapping::Linear {
                in_min,
                in_max,
                out_min,
                out_max,
                ..
            } => {
                [in_min, in_max, out_min, out_max].iter().all(|v| v.is_finite()) && in_max > in_min
            }
            IntensityMapping::Log { scale, max, .. } => scale.is_finite() && scale > 0.0 && max.is_finite() && max > 0.0,
        }
    }
}

// ============================================================================
// BINDINGS
// ============================================================================

/// Second gesture that must confirm before a buffered command is released.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequirement {
    pub gesture: GestureKind,
    pub hands: HandSet,
    /// Time the confirming gesture has after the first one
    pub window_ms: u64,
}

/// One row of the binding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub gesture: GestureKind,
    pub hands: HandSet,
    pub action: Action,

    #[serde(default)]
    pub intensity: IntensityMapping,

    /// Overrides the channel cooldown
    #[serde(default)]
    pub cooldown_ms: Option<u64>,

    /// Overrides the channel confirm threshold
    #[serde(default)]
    pub min_confidence: Option<f64>,

    /// Overrides the channel hold time
    #[serde(default)]
    pub min_hold_ms: Option<u64>,

    /// Higher runs first within a frame
    #[serde(default)]
    pub priority: i32,

    /// Hold the command until a second gesture confirms (safety profiles)
    #[serde(default)]
    pub confirmation: Option<ConfirmationRequirement>,
}

impl Binding {
    pub fn new(gesture: impl Into<GestureKind>, hands: HandSet, action: Action) -> Self {
        Self {
            gesture: gesture.into(),
            hands,
            action,
            intensity: IntensityMapping::default(),
            cooldown_ms: None,
            min_confidence: None,
            min_hold_ms: None,
            priority: 0,
            confirmation: None,
        }
    }

    pub fn with_intensity(mut self, intensity: IntensityMapping) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_cooldown(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = Some(cooldown_ms);
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_min_hold(mut self, min_hold_ms: u64) -> Self {
        self.min_hold_ms = Some(min_hold_ms);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_confirmation(mut self, gesture: impl Into<GestureKind>, hands: HandSet, window_ms: u64) -> Self {
        self.confirmation = Some(ConfirmationRequirement {
            gesture: gesture.into(),
            hands,
            window_ms,
        });
        self
    }

    pub fn is_emergency_stop(&self) -> bool {
        matches!(self.action, Action::Stop)
    }

    fn label(&self) -> String {
        format!("{}:{}", self.hands.as_str(), self.gesture)
    }
}

// ============================================================================
// PROFILE SECTIONS
// ============================================================================

/// Continuous pointer-follow from the index fingertip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    pub enabled: bool,

    /// Smoothing factor toward the fingertip (default: 0.25)
    pub alpha: f64,

    /// Hand that drives the pointer; the other one is the fallback (default: right)
    pub preferred_hand: Hand,

    /// Camera-space region mapped onto the full screen (default: whole image)
    pub input_min: [f64; 2],
    pub input_max: [f64; 2],
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.25,
            preferred_hand: Hand::Right,
            input_min: [0.0, 0.0],
            input_max: [1.0, 1.0],
        }
    }
}

/// Safety section of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub safe_zone: SafeZone,
    pub rate_limit: RateLimit,
}

/// Profile family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    #[default]
    Game,
    Design,
    Machine,
}

impl ProfileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileKind::Game => "game",
            ProfileKind::Design => "design",
            ProfileKind::Machine => "machine",
        }
    }
}

/// A complete operating profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,

    #[serde(default)]
    pub kind: ProfileKind,

    #[serde(default)]
    pub bindings: Vec<Binding>,

    /// Explicit two-hand definitions (bi-manual bindings add their own)
    #[serde(default)]
    pub bimanual: Vec<BimanualDefinition>,

    #[serde(default)]
    pub pointer: Option<PointerConfig>,

    #[serde(default)]
    pub safety: Option<SafetyConfig>,

    /// Keep only the highest-priority command each frame (pointer moves excepted)
    #[serde(default)]
    pub single_action_per_frame: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self::game()
    }
}

fn bimanual_parts(kind: GestureKind) -> Option<(HandGesture, HandGesture)> {
    match kind {
        GestureKind::Bimanual { left, right } => Some((left, right)),
        _ => None,
    }
}

impl Profile {
    pub fn new(name: impl Into<String>, kind: ProfileKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bindings: Vec::new(),
            bimanual: Vec::new(),
            pointer: None,
            safety: None,
            single_action_per_frame: false,
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Every two-hand definition the channel bank needs: explicit ones first,
    /// then any pair referenced by a binding or a confirmation requirement.
    pub fn bimanual_definitions(&self) -> Vec<BimanualDefinition> {
        let mut defs = self.bimanual.clone();
        let referenced = self.bindings.iter().flat_map(|b| {
            std::iter::once(b.gesture).chain(b.confirmation.map(|c| c.gesture))
        });
        for kind in referenced {
            if let Some((left, right)) = bimanual_parts(kind) {
                if !defs.iter().any(|d| d.left == left && d.right == right) {
                    defs.push(BimanualDefinition::new(left, right));
                }
            }
        }
        defs
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }

        let mut seen = HashSet::new();
        for b in &self.bindings {
            let label = b.label();
            if !seen.insert((b.gesture, b.hands)) {
                return Err(ProfileError::DuplicateBinding(label));
            }
            check_hands(b.gesture, b.hands)?;
            if !b.intensity.is_valid() {
                return Err(ProfileError::InvalidIntensity(label));
            }
            if let Some(c) = b.min_confidence {
                if !(0.0..=1.0).contains(&c) {
                    return Err(ProfileError::InvalidConfidence(label));
                }
            }
            if let Some(req) = &b.confirmation {
                if req.window_ms == 0 || self.safety.is_none() || b.is_emergency_stop() {
                    return Err(ProfileError::InvalidConfirmation(label));
                }
                check_hands(req.gesture, req.hands)?;
            }
        }

        if self.kind == ProfileKind::Machine && self.safety.is_none() {
            return Err(ProfileError::MissingSafety(self.name.clone()));
        }
        if let Some(safety) = &self.safety {
            safety.safe_zone.validate().map_err(ProfileError::InvalidSafety)?;
            safety.rate_limit.validate().map_err(ProfileError::InvalidSafety)?;
        }
        if let Some(pointer) = &self.pointer {
            if !(pointer.alpha > 0.0 && pointer.alpha <= 1.0) {
                return Err(ProfileError::InvalidPointer(format!("alpha {}", pointer.alpha)));
            }
            if pointer.input_max[0] <= pointer.input_min[0] || pointer.input_max[1] <= pointer.input_min[1] {
                return Err(ProfileError::InvalidPointer("empty input region".to_string()));
            }
        }
        Ok(())
    }

    // ========================================================================
    // BUILT-IN PROFILES
    // ========================================================================

    /// Desktop/game control: the classic click, scroll and arrow-key set.
    pub fn game() -> Self {
        use GestureKind::{Dynamic, Static};
        use MotionKind::*;
        use StaticPose::*;

        let key = |k: &str| Action::KeyPress { key: k.to_string() };
        let hotkey = |keys: &[&str]| Action::Hotkey {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        };

        let mut profile = Profile::new("game", ProfileKind::Game)
            .with_binding(
                Binding::new(Static(Pinch), HandSet::Right, Action::PointerClick { button: PointerButton::Left })
                    .with_cooldown(450)
                    .with_priority(10),
            )
            .with_binding(
                Binding::new(Static(Pinch), HandSet::Left, Action::PointerClick { button: PointerButton::Right })
                    .with_cooldown(450)
                    .with_priority(9),
            )
            .with_binding(Binding::new(Static(TwoUp), HandSet::Right, Action::Scroll { amount: 120 }).with_cooldown(200))
            .with_binding(Binding::new(Static(TwoDown), HandSet::Right, Action::Scroll { amount: -120 }).with_cooldown(200))
            .with_binding(Binding::new(Dynamic(SwipeLeft), HandSet::Right, key("left")).with_cooldown(300))
            .with_binding(Binding::new(Dynamic(SwipeRight), HandSet::Right, key("right")).with_cooldown(300))
            .with_binding(Binding::new(Dynamic(SwipeUp), HandSet::Right, key("pageup")).with_cooldown(300))
            .with_binding(Binding::new(Dynamic(SwipeDown), HandSet::Right, key("pagedown")).with_cooldown(300))
            .with_binding(Binding::new(Dynamic(Push), HandSet::Right, hotkey(&["ctrl", "+"])).with_cooldown(300))
            .with_binding(Binding::new(Dynamic(Pull), HandSet::Right, hotkey(&["ctrl", "-"])).with_cooldown(300));
        profile.pointer = Some(PointerConfig::default());
        profile
    }

    /// Design tools: rotation, depth-scaled zoom and a two-hand undo.
    pub fn design() -> Self {
        use GestureKind::{Dynamic, Static};
        use MotionKind::*;
        use StaticPose::*;

        let hotkey = |keys: &[&str]| Action::Hotkey {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        };
        let zoom = IntensityMapping::Linear {
            source: IntensitySource::Speed,
            in_min: 0.3,
            in_max: 2.0,
            out_min: 0.2,
            out_max: 1.0,
        };

        let mut profile = Profile::new("design", ProfileKind::Design)
            .with_binding(Binding::new(Static(Pinch), HandSet::Right, Action::PointerClick { button: PointerButton::Left }))
            .with_binding(Binding::new(Dynamic(RotateCw), HandSet::Right, hotkey(&["ctrl", "]"])).with_intensity(
                IntensityMapping::Log {
                    source: IntensitySource::Speed,
                    scale: 0.5,
                    max: 1.0,
                },
            ))
            .with_binding(Binding::new(Dynamic(RotateCcw), HandSet::Right, hotkey(&["ctrl", "["])))
            .with_binding(Binding::new(Dynamic(Push), HandSet::Right, hotkey(&["ctrl", "+"])).with_intensity(zoom))
            .with_binding(Binding::new(Dynamic(Pull), HandSet::Right, hotkey(&["ctrl", "-"])).with_intensity(zoom))
            .with_binding(Binding::new(
                GestureKind::Bimanual {
                    left: HandGesture::Static(Pinch),
                    right: HandGesture::Dynamic(SwipeLeft),
                },
                HandSet::Both,
                hotkey(&["ctrl", "z"]),
            ))
            .with_binding(Binding::new(
                GestureKind::Bimanual {
                    left: HandGesture::Static(Pinch),
                    right: HandGesture::Dynamic(SwipeRight),
                },
                HandSet::Both,
                hotkey(&["ctrl", "shift", "z"]),
            ));
        profile.pointer = Some(PointerConfig {
            alpha: 0.35,
            ..Default::default()
        });
        profile
    }

    /// Machine control: emergency stop, confirmed motion commands, strict limits.
    pub fn machine() -> Self {
        use GestureKind::{Dynamic, Static};
        use MotionKind::*;
        use StaticPose::*;

        let key = |k: &str| Action::KeyPress { key: k.to_string() };
        let jog = IntensityMapping::Linear {
            source: IntensitySource::Speed,
            in_min: 0.8,
            in_max: 3.0,
            out_min: 0.1,
            out_max: 1.0,
        };

        let mut profile = Profile::new("machine", ProfileKind::Machine)
            .with_binding(Binding::new(Static(Fist), HandSet::Left, Action::Stop).with_min_hold(100).with_priority(100))
            .with_binding(Binding::new(Static(Fist), HandSet::Right, Action::Stop).with_min_hold(100).with_priority(100))
            .with_binding(Binding::new(Dynamic(SwipeLeft), HandSet::Right, key("jog_x_minus")).with_intensity(jog))
            .with_binding(Binding::new(Dynamic(SwipeRight), HandSet::Right, key("jog_x_plus")).with_intensity(jog))
            .with_binding(Binding::new(Dynamic(SwipeUp), HandSet::Right, key("jog_y_plus")).with_intensity(jog))
            .with_binding(Binding::new(Dynamic(SwipeDown), HandSet::Right, key("jog_y_minus")).with_intensity(jog))
            .with_binding(
                Binding::new(
                    Static(Point),
                    HandSet::Right,
                    Action::Macro {
                        name: "cycle_start".to_string(),
                        steps: Vec::new(),
                    },
                )
                .with_confirmation(Static(Pinch), HandSet::Left, 1500)
                .with_priority(5),
            );
        profile.safety = Some(SafetyConfig::default());
        profile.single_action_per_frame = true;
        profile
    }

    /// Media browsing: swipes navigate history, palm toggles playback.
    pub fn browser_youtube() -> Self {
        use GestureKind::{Dynamic, Static};
        use MotionKind::*;
        use StaticPose::*;

        let hotkey = |keys: &[&str]| Action::Hotkey {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        };

        Profile::new("browser_youtube", ProfileKind::Game)
            .with_binding(Binding::new(Dynamic(SwipeRight), HandSet::Right, hotkey(&["alt", "right"])).with_min_confidence(0.6))
            .with_binding(Binding::new(Dynamic(SwipeLeft), HandSet::Right, hotkey(&["alt", "left"])).with_min_confidence(0.6))
            .with_binding(Binding::new(Static(OpenPalm), HandSet::Right, Action::KeyPress { key: "k".to_string() }).with_cooldown(1000))
            .with_binding(Binding::new(Static(TwoUp), HandSet::Right, Action::KeyPress { key: "up".to_string() }))
            .with_binding(Binding::new(Static(TwoDown), HandSet::Right, Action::KeyPress { key: "down".to_string() }))
    }

    /// Looks up a built-in profile by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "game" => Some(Self::game()),
            "design" => Some(Self::design()),
            "machine" => Some(Self::machine()),
            "browser_youtube" => Some(Self::browser_youtube()),
            _ => None,
        }
    }
}

fn check_hands(gesture: GestureKind, hands: HandSet) -> Result<(), ProfileError> {
    if gesture.is_bimanual() != (hands == HandSet::Both) {
        return Err(ProfileError::InvalidHandSet {
            gesture: gesture.to_string(),
            hands: hands.as_str().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builtin_profiles_validate() {
        for name in ["game", "design", "machine", "browser_youtube"] {
            let profile = Profile::builtin(name).unwrap();
            assert_eq!(profile.validate(), Ok(()), "profile {}", name);
        }
        assert_eq!(Profile::default().kind, ProfileKind::Game);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let profile = Profile::new("dup", ProfileKind::Game)
            .with_binding(Binding::new(StaticPose::Fist, HandSet::Left, Action::Stop))
            .with_binding(Binding::new(StaticPose::Fist, HandSet::Left, Action::Scroll { amount: 1 }));
        assert!(matches!(profile.validate(), Err(ProfileError::DuplicateBinding(_))));
    }

    #[test]
    fn test_bimanual_binding_needs_both_hands() {
        let kind = GestureKind::Bimanual {
            left: HandGesture::Static(StaticPose::Pinch),
            right: HandGesture::Static(StaticPose::Pinch),
        };
        let profile = Profile::new("bad", ProfileKind::Design).with_binding(Binding::new(kind, HandSet::Left, Action::Stop));
        assert!(matches!(profile.validate(), Err(ProfileError::InvalidHandSet { .. })));
    }

    #[test]
    fn test_machine_requires_safety() {
        let mut profile = Profile::machine();
        profile.safety = None;
        assert!(matches!(profile.validate(), Err(ProfileError::MissingSafety(_))));
    }

    #[test]
    fn test_bimanual_definitions_from_bindings() {
        let defs = Profile::design().bimanual_definitions();
        assert_eq!(defs.len(), 2);
        assert!(defs.iter().all(|d| d.exclusive));
        assert!(Profile::game().bimanual_definitions().is_empty());
    }

    #[test]
    fn test_intensity_mappings() {
        let f = GestureFeatures {
            speed: 1.5,
            depth: 0.2,
            direction: [1.0, 0.0, 0.0],
        };

        let linear = IntensityMapping::Linear {
            source: IntensitySource::Speed,
            in_min: 1.0,
            in_max: 2.0,
            out_min: 0.0,
            out_max: 10.0,
        };
        assert_relative_eq!(linear.evaluate(&f, 0.9), 5.0);

        // Clamped above the input range
        let fast = GestureFeatures { speed: 9.0, ..f };
        assert_relative_eq!(linear.evaluate(&fast, 0.9), 10.0);

        let log = IntensityMapping::Log {
            source: IntensitySource::Confidence,
            scale: 2.0,
            max: 100.0,
        };
        assert_relative_eq!(log.evaluate(&f, 0.5), 2.0 * 1.5f64.ln(), epsilon = 1e-12);

        assert_relative_eq!(IntensityMapping::default().evaluate(&f, 0.1), 1.0);
    }

    #[test]
    fn test_profile_from_json() {
        let json = r#"{
            "name": "custom",
            "kind": "design",
            "bindings": [
                {
                    "gesture": {"dynamic": "swipe_right"},
                    "hands": "right",
                    "action": {"type": "hotkey", "keys": ["alt", "right"]},
                    "intensity": {"mode": "linear", "source": "speed", "in_min": 0.5, "in_max": 2.0, "out_min": 0.0, "out_max": 1.0},
                    "cooldown_ms": 800,
                    "priority": 3
                }
            ]
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.kind, ProfileKind::Design);
        assert_eq!(profile.bindings[0].cooldown_ms, Some(800));
        assert_eq!(profile.bindings[0].priority, 3);
        assert!(profile.pointer.is_none());
        assert_eq!(profile.validate(), Ok(()));
    }
}
