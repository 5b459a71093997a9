//! Profile-aware action mapper
//!
//! Turns confirmed gesture events into action commands through the active
//! profile's binding table. Lookup is by channel index, resolved once when
//! the profile is installed.

use crate::debounce::{ChannelBank, DebounceDefaults};
use crate::gesture::{ChannelKey, GestureEvent, Hand};
use crate::identity::IdentityTracker;
use crate::landmarks::INDEX_TIP;
use crate::profile::{Binding, PointerConfig, Profile};
use aircontrol_env::{Action, ActionCommand};
use tracing::debug;

/// A command on its way to the safety gate.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedCommand {
    pub command: ActionCommand,
    pub priority: i32,
    /// Channel that must confirm before release, and the time it has
    pub confirmation: Option<(ChannelKey, u64)>,
}

/// Mapper output for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapResult {
    /// Commands ordered by binding priority (highest first, stable)
    pub commands: Vec<MappedCommand>,

    /// An emergency-stop binding confirmed this frame
    pub emergency: bool,

    /// Events with no binding in the active profile
    pub unbound: usize,

    /// Commands dropped by `single_action_per_frame`
    pub suppressed: usize,
}

/// Smoothed pointer-follow state.
#[derive(Debug, Clone)]
struct PointerFollow {
    config: PointerConfig,
    smoothed: Option<(f64, f64)>,
}

impl PointerFollow {
    fn update(&mut self, tracker: &IdentityTracker) -> Option<(f64, f64)> {
        let cfg = self.config;
        let visible = move |hand: Hand| tracker.track(hand).filter(|t| t.is_visible());
        let Some(track) = visible(cfg.preferred_hand).or_else(|| visible(cfg.preferred_hand.opposite())) else {
            self.smoothed = None;
            return None;
        };

        let tip = track.landmarks[INDEX_TIP];
        let x = ((tip.x - cfg.input_min[0]) / (cfg.input_max[0] - cfg.input_min[0])).clamp(0.0, 1.0);
        let y = ((tip.y - cfg.input_min[1]) / (cfg.input_max[1] - cfg.input_min[1])).clamp(0.0, 1.0);

        let next = match self.smoothed {
            Some((sx, sy)) => (sx + cfg.alpha * (x - sx), sy + cfg.alpha * (y - sy)),
            None => (x, y),
        };
        if !(next.0.is_finite() && next.1.is_finite()) {
            return self.smoothed;
        }
        self.smoothed = Some(next);
        Some(next)
    }
}

/// Binding table of the active profile, indexed by channel.
#[derive(Debug, Clone)]
pub struct ActionMapper {
    profile: Profile,
    binding_by_channel: Vec<Option<usize>>,
    pointer: Option<PointerFollow>,
}

impl ActionMapper {
    /// Resolves every binding to its channel in `bank`.
    pub fn new(profile: Profile, bank: &ChannelBank) -> Self {
        let mut binding_by_channel = vec![None; bank.len()];
        for (i, binding) in profile.bindings.iter().enumerate() {
            let key = ChannelKey::new(binding.gesture, binding.hands);
            if let Some(index) = bank.index_of(&key) {
                binding_by_channel[index] = Some(i);
            }
        }
        let pointer = profile
            .pointer
            .filter(|p| p.enabled)
            .map(|config| PointerFollow { config, smoothed: None });

        Self {
            profile,
            binding_by_channel,
            pointer,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Writes per-binding debounce overrides into the bank.
    pub fn configure_bank(&self, bank: &mut ChannelBank, defaults: &DebounceDefaults) {
        for (index, slot) in self.binding_by_channel.iter().enumerate() {
            let (Some(b), Some(channel)) = (slot.map(|i| &self.profile.bindings[i]), bank.channel(index)) else {
                continue;
            };
            let params = defaults
                .for_kind(channel.key.kind)
                .with_overrides(b.cooldown_ms, b.min_confidence, b.min_hold_ms);
            bank.set_params(index, params);
        }
    }

    pub fn binding_for(&self, channel: usize) -> Option<&Binding> {
        self.binding_by_channel
            .get(channel)
            .copied()
            .flatten()
            .map(|i| &self.profile.bindings[i])
    }

    /// Maps this frame's confirmed events.
    pub fn map_events(&self, events: &[(usize, GestureEvent)]) -> MapResult {
        let mut out = MapResult::default();

        for (channel, event) in events {
            let Some(binding) = self.binding_for(*channel) else {
                debug!("Unbound gesture {} ignored", event.key());
                out.unbound += 1;
                continue;
            };
            if binding.is_emergency_stop() {
                out.emergency = true;
                continue;
            }

            let intensity = binding.intensity.evaluate(&event.features, event.confidence);
            let confirmation = binding
                .confirmation
                .map(|c| (ChannelKey::new(c.gesture, c.hands), c.window_ms));
            out.commands.push(MappedCommand {
                command: ActionCommand::new(event.sequence, event.timestamp_ms, binding.action.clone(), intensity),
                priority: binding.priority,
                confirmation,
            });
        }

        // Stable: equal priorities keep channel order
        out.commands.sort_by(|a, b| b.priority.cmp(&a.priority));

        if self.profile.single_action_per_frame && out.commands.len() > 1 {
            out.suppressed = out.commands.len() - 1;
            out.commands.truncate(1);
        }
        out
    }

    /// Continuous pointer-move command for this frame, if pointer follow is on
    /// and a hand is visible.
    pub fn pointer_command(&mut self, sequence: u64, timestamp_ms: u64, tracker: &IdentityTracker) -> Option<MappedCommand> {
        let (x, y) = self.pointer.as_mut()?.update(tracker)?;
        Some(MappedCommand {
            command: ActionCommand::new(sequence, timestamp_ms, Action::PointerMove { x, y }, 1.0),
            priority: i32::MIN,
            confirmation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{GestureFeatures, GestureKind, HandSet, MotionKind, StaticPose};
    use crate::profile::ProfileKind;
    use crate::synthetic::{HandShape, SyntheticHand};
    use aircontrol_env::{Handedness, LandmarkFrame, PointerButton};

    fn event(kind: GestureKind, hands: HandSet, speed: f64) -> GestureEvent {
        GestureEvent {
            kind,
            hands,
            confidence: 0.9,
            features: GestureFeatures {
                speed,
                ..Default::default()
            },
            timestamp_ms: 100,
            sequence: 3,
        }
    }

    fn setup(profile: Profile) -> (ActionMapper, ChannelBank) {
        let bank = ChannelBank::new(&DebounceDefaults::default(), &profile.bimanual_definitions());
        (ActionMapper::new(profile, &bank), bank)
    }

    fn indexed(bank: &ChannelBank, e: GestureEvent) -> (usize, GestureEvent) {
        (bank.index_of(&e.key()).unwrap(), e)
    }

    #[test]
    fn test_maps_bound_event() {
        let (mapper, bank) = setup(Profile::game());
        let e = indexed(&bank, event(GestureKind::Static(StaticPose::Pinch), HandSet::Right, 0.0));

        let out = mapper.map_events(&[e]);
        assert_eq!(out.commands.len(), 1);
        let cmd = &out.commands[0].command;
        assert_eq!(cmd.action, Action::PointerClick { button: PointerButton::Left });
        assert_eq!(cmd.sequence, 3);
        assert_eq!(cmd.timestamp_ms, 100);
    }

    #[test]
    fn test_unbound_event_dropped() {
        let (mapper, bank) = setup(Profile::game());
        let e = indexed(&bank, event(GestureKind::Static(StaticPose::Fist), HandSet::Left, 0.0));

        let out = mapper.map_events(&[e]);
        assert!(out.commands.is_empty());
        assert_eq!(out.unbound, 1);
    }

    #[test]
    fn test_priority_order_and_single_action() {
        let mut profile = Profile::game();
        let (mapper, bank) = setup(profile.clone());
        let scroll = indexed(&bank, event(GestureKind::Static(StaticPose::TwoUp), HandSet::Right, 0.0));
        let click = indexed(&bank, event(GestureKind::Static(StaticPose::Pinch), HandSet::Left, 0.0));

        let out = mapper.map_events(&[scroll, click]);
        assert_eq!(out.commands[0].command.action, Action::PointerClick { button: PointerButton::Right });
        assert_eq!(out.commands.len(), 2);

        profile.single_action_per_frame = true;
        let (mapper, _) = setup(profile);
        let out = mapper.map_events(&[scroll, click]);
        assert_eq!(out.commands.len(), 1);
        assert_eq!(out.suppressed, 1);
    }

    #[test]
    fn test_emergency_binding_flags_stop() {
        let (mapper, bank) = setup(Profile::machine());
        let e = indexed(&bank, event(GestureKind::Static(StaticPose::Fist), HandSet::Left, 0.0));

        let out = mapper.map_events(&[e]);
        assert!(out.emergency);
        assert!(out.commands.is_empty());
    }

    #[test]
    fn test_intensity_from_speed() {
        let (mapper, bank) = setup(Profile::machine());
        let e = indexed(&bank, event(GestureKind::Dynamic(MotionKind::SwipeRight), HandSet::Right, 3.0));

        let out = mapper.map_events(&[e]);
        assert!((out.commands[0].command.intensity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_overrides_written_to_bank() {
        let (mapper, mut bank) = setup(Profile::game());
        mapper.configure_bank(&mut bank, &DebounceDefaults::default());

        let key = ChannelKey::new(GestureKind::Static(StaticPose::Pinch), HandSet::Right);
        let channel = bank.channel(bank.index_of(&key).unwrap()).unwrap();
        assert_eq!(channel.params.cooldown_ms, 450);
    }

    #[test]
    fn test_pointer_follows_preferred_hand() {
        let (mut mapper, _) = setup(Profile::game());
        let mut tracker = IdentityTracker::with_defaults();
        let left = SyntheticHand::new(HandShape::Point).at(0.2, 0.8).observation(Handedness::Left, 0.9);
        let right = SyntheticHand::new(HandShape::Point).at(0.7, 0.8).observation(Handedness::Right, 0.9);

        tracker.update(&LandmarkFrame::new(0, 0).with_hand(left.clone()).with_hand(right));
        let cmd = mapper.pointer_command(0, 0, &tracker).unwrap();
        match cmd.command.action {
            Action::PointerMove { x, .. } => assert!(x > 0.5),
            ref other => panic!("unexpected {:?}", other),
        }

        // Right hand gone: falls back to the left one
        tracker.update(&LandmarkFrame::new(1, 33).with_hand(left));
        let cmd = mapper.pointer_command(1, 33, &tracker).unwrap();
        match cmd.command.action {
            Action::PointerMove { x, .. } => assert!(x < 0.7),
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_pointer_without_section() {
        let profile = Profile::new("plain", ProfileKind::Game);
        let (mut mapper, _) = setup(profile);
        let tracker = IdentityTracker::with_defaults();
        assert!(mapper.pointer_command(0, 0, &tracker).is_none());
    }
}
