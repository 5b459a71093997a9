//! The "DEBOUNCE" Engine - per-channel confidence state machines
//!
//! Every (gesture kind × hand set) pair owns one channel:
//!
//! ```text
//! IDLE ──entry──▶ CANDIDATE ──hold──▶ CONFIRMED ──▶ COOLDOWN ──elapsed──▶ IDLE
//!                     │                                    (same frame may
//!                     └──drop / below threshold──▶ IDLE      re-enter)
//! ```
//!
//! A channel emits exactly one event per confirmation and nothing while it
//! cools down. Channels live in a fixed bank addressed by index; nothing is
//! allocated per frame beyond the output vector.

use crate::combiner::BimanualDefinition;
use crate::gesture::{
    ChannelKey, GestureCandidate, GestureEvent, GestureKind, Hand, HandGesture, HandSet, MotionKind,
    StaticPose, PER_HAND_KIND_COUNT,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// PARAMETERS
// ============================================================================

/// Thresholds and timings of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceParams {
    /// Confidence that opens a candidate (default: 0.6)
    pub entry_threshold: f64,

    /// Confidence that accumulates hold time (default: 0.8)
    pub confirm_threshold: f64,

    /// Time above `confirm_threshold` needed to confirm (default: 150 ms)
    pub min_hold_ms: u64,

    /// Quiet time after a confirmation (default: 500 ms)
    pub cooldown_ms: u64,
}

impl Default for DebounceParams {
    fn default() -> Self {
        Self {
            entry_threshold: 0.6,
            confirm_threshold: 0.8,
            min_hold_ms: 150,
            cooldown_ms: 500,
        }
    }
}

impl DebounceParams {
    /// Applies per-binding overrides. A `min_confidence` replaces the confirm
    /// threshold and lowers the entry threshold if needed.
    pub fn with_overrides(mut self, cooldown_ms: Option<u64>, min_confidence: Option<f64>, min_hold_ms: Option<u64>) -> Self {
        if let Some(cooldown) = cooldown_ms {
            self.cooldown_ms = cooldown;
        }
        if let Some(confidence) = min_confidence {
            self.confirm_threshold = confidence;
            self.entry_threshold = self.entry_threshold.min(confidence);
        }
        if let Some(hold) = min_hold_ms {
            self.min_hold_ms = hold;
        }
        self
    }
}

/// Class defaults: static poses, dynamic motions, bi-manual pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceDefaults {
    pub static_pose: DebounceParams,
    pub dynamic: DebounceParams,
    pub bimanual: DebounceParams,
}

impl Default for DebounceDefaults {
    fn default() -> Self {
        Self {
            static_pose: DebounceParams::default(),
            // Motions are already integrated over a window: confirm at once
            dynamic: DebounceParams {
                entry_threshold: 0.5,
                confirm_threshold: 0.6,
                min_hold_ms: 0,
                cooldown_ms: 600,
            },
            bimanual: DebounceParams {
                entry_threshold: 0.6,
                confirm_threshold: 0.75,
                min_hold_ms: 100,
                cooldown_ms: 600,
            },
        }
    }
}

impl DebounceDefaults {
    pub fn for_kind(&self, kind: GestureKind) -> DebounceParams {
        match kind {
            GestureKind::Static(_) => self.static_pose,
            GestureKind::Dynamic(_) => self.dynamic,
            GestureKind::Bimanual { .. } => self.bimanual,
        }
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

/// Debounce phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelPhase {
    Idle,
    Candidate,
    /// Transient: a channel confirms and enters cooldown in the same step
    Confirmed,
    Cooldown,
}

/// One debounce state machine.
#[derive(Debug, Clone)]
pub struct GestureChannel {
    pub key: ChannelKey,
    pub params: DebounceParams,
    phase: ChannelPhase,
    /// When the current phase was entered
    phase_since_ms: u64,
    /// First frame at or above the confirm threshold in the current candidacy
    hold_start_ms: Option<u64>,
    last_confirmed_ms: Option<u64>,
}

impl GestureChannel {
    pub fn new(key: ChannelKey, params: DebounceParams) -> Self {
        Self {
            key,
            params,
            phase: ChannelPhase::Idle,
            phase_since_ms: 0,
            hold_start_ms: None,
            last_confirmed_ms: None,
        }
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn phase_since_ms(&self) -> u64 {
        self.phase_since_ms
    }

    pub fn last_confirmed_ms(&self) -> Option<u64> {
        self.last_confirmed_ms
    }

    pub fn reset(&mut self) {
        self.phase = ChannelPhase::Idle;
        self.phase_since_ms = 0;
        self.hold_start_ms = None;
        self.last_confirmed_ms = None;
    }

    fn enter(&mut self, phase: ChannelPhase, now: u64) {
        if self.phase != phase {
            debug!("Channel {}: {:?} -> {:?} at {} ms", self.key, self.phase, phase, now);
        }
        self.phase = phase;
        self.phase_since_ms = now;
    }

    fn go_idle(&mut self, now: u64) {
        self.hold_start_ms = None;
        self.enter(ChannelPhase::Idle, now);
    }

    /// Advances the machine by one frame.
    ///
    /// `candidate` is this channel's candidate for the frame, if any.
    pub fn advance(&mut self, now: u64, sequence: u64, candidate: Option<&GestureCandidate>) -> Option<GestureEvent> {
        let p = self.params;

        if self.phase == ChannelPhase::Cooldown {
            let since = self.last_confirmed_ms.unwrap_or(self.phase_since_ms);
            if now.saturating_sub(since) < p.cooldown_ms {
                return None;
            }
            self.go_idle(now);
        }

        let confidence = candidate.map(|c| c.confidence);

        match self.phase {
            ChannelPhase::Idle => match confidence {
                Some(conf) if conf >= p.entry_threshold => {
                    self.enter(ChannelPhase::Candidate, now);
                    self.hold_start_ms = (conf >= p.confirm_threshold).then_some(now);
                }
                _ => return None,
            },
            ChannelPhase::Candidate => match (confidence, self.hold_start_ms) {
                (None, _) => {
                    self.go_idle(now);
                    return None;
                }
                (Some(conf), Some(_)) if conf < p.confirm_threshold => {
                    self.go_idle(now);
                    return None;
                }
                (Some(conf), None) if conf < p.entry_threshold => {
                    self.go_idle(now);
                    return None;
                }
                (Some(conf), None) if conf >= p.confirm_threshold => {
                    self.hold_start_ms = Some(now);
                }
                _ => {}
            },
            ChannelPhase::Confirmed | ChannelPhase::Cooldown => return None,
        }

        let start = self.hold_start_ms?;
        if now.saturating_sub(start) < p.min_hold_ms {
            return None;
        }
        let candidate = candidate?;

        self.enter(ChannelPhase::Confirmed, now);
        let event = GestureEvent {
            kind: candidate.kind,
            hands: candidate.hands,
            confidence: candidate.confidence,
            features: candidate.features,
            timestamp_ms: now,
            sequence,
        };
        self.last_confirmed_ms = Some(now);
        self.hold_start_ms = None;
        self.enter(ChannelPhase::Cooldown, now);
        Some(event)
    }
}

// ============================================================================
// CHANNEL BANK
// ============================================================================

/// Number of single-hand channels: every per-hand kind × {left, right}.
pub const SINGLE_HAND_CHANNELS: usize = PER_HAND_KIND_COUNT * 2;

fn single_hand_key(index: usize) -> ChannelKey {
    let hand = if index % 2 == 0 { Hand::Left } else { Hand::Right };
    let kind_index = index / 2;
    let kind = if kind_index < StaticPose::ALL.len() {
        GestureKind::Static(StaticPose::ALL[kind_index])
    } else {
        GestureKind::Dynamic(MotionKind::ALL[kind_index - StaticPose::ALL.len()])
    };
    ChannelKey::new(kind, hand.into())
}

/// Fixed, index-addressed set of channels built at profile load.
#[derive(Debug, Clone)]
pub struct ChannelBank {
    channels: Vec<GestureChannel>,
    definitions: Vec<BimanualDefinition>,
    /// Scratch buffer: best candidate per channel this frame
    slots: Vec<Option<GestureCandidate>>,
}

impl ChannelBank {
    pub fn new(defaults: &DebounceDefaults, definitions: &[BimanualDefinition]) -> Self {
        let mut channels = Vec::with_capacity(SINGLE_HAND_CHANNELS + definitions.len());
        for i in 0..SINGLE_HAND_CHANNELS {
            let key = single_hand_key(i);
            channels.push(GestureChannel::new(key, defaults.for_kind(key.kind)));
        }
        for def in definitions {
            let key = ChannelKey::new(def.kind(), HandSet::Both);
            channels.push(GestureChannel::new(key, defaults.bimanual));
        }
        let len = channels.len();
        Self {
            channels,
            definitions: definitions.to_vec(),
            slots: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel index for a key, if the bank has such a channel.
    pub fn index_of(&self, key: &ChannelKey) -> Option<usize> {
        match (key.kind.as_hand_gesture(), key.hands.single()) {
            (Some(gesture), Some(hand)) => Some(Self::single_hand_index(gesture, hand)),
            (None, None) => self
                .definitions
                .iter()
                .position(|d| d.kind() == key.kind)
                .map(|i| SINGLE_HAND_CHANNELS + i),
            _ => None,
        }
    }

    #[inline]
    pub fn single_hand_index(gesture: HandGesture, hand: Hand) -> usize {
        gesture.index() * 2 + hand.index()
    }

    pub fn channel(&self, index: usize) -> Option<&GestureChannel> {
        self.channels.get(index)
    }

    pub fn channels(&self) -> &[GestureChannel] {
        &self.channels
    }

    /// Replaces the parameters of one channel.
    pub fn set_params(&mut self, index: usize, params: DebounceParams) {
        if let Some(channel) = self.channels.get_mut(index) {
            channel.params = params;
        }
    }

    /// Returns every channel to IDLE.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }

    /// Advances every channel with this frame's candidates.
    ///
    /// Returns `(channel index, event)` pairs in index order.
    pub fn step(&mut self, now: u64, sequence: u64, candidates: &[GestureCandidate]) -> Vec<(usize, GestureEvent)> {
        self.slots.iter_mut().for_each(|s| *s = None);
        for candidate in candidates {
            let Some(index) = self.index_of(&candidate.key()) else {
                continue;
            };
            let slot = &mut self.slots[index];
            if slot.map_or(true, |s| candidate.confidence > s.confidence) {
                *slot = Some(*candidate);
            }
        }

        let mut events = Vec::new();
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if let Some(event) = channel.advance(now, sequence, self.slots[index].as_ref()) {
                events.push((index, event));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::GestureFeatures;

    fn pinch(confidence: f64) -> GestureCandidate {
        GestureCandidate::new(
            GestureKind::Static(StaticPose::Pinch),
            HandSet::Right,
            confidence,
            GestureFeatures::default(),
        )
    }

    fn channel() -> GestureChannel {
        GestureChannel::new(pinch(1.0).key(), DebounceParams::default())
    }

    #[test]
    fn test_pinch_hold_confirms_once() {
        // 10 frames at 30 fps, constant confidence above confirm
        let mut ch = channel();
        let mut events = Vec::new();
        for i in 0..10u64 {
            let now = i * 1000 / 30;
            if let Some(e) = ch.advance(now, i, Some(&pinch(0.9))) {
                events.push(e);
            }
        }

        assert_eq!(events.len(), 1);
        let t = events[0].timestamp_ms;
        assert!((150..=200).contains(&t), "confirmed at {} ms", t);
        assert_eq!(ch.phase(), ChannelPhase::Cooldown);
    }

    #[test]
    fn test_dip_below_confirm_resets_hold() {
        let mut ch = channel();
        assert!(ch.advance(0, 0, Some(&pinch(0.9))).is_none());
        assert!(ch.advance(100, 1, Some(&pinch(0.7))).is_none());
        assert_eq!(ch.phase(), ChannelPhase::Idle);

        // Hold restarts from scratch
        assert!(ch.advance(133, 2, Some(&pinch(0.9))).is_none());
        assert!(ch.advance(250, 3, Some(&pinch(0.9))).is_none());
        assert!(ch.advance(283, 4, Some(&pinch(0.9))).is_some());
    }

    #[test]
    fn test_hold_starts_at_first_confirm_frame() {
        let mut ch = channel();
        // Entry but below confirm: candidate without accumulation
        ch.advance(0, 0, Some(&pinch(0.7)));
        assert_eq!(ch.phase(), ChannelPhase::Candidate);
        ch.advance(100, 1, Some(&pinch(0.7)));
        assert_eq!(ch.phase(), ChannelPhase::Candidate);

        ch.advance(200, 2, Some(&pinch(0.85)));
        assert!(ch.advance(300, 3, Some(&pinch(0.85))).is_none());
        assert!(ch.advance(350, 4, Some(&pinch(0.85))).is_some());
    }

    #[test]
    fn test_missing_candidate_returns_go_idle() {
        let mut ch = channel();
        ch.advance(0, 0, Some(&pinch(0.9)));
        ch.advance(33, 1, None);
        assert_eq!(ch.phase(), ChannelPhase::Idle);
    }

    #[test]
    fn test_cooldown_spacing() {
        let mut ch = channel();
        let mut times = Vec::new();
        for i in 0..120u64 {
            let now = i * 33;
            if let Some(e) = ch.advance(now, i, Some(&pinch(0.95))) {
                times.push(e.timestamp_ms);
            }
        }

        assert!(times.len() >= 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= 500 + 150);
        }
    }

    #[test]
    fn test_cooldown_expiry_can_start_candidate_same_frame() {
        let params = DebounceParams {
            min_hold_ms: 0,
            cooldown_ms: 100,
            ..Default::default()
        };
        let mut ch = GestureChannel::new(pinch(1.0).key(), params);
        assert!(ch.advance(0, 0, Some(&pinch(0.9))).is_some());
        assert!(ch.advance(50, 1, Some(&pinch(0.9))).is_none());
        // Cooldown elapsed: IDLE → CANDIDATE → confirmed within one step
        assert!(ch.advance(100, 2, Some(&pinch(0.9))).is_some());
    }

    #[test]
    fn test_overrides() {
        let p = DebounceParams::default().with_overrides(Some(900), Some(0.5), Some(0));
        assert_eq!(p.cooldown_ms, 900);
        assert_eq!(p.confirm_threshold, 0.5);
        assert_eq!(p.entry_threshold, 0.5);
        assert_eq!(p.min_hold_ms, 0);
    }

    #[test]
    fn test_bank_indexing() {
        let def = BimanualDefinition::new(
            HandGesture::Static(StaticPose::Pinch),
            HandGesture::Dynamic(MotionKind::SwipeRight),
        );
        let bank = ChannelBank::new(&DebounceDefaults::default(), &[def]);
        assert_eq!(bank.len(), SINGLE_HAND_CHANNELS + 1);

        for (i, ch) in bank.channels().iter().enumerate() {
            assert_eq!(bank.index_of(&ch.key), Some(i));
        }
        // Undeclared pair has no channel
        let other = ChannelKey::new(
            GestureKind::Bimanual {
                left: HandGesture::Static(StaticPose::Fist),
                right: HandGesture::Static(StaticPose::Fist),
            },
            HandSet::Both,
        );
        assert_eq!(bank.index_of(&other), None);
    }

    #[test]
    fn test_bank_step_routes_candidates() {
        let mut bank = ChannelBank::new(&DebounceDefaults::default(), &[]);
        let swipe = GestureCandidate::new(
            GestureKind::Dynamic(MotionKind::SwipeLeft),
            HandSet::Left,
            0.9,
            GestureFeatures::default(),
        );

        let events = bank.step(0, 0, &[swipe, pinch(0.9)]);
        // Dynamic defaults confirm immediately, the pinch needs its hold
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.kind, GestureKind::Dynamic(MotionKind::SwipeLeft));
        let pinch_index = bank.index_of(&pinch(0.9).key()).unwrap();
        assert_eq!(bank.channel(pinch_index).unwrap().phase(), ChannelPhase::Candidate);

        bank.reset();
        assert!(bank.channels().iter().all(|c| c.phase() == ChannelPhase::Idle));
    }
}
