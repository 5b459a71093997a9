//! The "IDENTITY" Engine - stable left/right hand tracks
//!
//! Assigns each landmark observation to at most one of two hand tracks:
//! - Confident, labeled observations claim the track of their label
//! - Ambiguous observations continue the single unclaimed live track
//! - Label flips implied by ambiguous observations need two frames
//! - Tracks unseen for `loss_timeout_ms` are dropped before matching

use crate::gesture::Hand;
use crate::landmarks::{palm_center, Landmarks};
use crate::motion::{MotionConfig, MotionFilter, MotionState};
use aircontrol_env::{HandObservation, LandmarkFrame};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the identity tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Drop a track not seen for longer than this (default: 250 ms)
    pub loss_timeout_ms: u64,

    /// Handedness confidence needed to claim or create a track (default: 0.6)
    pub min_handedness_confidence: f64,

    /// Motion states kept per track (default: 32)
    pub history_len: usize,

    /// How far outside the normalized image a landmark may lie before the
    /// observation is discarded (default: 0.5)
    pub landmark_margin: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            loss_timeout_ms: 250,
            min_handedness_confidence: 0.6,
            history_len: 32,
            landmark_margin: 0.5,
        }
    }
}

// ============================================================================
// TRACKS
// ============================================================================

/// Generation counter of a hand identity; a re-acquired hand gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

/// One live hand identity.
#[derive(Debug, Clone)]
pub struct HandTrack {
    pub id: TrackId,
    pub hand: Hand,

    /// Recent motion states, oldest first
    history: VecDeque<MotionState>,
    history_len: usize,
    filter: MotionFilter,

    /// Timestamp of the last accepted observation
    pub last_seen_ms: u64,

    /// Timestamp the identity was created
    pub acquired_ms: u64,

    /// Consecutive frames without an observation
    pub occlusion_frames: u32,

    /// Landmarks of the last accepted observation
    pub landmarks: Landmarks,

    /// True if an observation was accepted in the latest frame
    visible: bool,
}

impl HandTrack {
    fn new(
        id: TrackId,
        hand: Hand,
        landmarks: Landmarks,
        timestamp_ms: u64,
        config: &TrackingConfig,
        motion: MotionConfig,
    ) -> Option<Self> {
        let mut track = Self {
            id,
            hand,
            history: VecDeque::with_capacity(config.history_len),
            history_len: config.history_len.max(1),
            filter: MotionFilter::new(motion),
            last_seen_ms: timestamp_ms,
            acquired_ms: timestamp_ms,
            occlusion_frames: 0,
            landmarks,
            visible: true,
        };
        track.observe(landmarks, timestamp_ms).then_some(track)
    }

    /// Accepts an observation; false if the filter rejected it.
    fn observe(&mut self, landmarks: Landmarks, timestamp_ms: u64) -> bool {
        let Some(state) = self.filter.update(&landmarks, timestamp_ms) else {
            return false;
        };
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(state);
        self.landmarks = landmarks;
        self.last_seen_ms = timestamp_ms;
        self.occlusion_frames = 0;
        self.visible = true;
        true
    }

    fn occlude(&mut self) {
        self.occlusion_frames = self.occlusion_frames.saturating_add(1);
        self.visible = false;
    }

    /// Most recent motion state (held while occluded).
    pub fn latest(&self) -> Option<&MotionState> {
        self.history.back()
    }

    /// Motion history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &MotionState> {
        self.history.iter()
    }

    /// True if the hand was observed in the latest frame.
    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Lifecycle signal emitted by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackEvent {
    Acquired { hand: Hand, id: TrackId },
    Lost { hand: Hand, id: TrackId },
}

/// Result of one tracker step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerUpdate {
    /// Lifecycle signals, `Lost` before `Acquired`
    pub events: Vec<TrackEvent>,

    /// Observations discarded as malformed (non-finite, out of range, or
    /// rejected by the motion filter)
    pub rejected: usize,

    /// Observations that matched no track
    pub unmatched: usize,
}

// ============================================================================
// TRACKER
// ============================================================================

/// Two-slot hand identity tracker.
#[derive(Debug, Clone)]
pub struct IdentityTracker {
    config: TrackingConfig,
    motion: MotionConfig,
    /// Indexed by `Hand::index()`
    tracks: [Option<HandTrack>; 2],
    next_id: u64,
    /// Label proposed by an ambiguous observation last frame
    pending_label: Option<Hand>,
}

impl IdentityTracker {
    pub fn new(config: TrackingConfig, motion: MotionConfig) -> Self {
        Self {
            config,
            motion,
            tracks: [None, None],
            next_id: 1,
            pending_label: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TrackingConfig::default(), MotionConfig::default())
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn track(&self, hand: Hand) -> Option<&HandTrack> {
        self.tracks[hand.index()].as_ref()
    }

    /// Live tracks, left first.
    pub fn tracks(&self) -> impl Iterator<Item = &HandTrack> {
        self.tracks.iter().flatten()
    }

    fn is_confident(&self, obs: &HandObservation) -> Option<Hand> {
        if obs.confidence >= self.config.min_handedness_confidence {
            Hand::from_handedness(obs.handedness)
        } else {
            None
        }
    }

    /// Processes one frame's observations.
    pub fn update(&mut self, frame: &LandmarkFrame) -> TrackerUpdate {
        let now = frame.timestamp_ms;
        let mut out = TrackerUpdate::default();

        // 1. Expire stale identities before anything can match them
        for slot in self.tracks.iter_mut() {
            let expired = slot
                .as_ref()
                .is_some_and(|t| now.saturating_sub(t.last_seen_ms) > self.config.loss_timeout_ms);
            if expired {
                if let Some(track) = slot.take() {
                    info!("Hand lost: {} {} (unseen for {} ms)", track.hand.as_str(), track.id, now.saturating_sub(track.last_seen_ms));
                    out.events.push(TrackEvent::Lost {
                        hand: track.hand,
                        id: track.id,
                    });
                }
            }
        }

        // 2. Drop malformed observations, keep the two most confident
        let margin = self.config.landmark_margin;
        let mut observations: Vec<&HandObservation> = frame
            .hands
            .iter()
            .filter(|obs| {
                let ok = obs.is_well_formed(margin);
                if !ok {
                    out.rejected += 1;
                }
                ok
            })
            .collect();
        observations.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        observations.truncate(2);

        // 3. Confident observations claim their label
        let mut claimed = [false; 2];
        let mut assigned: [Option<Landmarks>; 2] = [None, None];
        let mut ambiguous = Vec::new();
        for obs in observations {
            match self.is_confident(obs) {
                Some(hand) if !claimed[hand.index()] => {
                    claimed[hand.index()] = true;
                    assigned[hand.index()] = Some(obs.landmarks);
                }
                _ => ambiguous.push(obs),
            }
        }

        // 4. Ambiguous observations continue an unclaimed live track
        let mut next_pending = None;
        let mut relabeled_from = None;
        for obs in ambiguous {
            let label = Hand::from_handedness(obs.handedness);
            let unclaimed: Vec<Hand> = Hand::ALL
                .into_iter()
                .filter(|h| !claimed[h.index()] && self.tracks[h.index()].is_some())
                .collect();

            let target = match unclaimed.as_slice() {
                [only] => match label {
                    Some(l) if l != *only && !claimed[l.index()] => {
                        if self.pending_label == Some(l) {
                            debug!("Identity change to {} confirmed on second frame", l.as_str());
                            relabeled_from = Some(*only);
                            Some(l)
                        } else {
                            debug!("Identity change {} -> {} held one frame", only.as_str(), l.as_str());
                            next_pending = Some(l);
                            Some(*only)
                        }
                    }
                    _ => Some(*only),
                },
                // Both free: position beats an unreliable label
                [_, _] => self.nearest_track(&obs.landmarks),
                _ => None,
            };

            match target {
                Some(hand) if self.tracks[hand.index()].is_some() || self.pending_label == Some(hand) => {
                    claimed[hand.index()] = true;
                    assigned[hand.index()] = Some(obs.landmarks);
                }
                _ => out.unmatched += 1,
            }
        }
        self.pending_label = next_pending;

        // 5. A committed relabel retires the identity it replaces
        if let Some(old) = relabeled_from.filter(|h| assigned[h.index()].is_none()) {
            if let Some(track) = self.tracks[old.index()].take() {
                info!("Hand lost: {} {} (relabeled)", track.hand.as_str(), track.id);
                out.events.push(TrackEvent::Lost {
                    hand: track.hand,
                    id: track.id,
                });
            }
        }

        // 6. Apply: continue, create, or occlude
        for hand in Hand::ALL {
            let i = hand.index();
            match (assigned[i], self.tracks[i].is_some()) {
                (Some(landmarks), true) => {
                    if let Some(track) = self.tracks[i].as_mut() {
                        if !track.observe(landmarks, now) {
                            debug!("{} {}: motion filter rejected observation", hand.as_str(), track.id);
                            track.occlude();
                            out.rejected += 1;
                        }
                    }
                }
                (Some(landmarks), false) => {
                    // The id is only consumed by a track that was actually created
                    let id = TrackId(self.next_id);
                    match HandTrack::new(id, hand, landmarks, now, &self.config, self.motion) {
                        Some(track) => {
                            self.next_id += 1;
                            info!("Hand acquired: {} {}", hand.as_str(), id);
                            self.tracks[i] = Some(track);
                            out.events.push(TrackEvent::Acquired { hand, id });
                        }
                        None => out.rejected += 1,
                    }
                }
                (None, _) => {
                    if let Some(track) = self.tracks[i].as_mut() {
                        track.occlude();
                    }
                }
            }
        }

        out
    }

    fn nearest_track(&self, landmarks: &Landmarks) -> Option<Hand> {
        let center = palm_center(landmarks);
        self.tracks()
            .map(|t| (t.hand, (palm_center(&t.landmarks) - center).norm()))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(hand, _)| hand)
    }

    /// Drops every track without emitting signals.
    pub fn clear(&mut self) {
        self.tracks = [None, None];
        self.pending_label = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{HandShape, SyntheticHand};
    use aircontrol_env::Handedness;

    fn obs(label: Handedness, confidence: f64, x: f64) -> HandObservation {
        SyntheticHand::new(HandShape::OpenPalm).at(x, 0.6).observation(label, confidence)
    }

    fn frame(seq: u64, ts: u64, hands: Vec<HandObservation>) -> LandmarkFrame {
        LandmarkFrame {
            sequence: seq,
            timestamp_ms: ts,
            hands,
        }
    }

    #[test]
    fn test_confident_observation_creates_track() {
        let mut tracker = IdentityTracker::with_defaults();
        let update = tracker.update(&frame(0, 0, vec![obs(Handedness::Right, 0.9, 0.7)]));

        assert_eq!(update.events.len(), 1);
        assert!(matches!(update.events[0], TrackEvent::Acquired { hand: Hand::Right, .. }));
        assert!(tracker.track(Hand::Right).is_some());
        assert!(tracker.track(Hand::Left).is_none());
    }

    #[test]
    fn test_low_confidence_does_not_create_track() {
        let mut tracker = IdentityTracker::with_defaults();
        let update = tracker.update(&frame(0, 0, vec![obs(Handedness::Right, 0.3, 0.7)]));

        assert!(update.events.is_empty());
        assert_eq!(update.unmatched, 1);
        assert!(tracker.tracks().next().is_none());
    }

    #[test]
    fn test_occlusion_holds_state_then_expires() {
        let mut tracker = IdentityTracker::with_defaults();
        tracker.update(&frame(0, 0, vec![obs(Handedness::Left, 0.9, 0.3)]));
        let held = *tracker.track(Hand::Left).unwrap().latest().unwrap();

        // 200 ms gap: occluded but alive
        let update = tracker.update(&frame(1, 200, vec![]));
        assert!(update.events.is_empty());
        let track = tracker.track(Hand::Left).unwrap();
        assert_eq!(track.occlusion_frames, 1);
        assert!(!track.is_visible());
        assert_eq!(*track.latest().unwrap(), held);

        // 300 ms since last seen: expired
        let update = tracker.update(&frame(2, 300, vec![]));
        assert!(matches!(update.events[..], [TrackEvent::Lost { hand: Hand::Left, .. }]));
        assert!(tracker.track(Hand::Left).is_none());
    }

    #[test]
    fn test_reacquire_gets_fresh_identity() {
        let mut tracker = IdentityTracker::with_defaults();
        tracker.update(&frame(0, 0, vec![obs(Handedness::Right, 0.9, 0.7)]));
        let first_id = tracker.track(Hand::Right).unwrap().id;

        let update = tracker.update(&frame(1, 400, vec![obs(Handedness::Right, 0.9, 0.7)]));
        assert_eq!(update.events.len(), 2);
        assert!(matches!(update.events[0], TrackEvent::Lost { hand: Hand::Right, id } if id == first_id));
        assert!(matches!(update.events[1], TrackEvent::Acquired { hand: Hand::Right, id } if id != first_id));
        assert_eq!(tracker.track(Hand::Right).unwrap().history().count(), 1);
    }

    #[test]
    fn test_nan_observation_discarded() {
        let mut tracker = IdentityTracker::with_defaults();
        let mut bad = obs(Handedness::Right, 0.9, 0.7);
        bad.landmarks[4].x = f64::NAN;

        let update = tracker.update(&frame(0, 0, vec![bad]));
        assert_eq!(update.rejected, 1);
        assert!(tracker.tracks().next().is_none());
    }

    #[test]
    fn test_out_of_range_landmark_discarded() {
        let mut tracker = IdentityTracker::with_defaults();
        tracker.update(&frame(0, 0, vec![obs(Handedness::Left, 0.9, 0.3)]));
        let held = *tracker.track(Hand::Left).unwrap().latest().unwrap();

        // Finite but far off-frame: treated as absent
        let mut glitch = obs(Handedness::Left, 0.9, 0.3);
        glitch.landmarks[0].x = 40.0;
        let update = tracker.update(&frame(1, 33, vec![glitch]));

        assert_eq!(update.rejected, 1);
        let track = tracker.track(Hand::Left).unwrap();
        assert!(!track.is_visible());
        assert!((track.landmarks[0].x - 0.3).abs() < 1e-9);
        assert_eq!(*track.latest().unwrap(), held);
        assert_eq!(track.history().count(), 1);
    }

    #[test]
    fn test_overflowing_observation_creates_no_track() {
        let mut tracker = IdentityTracker::with_defaults();
        let mut huge = obs(Handedness::Right, 0.9, 0.7);
        for lm in huge.landmarks.iter_mut() {
            lm.x = 1.7e308;
        }

        let update = tracker.update(&frame(0, 0, vec![huge]));
        assert_eq!(update.rejected, 1);
        assert!(update.events.is_empty());
        assert!(tracker.tracks().next().is_none());
    }

    #[test]
    fn test_confidence_out_of_range_discarded() {
        let mut tracker = IdentityTracker::with_defaults();
        let update = tracker.update(&frame(0, 0, vec![obs(Handedness::Left, 7.5, 0.3)]));

        assert_eq!(update.rejected, 1);
        assert!(update.events.is_empty());
        assert!(tracker.track(Hand::Left).is_none());
    }

    #[test]
    fn test_slightly_off_frame_hand_still_tracked() {
        let mut tracker = IdentityTracker::with_defaults();
        let update = tracker.update(&frame(0, 0, vec![obs(Handedness::Right, 0.9, 1.05)]));

        assert_eq!(update.rejected, 0);
        assert!(tracker.track(Hand::Right).is_some_and(|t| t.is_visible()));
    }

    #[test]
    fn test_keeps_two_most_confident() {
        let mut tracker = IdentityTracker::with_defaults();
        let update = tracker.update(&frame(
            0,
            0,
            vec![
                obs(Handedness::Left, 0.65, 0.2),
                obs(Handedness::Right, 0.95, 0.7),
                obs(Handedness::Left, 0.9, 0.3),
            ],
        ));

        assert_eq!(update.events.len(), 2);
        let left = tracker.track(Hand::Left).unwrap();
        assert!((left.landmarks[0].x - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_label_continues_other_track() {
        let mut tracker = IdentityTracker::with_defaults();
        tracker.update(&frame(
            0,
            0,
            vec![obs(Handedness::Left, 0.9, 0.3), obs(Handedness::Right, 0.9, 0.7)],
        ));
        let left_id = tracker.track(Hand::Left).unwrap().id;

        // Both labeled Right for two frames; the left track must survive
        for i in 1..3 {
            let update = tracker.update(&frame(
                i,
                i * 33,
                vec![obs(Handedness::Right, 0.95, 0.7), obs(Handedness::Right, 0.9, 0.3)],
            ));
            assert!(update.events.is_empty());
        }
        let left = tracker.track(Hand::Left).unwrap();
        assert_eq!(left.id, left_id);
        assert!(left.is_visible());
    }

    #[test]
    fn test_ambiguous_label_flip_held_one_frame() {
        let mut tracker = IdentityTracker::with_defaults();
        tracker.update(&frame(0, 0, vec![obs(Handedness::Right, 0.9, 0.7)]));

        // Low-confidence Left label: first frame continues the right track
        let update = tracker.update(&frame(1, 33, vec![obs(Handedness::Left, 0.4, 0.7)]));
        assert!(update.events.is_empty());
        assert!(tracker.track(Hand::Right).unwrap().is_visible());
        assert!(tracker.track(Hand::Left).is_none());

        // Same label again: the change commits and the old identity is retired
        let right_id = tracker.track(Hand::Right).unwrap().id;
        let update = tracker.update(&frame(2, 66, vec![obs(Handedness::Left, 0.4, 0.7)]));
        assert!(matches!(
            update.events[..],
            [TrackEvent::Lost { hand: Hand::Right, id }, TrackEvent::Acquired { hand: Hand::Left, .. }] if id == right_id
        ));
        assert!(tracker.track(Hand::Right).is_none());
        assert_eq!(tracker.tracks().count(), 1);
    }

    #[test]
    fn test_both_ambiguous_follow_position() {
        let mut tracker = IdentityTracker::with_defaults();
        tracker.update(&frame(
            0,
            0,
            vec![obs(Handedness::Left, 0.9, 0.3), obs(Handedness::Right, 0.9, 0.7)],
        ));

        // Labels swapped and unsure: identities stay with their positions
        tracker.update(&frame(
            1,
            33,
            vec![obs(Handedness::Right, 0.4, 0.31), obs(Handedness::Left, 0.4, 0.69)],
        ));
        assert!((tracker.track(Hand::Left).unwrap().landmarks[0].x - 0.31).abs() < 1e-9);
        assert!((tracker.track(Hand::Right).unwrap().landmarks[0].x - 0.69).abs() < 1e-9);
    }

    #[test]
    fn test_single_flicker_does_not_change_identity() {
        let mut tracker = IdentityTracker::with_defaults();
        tracker.update(&frame(0, 0, vec![obs(Handedness::Right, 0.9, 0.7)]));
        let id = tracker.track(Hand::Right).unwrap().id;

        tracker.update(&frame(1, 33, vec![obs(Handedness::Left, 0.4, 0.7)]));
        tracker.update(&frame(2, 66, vec![obs(Handedness::Right, 0.9, 0.7)]));
        tracker.update(&frame(3, 99, vec![obs(Handedness::Unknown, 0.2, 0.7)]));

        assert_eq!(tracker.track(Hand::Right).unwrap().id, id);
        assert!(tracker.track(Hand::Left).is_none());
    }
}
