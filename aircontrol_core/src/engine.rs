//! Gesture Engine - the per-frame pipeline.
//!
//! Owns every piece of per-frame state and runs the stages strictly in order.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        GestureEngine                          │
//! │                                                               │
//! │  LandmarkFrame                                                │
//! │      │                                                        │
//! │      ▼                                                        │
//! │  ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌──────────┐     │
//! │  │ IDENTITY │──▶│  MOTION  │──▶│ STATIC  │──▶│ BI-MANUAL│     │
//! │  │ tracker  │   │ (per     │   │ DYNAMIC │   │ combiner │     │
//! │  └──────────┘   │  track)  │   └─────────┘   └────┬─────┘     │
//! │                 └──────────┘                      ▼           │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────────────────┐       │
//! │  │  SAFETY  │◀──│  MAPPER  │◀──│ DEBOUNCE channel bank│       │
//! │  │   gate   │   │(profile) │   └──────────────────────┘       │
//! │  └────┬─────┘   └──────────┘                                  │
//! │       ▼                                                       │
//! │  ActionCommand*                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is synchronous and single-owner. Cross-thread control goes
//! through the [`SafetyLatch`] and the halt flag, both atomics.

use crate::combiner::BimanualCombiner;
use crate::config::{ConfigError, EngineConfig};
use crate::debounce::ChannelBank;
use crate::dynamic::DynamicDetector;
use crate::gesture::{GestureCandidate, GestureEvent, GestureFeatures, GestureKind, Hand, HandSet};
use crate::identity::{IdentityTracker, TrackEvent, TrackId};
use crate::mapper::ActionMapper;
use crate::metrics::EngineMetrics;
use crate::motion::MotionState;
use crate::profile::{Profile, ProfileError, ProfileKind};
use crate::safety::{SafetyGate, SafetyLatch, SafetyViolation};
use crate::static_pose::StaticClassifier;
use aircontrol_env::{ActionCommand, LandmarkFrame};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Frame {sequence} at {timestamp_ms} ms is older than the last frame ({last_ms} ms)")]
    NonMonotonicTimestamp {
        sequence: u64,
        timestamp_ms: u64,
        last_ms: u64,
    },

    #[error("Engine halted")]
    Halted,

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// What set the emergency latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSource {
    Gesture,
    External,
}

/// Observer notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineSignal {
    TrackAcquired { hand: Hand, id: TrackId, timestamp_ms: u64 },
    TrackLost { hand: Hand, id: TrackId, timestamp_ms: u64 },
    Motion { hand: Hand, state: MotionState },
    Gesture { event: GestureEvent },
    Violation { violation: SafetyViolation },
    ConfirmationExpired { command: ActionCommand },
    EmergencyStop { source: StopSource, timestamp_ms: u64 },
    EmergencyReset,
    ProfileSwitched { name: String, kind: ProfileKind },
    ObservationRejected { sequence: u64, count: usize },
}

/// Everything one frame produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    pub sequence: u64,
    pub timestamp_ms: u64,

    /// Commands cleared for dispatch, in order
    pub commands: Vec<ActionCommand>,

    /// Confirmed gesture events (bound or not)
    pub events: Vec<GestureEvent>,

    pub signals: Vec<EngineSignal>,

    /// The frame ran under the emergency latch
    pub stopped: bool,
}

/// The two-hand gesture engine.
pub struct GestureEngine {
    config: EngineConfig,
    tracker: IdentityTracker,
    statics: StaticClassifier,
    dynamics: DynamicDetector,
    combiner: BimanualCombiner,
    bank: ChannelBank,
    mapper: ActionMapper,
    gate: SafetyGate,
    metrics: EngineMetrics,
    last_timestamp_ms: Option<u64>,
    halted: Arc<AtomicBool>,
    /// Latch state seen by the previous frame
    latch_seen: bool,
}

impl GestureEngine {
    /// Validates `config` and `profile` and builds an engine with its own latch.
    pub fn new(config: EngineConfig, profile: Profile) -> Result<Self, EngineError> {
        Self::with_latch(config, profile, SafetyLatch::new())
    }

    /// Like [`GestureEngine::new`], sharing an existing emergency latch.
    pub fn with_latch(config: EngineConfig, profile: Profile, latch: SafetyLatch) -> Result<Self, EngineError> {
        config.validate()?;
        profile.validate()?;
        Ok(Self::build(config, profile, latch))
    }

    /// Default configuration with the `game` profile.
    pub fn with_defaults() -> Self {
        Self::build(EngineConfig::default(), Profile::default(), SafetyLatch::new())
    }

    fn build(config: EngineConfig, profile: Profile, latch: SafetyLatch) -> Self {
        let (bank, mapper, combiner) = Self::install(&config, profile.clone());
        let gate = SafetyGate::new(latch, profile.safety);
        info!("Gesture engine ready with profile '{}' ({})", profile.name, profile.kind.as_str());

        Self {
            config,
            tracker: IdentityTracker::new(config.tracking, config.motion),
            statics: StaticClassifier::new(config.statics),
            dynamics: DynamicDetector::new(config.dynamics),
            combiner,
            bank,
            mapper,
            gate,
            metrics: EngineMetrics::default(),
            last_timestamp_ms: None,
            halted: Arc::new(AtomicBool::new(false)),
            latch_seen: false,
        }
    }

    /// Fresh channel bank, mapper and combiner for a profile.
    fn install(config: &EngineConfig, profile: Profile) -> (ChannelBank, ActionMapper, BimanualCombiner) {
        let definitions = profile.bimanual_definitions();
        let mut bank = ChannelBank::new(&config.debounce, &definitions);
        let mapper = ActionMapper::new(profile, &bank);
        mapper.configure_bank(&mut bank, &config.debounce);
        (bank, mapper, BimanualCombiner::new(definitions))
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profile(&self) -> &Profile {
        self.mapper.profile()
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn bank(&self) -> &ChannelBank {
        &self.bank
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Counts frames lost before they reached the engine.
    pub fn record_dropped_frames(&mut self, count: u64) {
        self.metrics.frames_dropped += count;
    }

    pub fn latch(&self) -> SafetyLatch {
        self.gate.latch().clone()
    }

    pub fn violation_count(&self) -> u64 {
        self.gate.violation_count()
    }

    // ========================================================================
    // CONTROL
    // ========================================================================

    /// Atomically replaces the active profile.
    ///
    /// Channels, motion windows, the pointer filter and pending confirmations
    /// all start empty. On error the previous profile stays active and
    /// nothing is reset.
    pub fn switch_profile(&mut self, profile: Profile) -> Result<EngineSignal, EngineError> {
        profile.validate()?;

        let (bank, mapper, combiner) = Self::install(&self.config, profile.clone());
        self.bank = bank;
        self.mapper = mapper;
        self.combiner = combiner;
        for hand in Hand::ALL {
            self.dynamics.reset(hand);
        }
        self.gate.reconfigure(profile.safety);
        self.metrics.profile_switches += 1;

        info!("Switched to profile '{}' ({})", profile.name, profile.kind.as_str());
        Ok(EngineSignal::ProfileSwitched {
            name: profile.name,
            kind: profile.kind,
        })
    }

    /// Sets the emergency latch; the next frame outputs only the stop command.
    pub fn assert_emergency_stop(&self) {
        self.gate.latch().assert();
    }

    /// Operator reset of the emergency latch.
    pub fn reset_emergency_stop(&mut self) -> EngineSignal {
        self.gate.latch().reset();
        self.latch_seen = false;
        EngineSignal::EmergencyReset
    }

    /// Stops all further dispatch. Takes effect immediately from any thread
    /// holding [`GestureEngine::halt_handle`].
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            warn!("Gesture engine halted");
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halted)
    }

    // ========================================================================
    // FRAME PIPELINE
    // ========================================================================

    /// Runs one frame through every stage.
    ///
    /// A frame older than the previous one is rejected and leaves all state
    /// untouched.
    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> Result<FrameOutput, EngineError> {
        if self.is_halted() {
            self.metrics.frames_rejected += 1;
            return Err(EngineError::Halted);
        }
        let now = frame.timestamp_ms;
        if let Some(last_ms) = self.last_timestamp_ms {
            if now < last_ms {
                self.metrics.frames_rejected += 1;
                warn!("Rejected frame {}: timestamp {} ms < {} ms", frame.sequence, now, last_ms);
                return Err(EngineError::NonMonotonicTimestamp {
                    sequence: frame.sequence,
                    timestamp_ms: now,
                    last_ms,
                });
            }
        }
        self.last_timestamp_ms = Some(now);

        let mut out = FrameOutput {
            sequence: frame.sequence,
            timestamp_ms: now,
            ..Default::default()
        };

        // 1. Identity (+ motion, owned by each track)
        let update = self.tracker.update(frame);
        if update.rejected > 0 {
            self.metrics.observations_rejected += update.rejected as u64;
            out.signals.push(EngineSignal::ObservationRejected {
                sequence: frame.sequence,
                count: update.rejected,
            });
        }
        for event in &update.events {
            match *event {
                TrackEvent::Lost { hand, id } => {
                    self.dynamics.reset(hand);
                    self.metrics.tracks_lost += 1;
                    out.signals.push(EngineSignal::TrackLost { hand, id, timestamp_ms: now });
                }
                TrackEvent::Acquired { hand, id } => {
                    self.metrics.tracks_acquired += 1;
                    out.signals.push(EngineSignal::TrackAcquired { hand, id, timestamp_ms: now });
                }
            }
        }

        // 2-4. Per-hand candidates
        let mut candidates = self.collect_candidates(&mut out);

        // 5. Two-hand combinations
        self.combiner.combine(&mut candidates);

        // 6. Debounce
        let events = self.bank.step(now, frame.sequence, &candidates);
        self.metrics.gesture_events += events.len() as u64;

        // 7. Mapping
        let mut mapped = self.mapper.map_events(&events);
        self.metrics.unbound_events += mapped.unbound as u64;
        self.metrics.commands_suppressed += mapped.suppressed as u64;
        if let Some(pointer) = self.mapper.pointer_command(frame.sequence, now, &self.tracker) {
            mapped.commands.push(pointer);
        }

        // 8. Safety
        let confirmed: Vec<_> = events.iter().map(|(_, e)| e.key()).collect();
        let gate = self
            .gate
            .process(now, frame.sequence, mapped.emergency, &confirmed, mapped.commands);

        if gate.stopped && !self.latch_seen {
            let source = if gate.latched_now {
                StopSource::Gesture
            } else {
                StopSource::External
            };
            self.metrics.emergency_stops += 1;
            out.signals.push(EngineSignal::EmergencyStop {
                source,
                timestamp_ms: now,
            });
        }
        self.latch_seen = gate.stopped;
        out.stopped = gate.stopped;

        for (_, event) in &events {
            out.signals.push(EngineSignal::Gesture { event: *event });
            out.events.push(*event);
        }
        self.metrics.safety_violations += gate.violations.len() as u64;
        for violation in gate.violations {
            out.signals.push(EngineSignal::Violation { violation });
        }
        self.metrics.confirmations_expired += gate.expired.len() as u64;
        for command in gate.expired {
            out.signals.push(EngineSignal::ConfirmationExpired { command });
        }

        // A halt raised mid-frame still wins
        if !self.is_halted() {
            out.commands = gate.commands;
        }
        self.metrics.commands_emitted += out.commands.len() as u64;
        self.metrics.frames_processed += 1;

        if !out.commands.is_empty() {
            debug!("Frame {}: {} command(s)", frame.sequence, out.commands.len());
        }
        Ok(out)
    }

    /// Best static pose and best motion of each visible hand.
    fn collect_candidates(&mut self, out: &mut FrameOutput) -> Vec<GestureCandidate> {
        let mut candidates = Vec::with_capacity(4);

        for hand in Hand::ALL {
            let Some(track) = self.tracker.track(hand) else {
                continue;
            };
            if !track.is_visible() {
                continue;
            }
            let Some(state) = track.latest().copied() else {
                continue;
            };
            if self.config.runtime.emit_motion_signals {
                out.signals.push(EngineSignal::Motion { hand, state });
            }

            let hands = HandSet::from(hand);
            if let Some(pose) = self.statics.best(&track.landmarks) {
                let features = GestureFeatures {
                    speed: state.speed(),
                    depth: state.depth,
                    direction: [0.0; 3],
                };
                candidates.push(GestureCandidate::new(
                    GestureKind::Static(pose.pose),
                    hands,
                    pose.confidence,
                    features,
                ));
            }

            let id = track.id;
            if let Some(motion) = self.dynamics.observe(hand, id, state) {
                candidates.push(GestureCandidate::new(
                    GestureKind::Dynamic(motion.kind),
                    hands,
                    motion.confidence,
                    motion.features,
                ));
            }
        }
        candidates
    }
}
