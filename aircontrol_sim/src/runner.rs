//! Scenario runner - drives the engine through scripted hands and checks
//! the outcome.
//!
//! Everything runs synchronously on one thread. The only entropy is the
//! runner's seed, so a scenario replays bit-for-bit.

use crate::exporter::{FrameRecord, SimExport};
use crate::scenarios::ScenarioId;
use crate::synth::{FrameSynth, GestureScript, HandScript, NoiseConfig};
use aircontrol_core::debounce::ChannelPhase;
use aircontrol_core::engine::{EngineError, EngineSignal, FrameOutput, GestureEngine};
use aircontrol_core::gesture::{ChannelKey, GestureKind, Hand, HandSet, StaticPose};
use aircontrol_core::identity::TrackId;
use aircontrol_core::profile::{Binding, Profile, ProfileKind};
use aircontrol_core::safety::ViolationKind;
use aircontrol_core::synthetic::{HandShape, SyntheticHand};
use aircontrol_core::{EngineConfig, EngineMetrics};
use aircontrol_env::{Action, ActionCommand, Handedness, LandmarkFrame, PointerButton};
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Frames fed to the engine
    pub total_frames: u64,

    /// Timestamp of the last frame
    pub final_time_ms: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Engine counters at the end of the run
    pub metrics: EngineMetrics,
}

// ============================================================================
// SESSION
// ============================================================================

/// One engine fed by one synthetic sensor.
pub struct SimSession {
    engine: GestureEngine,
    synth: FrameSynth,
    next_sequence: u64,
    outputs: Vec<FrameOutput>,
    export: Option<SimExport>,
}

impl SimSession {
    pub fn new(config: EngineConfig, profile: Profile, synth: FrameSynth) -> Result<Self, EngineError> {
        Ok(Self {
            engine: GestureEngine::new(config, profile)?,
            synth,
            next_sequence: 0,
            outputs: Vec::new(),
            export: None,
        })
    }

    /// Keeps a per-frame trace for export.
    pub fn recording(mut self, scenario: &str, seed: u64) -> Self {
        self.export = Some(SimExport::new(scenario, seed, self.synth.fps()));
        self
    }

    pub fn engine(&self) -> &GestureEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GestureEngine {
        &mut self.engine
    }

    /// Timestamp the next frame will carry.
    pub fn now_ms(&self) -> u64 {
        self.synth.timestamp_ms(self.next_sequence)
    }

    /// Every frame output so far.
    pub fn outputs(&self) -> &[FrameOutput] {
        &self.outputs
    }

    pub fn commands(&self) -> impl Iterator<Item = &ActionCommand> {
        self.outputs.iter().flat_map(|o| o.commands.iter())
    }

    pub fn signals(&self) -> impl Iterator<Item = &EngineSignal> {
        self.outputs.iter().flat_map(|o| o.signals.iter())
    }

    /// Plays `script` from the current time. Returns the index of its first
    /// output in [`SimSession::outputs`].
    pub fn play(&mut self, script: &GestureScript) -> Result<usize, EngineError> {
        let first = self.outputs.len();
        let start = self.now_ms();
        let frames = self.synth.frame_count(script.duration_ms());

        for _ in 0..frames {
            let sequence = self.next_sequence;
            let t = self.synth.timestamp_ms(sequence) - start;
            let frame = self.synth.frame(script, sequence, t);
            self.step(&frame)?;
        }
        Ok(first)
    }

    /// Feeds one frame as-is.
    pub fn step(&mut self, frame: &LandmarkFrame) -> Result<&FrameOutput, EngineError> {
        let output = self.engine.process_frame(frame)?;
        if let Some(export) = self.export.as_mut() {
            export.add_frame(FrameRecord::new(&output, self.engine.tracker()));
        }
        self.next_sequence = frame.sequence + 1;
        self.outputs.push(output);
        Ok(&self.outputs[self.outputs.len() - 1])
    }

    /// Switches profile between frames; the signal lands on the next frame's
    /// trace record.
    pub fn switch_profile(&mut self, profile: Profile) -> Result<(), EngineError> {
        let signal = self.engine.switch_profile(profile)?;
        self.record_signal(signal);
        Ok(())
    }

    pub fn reset_emergency_stop(&mut self) {
        let signal = self.engine.reset_emergency_stop();
        self.record_signal(signal);
    }

    fn record_signal(&mut self, signal: EngineSignal) {
        if let Some(last) = self.outputs.last_mut() {
            last.signals.push(signal.clone());
        }
        if let Some(frame) = self.export.as_mut().and_then(|e| e.frames.last_mut()) {
            frame.signals.push(signal);
        }
    }

    pub fn into_export(self) -> Option<SimExport> {
        self.export
    }
}

// ============================================================================
// RUNNER
// ============================================================================

type Check = Result<(), String>;

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(reason())
    }
}

fn right(shape: HandShape, x: f64, y: f64) -> HandScript {
    HandScript::new(Handedness::Right, SyntheticHand::new(shape).at(x, y))
}

fn left(shape: HandShape, x: f64, y: f64) -> HandScript {
    HandScript::new(Handedness::Left, SyntheticHand::new(shape).at(x, y))
}

fn is_click(command: &ActionCommand) -> bool {
    matches!(command.action, Action::PointerClick { .. })
}

/// Right pinch → left click, nothing else.
pub fn pinch_click_profile() -> Profile {
    Profile::new("pinch_click", ProfileKind::Game).with_binding(Binding::new(
        StaticPose::Pinch,
        HandSet::Right,
        Action::PointerClick {
            button: PointerButton::Left,
        },
    ))
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Frame rate in Hz
    fps: u32,

    /// Base sensor noise (scenarios may add more)
    noise: NoiseConfig,

    config: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            fps: 30,
            noise: NoiseConfig::default(),
            config: EngineConfig::default(),
        }
    }

    /// Sets the frame rate.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn frame_ms(&self) -> u64 {
        1000 / self.fps as u64
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario keeping the full per-frame trace.
    pub fn run_recorded(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, true);
        let mut export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed, self.fps));
        export.finalize(result.passed, result.failure_reason.clone(), result.metrics);
        (result, export)
    }

    fn session(&self, profile: Profile, noise: NoiseConfig) -> Result<SimSession, String> {
        let synth = FrameSynth::new(self.seed, self.fps, noise);
        SimSession::new(self.config, profile, synth).map_err(|e| e.to_string())
    }

    fn execute(&self, scenario: ScenarioId, record: bool) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let profile = match scenario {
            ScenarioId::PinchHold => pinch_click_profile(),
            ScenarioId::SwipeRight => Profile::browser_youtube(),
            ScenarioId::EmergencyStop => Profile::machine(),
            ScenarioId::SafeZoneViolation => Profile::machine().with_binding(Binding::new(
                StaticPose::TwoUp,
                HandSet::Right,
                Action::Scroll { amount: 600 },
            )),
            _ => Profile::game(),
        };
        let noise = match scenario {
            ScenarioId::LabelFlicker => self.noise.with_flicker(0.3),
            ScenarioId::NanStorm => self.noise.with_nan(0.2),
            _ => self.noise,
        };

        let outcome = self.session(profile, noise).map(|s| {
            if record {
                s.recording(scenario.name(), self.seed)
            } else {
                s
            }
        });
        let (check, session) = match outcome {
            Ok(mut session) => {
                let check = match scenario {
                    ScenarioId::PinchHold => self.run_pinch_hold(&mut session),
                    ScenarioId::SwipeRight => self.run_swipe_right(&mut session),
                    ScenarioId::Reacquire => self.run_reacquire(&mut session),
                    ScenarioId::ProfileSwitch => self.run_profile_switch(&mut session),
                    ScenarioId::EmergencyStop => self.run_emergency_stop(&mut session),
                    ScenarioId::SafeZoneViolation => self.run_safe_zone(&mut session),
                    ScenarioId::LabelFlicker => self.run_label_flicker(&mut session),
                    ScenarioId::NanStorm => self.run_nan_storm(&mut session),
                };
                (check, Some(session))
            }
            Err(e) => (Err(e), None),
        };

        let metrics = session.as_ref().map(|s| *s.engine().metrics()).unwrap_or_default();
        let total_frames = session.as_ref().map_or(0, |s| s.outputs().len() as u64);
        let final_time_ms = session
            .as_ref()
            .and_then(|s| s.outputs().last())
            .map_or(0, |o| o.timestamp_ms);
        debug!("{}: {} frames, {:?}", scenario.name(), total_frames, metrics);

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: check.is_ok(),
            total_frames,
            final_time_ms,
            failure_reason: check.err(),
            metrics,
        };
        (result, session.and_then(SimSession::into_export))
    }

    /// SIM-001: 10 frames of right pinch.
    ///
    /// **Assertion**: one click within two frames after the 150 ms hold, and
    /// the channel sits in cooldown afterwards.
    fn run_pinch_hold(&self, session: &mut SimSession) -> Check {
        let hold_ms = self.config.debounce.static_pose.min_hold_ms;
        let duration = 10 * 1000 / self.fps as u64;
        let script = GestureScript::new().with_hand(right(HandShape::Pinch, 0.6, 0.7).hold(HandShape::Pinch, duration));
        session.play(&script).map_err(|e| e.to_string())?;

        let clicks: Vec<_> = session.commands().filter(|c| is_click(c)).collect();
        ensure(clicks.len() == 1, || format!("expected 1 click, got {}", clicks.len()))?;
        let at = clicks[0].timestamp_ms;
        ensure(at >= hold_ms && at <= hold_ms + 2 * self.frame_ms(), || {
            format!("click at {} ms, expected just after {} ms", at, hold_ms)
        })?;

        let key = ChannelKey::new(GestureKind::Static(StaticPose::Pinch), HandSet::Right);
        let bank = session.engine().bank();
        let phase = bank.index_of(&key).and_then(|i| bank.channel(i)).map(|c| c.phase());
        ensure(phase == Some(ChannelPhase::Cooldown), || format!("pinch channel in {:?}", phase))
    }

    /// SIM-002: swipe right in the browser profile.
    fn run_swipe_right(&self, session: &mut SimSession) -> Check {
        let script = GestureScript::new().with_hand(
            right(HandShape::Relaxed, 0.15, 0.6)
                .hold(HandShape::Relaxed, 100)
                .move_to(HandShape::Relaxed, 0.9, 0.6, 400)
                .hold(HandShape::Relaxed, 300),
        );
        session.play(&script).map_err(|e| e.to_string())?;

        let hotkey = |key: &str| Action::Hotkey {
            keys: vec!["alt".to_string(), key.to_string()],
        };
        let forward = session.commands().filter(|c| c.action == hotkey("right")).count();
        let back = session.commands().filter(|c| c.action == hotkey("left")).count();
        ensure(forward == 1, || format!("expected 1 browser forward, got {}", forward))?;
        ensure(back == 0, || format!("unexpected browser back x{}", back))
    }

    /// SIM-003: right hand absent for 400 ms.
    fn run_reacquire(&self, session: &mut SimSession) -> Check {
        let script = GestureScript::new().with_hand(
            right(HandShape::OpenPalm, 0.6, 0.6)
                .hold(HandShape::OpenPalm, 300)
                .absent(400)
                .hold(HandShape::OpenPalm, 300),
        );
        session.play(&script).map_err(|e| e.to_string())?;

        let lifecycle: Vec<(bool, TrackId)> = session
            .signals()
            .filter_map(|s| match *s {
                EngineSignal::TrackAcquired { hand: Hand::Right, id, .. } => Some((true, id)),
                EngineSignal::TrackLost { hand: Hand::Right, id, .. } => Some((false, id)),
                _ => None,
            })
            .collect();

        match lifecycle[..] {
            [(true, first), (false, lost), (true, second)] if first == lost && second != first => Ok(()),
            _ => Err(format!("unexpected lifecycle {:?}", lifecycle)),
        }
    }

    /// SIM-004: switch to `design` 100 ms into a pinch.
    ///
    /// **Assertion**: the only click lands a full hold after the switch.
    fn run_profile_switch(&self, session: &mut SimSession) -> Check {
        let before = GestureScript::new().with_hand(right(HandShape::Pinch, 0.6, 0.7).hold(HandShape::Pinch, 100));
        session.play(&before).map_err(|e| e.to_string())?;

        let switched_at = session.now_ms();
        session.switch_profile(Profile::design()).map_err(|e| e.to_string())?;

        let after = GestureScript::new().with_hand(right(HandShape::Pinch, 0.6, 0.7).hold(HandShape::Pinch, 400));
        session.play(&after).map_err(|e| e.to_string())?;

        let hold_ms = self.config.debounce.static_pose.min_hold_ms;
        let clicks: Vec<u64> = session.commands().filter(|c| is_click(c)).map(|c| c.timestamp_ms).collect();
        ensure(clicks.len() == 1, || format!("expected 1 click, got {:?}", clicks))?;
        ensure(clicks[0] >= switched_at + hold_ms, || {
            format!("click at {} ms leaked across the switch at {} ms", clicks[0], switched_at)
        })?;
        ensure(session.engine().metrics().profile_switches == 1, || "switch not counted".to_string())
    }

    /// SIM-005: fist in the machine profile, then reset.
    fn run_emergency_stop(&self, session: &mut SimSession) -> Check {
        let fist = GestureScript::new().with_hand(right(HandShape::Fist, 0.5, 0.6).hold(HandShape::Fist, 300));
        session.play(&fist).map_err(|e| e.to_string())?;

        ensure(session.engine().latch().is_latched(), || "latch not set".to_string())?;
        let latched_from = session
            .outputs()
            .iter()
            .position(|o| o.stopped)
            .ok_or_else(|| "no stopped frame".to_string())?;
        for output in &session.outputs()[latched_from..] {
            let stop_only = output.commands.len() == 1 && output.commands[0].is_stop();
            ensure(stop_only, || format!("frame {} output {:?} under latch", output.sequence, output.commands))?;
        }

        session.reset_emergency_stop();
        let open = GestureScript::new().with_hand(right(HandShape::OpenPalm, 0.5, 0.6).hold(HandShape::OpenPalm, 300));
        let first = session.play(&open).map_err(|e| e.to_string())?;
        let stops_after = session.outputs()[first..]
            .iter()
            .flat_map(|o| o.commands.iter())
            .filter(|c| c.is_stop())
            .count();
        ensure(stops_after == 0, || format!("{} stop(s) after reset", stops_after))?;
        ensure(session.engine().metrics().emergency_stops == 1, || {
            format!("{} emergency stops counted", session.engine().metrics().emergency_stops)
        })
    }

    /// SIM-006: scroll of 600 against a 240 safe zone.
    fn run_safe_zone(&self, session: &mut SimSession) -> Check {
        let script = GestureScript::new().with_hand(right(HandShape::TwoUp, 0.6, 0.6).hold(HandShape::TwoUp, 400));
        session.play(&script).map_err(|e| e.to_string())?;

        let scrolls = session
            .commands()
            .filter(|c| matches!(c.action, Action::Scroll { .. }))
            .count();
        ensure(scrolls == 0, || format!("{} scroll(s) escaped the safe zone", scrolls))?;

        let violations: Vec<_> = session
            .signals()
            .filter_map(|s| match s {
                EngineSignal::Violation { violation } => Some(violation.kind),
                _ => None,
            })
            .collect();
        ensure(
            matches!(violations[..], [ViolationKind::ScrollTooLarge { amount: 600 }]),
            || format!("unexpected violations {:?}", violations),
        )
    }

    /// SIM-007: two hands, 30% label flicker each.
    fn run_label_flicker(&self, session: &mut SimSession) -> Check {
        let script = GestureScript::new()
            .with_hand(left(HandShape::OpenPalm, 0.3, 0.6).move_to(HandShape::OpenPalm, 0.25, 0.55, 2000))
            .with_hand(right(HandShape::OpenPalm, 0.7, 0.6).move_to(HandShape::OpenPalm, 0.75, 0.55, 2000));
        session.play(&script).map_err(|e| e.to_string())?;

        let metrics = *session.engine().metrics();
        ensure(metrics.tracks_acquired == 2 && metrics.tracks_lost == 0, || {
            format!(
                "identity churn: {} acquired, {} lost",
                metrics.tracks_acquired, metrics.tracks_lost
            )
        })?;

        let tracker = session.engine().tracker();
        let x = |hand: Hand| tracker.track(hand).map(|t| t.landmarks[0].x);
        ensure(x(Hand::Left).is_some_and(|x| x < 0.5), || "left identity drifted".to_string())?;
        ensure(x(Hand::Right).is_some_and(|x| x > 0.5), || "right identity drifted".to_string())
    }

    /// SIM-008: 20% NaN observations with pointer follow on.
    fn run_nan_storm(&self, session: &mut SimSession) -> Check {
        let script = GestureScript::new()
            .with_hand(right(HandShape::Point, 0.3, 0.6).move_to(HandShape::Point, 0.7, 0.5, 1000))
            .with_hand(left(HandShape::Pinch, 0.2, 0.7).hold(HandShape::Pinch, 1000));
        session.play(&script).map_err(|e| e.to_string())?;

        ensure(session.engine().metrics().observations_rejected > 0, || "no observation rejected".to_string())?;
        for command in session.commands() {
            let finite = command.intensity.is_finite()
                && match command.action {
                    Action::PointerMove { x, y } => x.is_finite() && y.is_finite(),
                    _ => true,
                };
            ensure(finite, || format!("non-finite command {:?}", command))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_pass_clean() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[test]
    fn test_scenarios_pass_with_jitter() {
        let runner = ScenarioRunner::new(7).with_noise(NoiseConfig::default().with_jitter(0.001));
        for scenario in [ScenarioId::PinchHold, ScenarioId::Reacquire, ScenarioId::EmergencyStop] {
            let result = runner.run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[test]
    fn test_recorded_run_matches_outputs() {
        let (result, export) = ScenarioRunner::new(42).run_recorded(ScenarioId::PinchHold);
        assert!(export.passed);
        assert_eq!(export.frames.len() as u64, result.total_frames);
        assert_eq!(export.commands().filter(|c| is_click(c)).count(), 1);
    }

    #[test]
    fn test_switch_signal_recorded() {
        let (_, export) = ScenarioRunner::new(1).run_recorded(ScenarioId::ProfileSwitch);
        let switched = export
            .frames
            .iter()
            .flat_map(|f| f.signals.iter())
            .any(|s| matches!(s, EngineSignal::ProfileSwitched { name, .. } if name == "design"));
        assert!(switched);
    }
}
