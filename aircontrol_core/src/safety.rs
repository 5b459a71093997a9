//! The "SAFETY" Engine - last word on every outgoing command
//!
//! Runs after the action mapper and may override it at any time:
//! 1. A set emergency latch reduces the frame's output to one stop command
//! 2. An emergency-stop gesture (or external assert) sets the latch
//! 3. Buffered commands whose confirmation window passed are dropped
//! 4. Buffered commands whose confirming gesture fired are released
//! 5. Everything else is bounds-checked, then rate-limited
//!
//! Steps 3-5 only run when the profile carries a safety section; the latch
//! is honored by every profile.

use crate::gesture::ChannelKey;
use crate::mapper::MappedCommand;
use crate::profile::SafetyConfig;
use aircontrol_env::{Action, ActionCommand};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// EMERGENCY LATCH
// ============================================================================

/// Emergency-stop latch shared across threads.
///
/// Once asserted it stays set until [`SafetyLatch::reset`] is called by an
/// operator; gesture logic can set it but never clear it.
#[derive(Debug, Clone, Default)]
pub struct SafetyLatch {
    flag: Arc<AtomicBool>,
}

impl SafetyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            warn!("EMERGENCY STOP latched");
        }
    }

    pub fn reset(&self) {
        if self.flag.swap(false, Ordering::SeqCst) {
            info!("Emergency stop latch reset");
        }
    }

    pub fn is_latched(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// LIMITS
// ============================================================================

/// Bounds every command must respect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeZone {
    /// Largest allowed intensity (default: 1.0)
    pub max_intensity: f64,

    /// Allowed pointer region, normalized screen units (default: [0.05, 0.05])
    pub pointer_min: [f64; 2],

    /// (default: [0.95, 0.95])
    pub pointer_max: [f64; 2],

    /// Largest allowed |scroll amount| (default: 240)
    pub max_scroll: i32,
}

impl Default for SafeZone {
    fn default() -> Self {
        Self {
            max_intensity: 1.0,
            pointer_min: [0.05, 0.05],
            pointer_max: [0.95, 0.95],
            max_scroll: 240,
        }
    }
}

impl SafeZone {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_intensity.is_finite() && self.max_intensity >= 0.0) {
            return Err(format!("max_intensity {}", self.max_intensity));
        }
        if self.pointer_max[0] <= self.pointer_min[0] || self.pointer_max[1] <= self.pointer_min[1] {
            return Err("empty pointer region".to_string());
        }
        if self.max_scroll < 0 {
            return Err(format!("max_scroll {}", self.max_scroll));
        }
        Ok(())
    }

    /// Checks one command against the bounds.
    pub fn check(&self, command: &ActionCommand) -> Result<(), ViolationKind> {
        if !command.intensity.is_finite() || command.intensity.abs() > self.max_intensity {
            return Err(ViolationKind::IntensityOutOfBounds {
                intensity: command.intensity,
            });
        }
        match command.action {
            Action::PointerMove { x, y } => {
                let inside = x >= self.pointer_min[0]
                    && x <= self.pointer_max[0]
                    && y >= self.pointer_min[1]
                    && y <= self.pointer_max[1];
                if !inside {
                    return Err(ViolationKind::PointerOutOfBounds { x, y });
                }
            }
            Action::Scroll { amount } if amount.saturating_abs() > self.max_scroll => {
                return Err(ViolationKind::ScrollTooLarge { amount });
            }
            _ => {}
        }
        Ok(())
    }
}

/// Sliding-window rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Commands allowed per window (default: 4)
    pub max_commands: usize,

    /// Window length (default: 1000 ms)
    pub interval_ms: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_commands: 4,
            interval_ms: 1000,
        }
    }
}

impl RateLimit {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_commands == 0 || self.interval_ms == 0 {
            return Err(format!(
                "rate limit {} per {} ms",
                self.max_commands, self.interval_ms
            ));
        }
        Ok(())
    }
}

// ============================================================================
// VIOLATIONS
// ============================================================================

/// Why a command was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationKind {
    IntensityOutOfBounds { intensity: f64 },
    PointerOutOfBounds { x: f64, y: f64 },
    ScrollTooLarge { amount: i32 },
    RateLimited,
}

/// A suppressed command and the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyViolation {
    pub kind: ViolationKind,
    pub command: ActionCommand,
}

/// A command waiting for its confirming gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub command: ActionCommand,
    pub confirm: ChannelKey,
    pub deadline_ms: u64,
}

/// Result of one gate pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutput {
    /// Commands cleared for dispatch, in order
    pub commands: Vec<ActionCommand>,

    pub violations: Vec<SafetyViolation>,

    /// Buffered commands whose confirmation never came
    pub expired: Vec<ActionCommand>,

    /// True if the latch was set during this pass
    pub latched_now: bool,

    /// True if the frame ran under the latch
    pub stopped: bool,
}

// ============================================================================
// GATE
// ============================================================================

/// Per-profile safety state.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    latch: SafetyLatch,
    config: Option<SafetyConfig>,
    violation_count: u64,
    /// Dispatch times inside the current rate window
    window: VecDeque<u64>,
    pending: Vec<PendingCommand>,
}

impl SafetyGate {
    pub fn new(latch: SafetyLatch, config: Option<SafetyConfig>) -> Self {
        Self {
            latch,
            config,
            violation_count: 0,
            window: VecDeque::new(),
            pending: Vec::new(),
        }
    }

    pub fn latch(&self) -> &SafetyLatch {
        &self.latch
    }

    pub fn violation_count(&self) -> u64 {
        self.violation_count
    }

    pub fn pending(&self) -> &[PendingCommand] {
        &self.pending
    }

    pub fn config(&self) -> Option<&SafetyConfig> {
        self.config.as_ref()
    }

    /// Installs a new profile's safety section, dropping buffers.
    pub fn reconfigure(&mut self, config: Option<SafetyConfig>) {
        self.config = config;
        self.window.clear();
        self.pending.clear();
    }

    /// Runs one frame through the gate.
    ///
    /// `emergency` is true if an emergency-stop binding confirmed this frame;
    /// `confirmed` lists every channel that confirmed this frame.
    pub fn process(
        &mut self,
        now: u64,
        sequence: u64,
        emergency: bool,
        confirmed: &[ChannelKey],
        mapped: Vec<MappedCommand>,
    ) -> GateOutput {
        let mut out = GateOutput::default();

        // 1-2. Latch first, nothing else can starve it
        if emergency && !self.latch.is_latched() {
            self.latch.assert();
            out.latched_now = true;
        }
        if self.latch.is_latched() {
            self.pending.clear();
            out.stopped = true;
            out.commands.push(ActionCommand::stop(sequence, now));
            return out;
        }

        let Some(config) = self.config else {
            out.commands = mapped.into_iter().map(|m| m.command).collect();
            return out;
        };

        // 3. Expire
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| now > p.deadline_ms);
        for p in &expired {
            warn!("Confirmation window expired for {:?} (waiting for {})", p.command.action, p.confirm);
        }
        out.expired = expired.into_iter().map(|p| p.command).collect();

        // 4. Release
        let mut ready = Vec::new();
        for p in waiting {
            if confirmed.contains(&p.confirm) {
                info!("Confirmed by {}: releasing {:?}", p.confirm, p.command.action);
                ready.push(p.command);
            } else {
                self.pending.push(p);
            }
        }

        for m in mapped {
            match m.confirmation {
                Some((confirm, window_ms)) => self.pending.push(PendingCommand {
                    command: m.command,
                    confirm,
                    deadline_ms: now.saturating_add(window_ms),
                }),
                None => ready.push(m.command),
            }
        }

        // 5. Bounds, then rate
        let interval = config.rate_limit.interval_ms;
        while self.window.front().is_some_and(|&t| t.saturating_add(interval) <= now) {
            self.window.pop_front();
        }
        for command in ready {
            let verdict = config.safe_zone.check(&command).and_then(|_| {
                if self.window.len() >= config.rate_limit.max_commands {
                    Err(ViolationKind::RateLimited)
                } else {
                    Ok(())
                }
            });
            match verdict {
                Ok(()) => {
                    self.window.push_back(now);
                    out.commands.push(command);
                }
                Err(kind) => {
                    self.violation_count += 1;
                    warn!("Safety violation #{}: {:?} on {:?}", self.violation_count, kind, command.action);
                    out.violations.push(SafetyViolation { kind, command });
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{GestureKind, HandSet, StaticPose};

    fn mapped(action: Action, intensity: f64) -> MappedCommand {
        MappedCommand {
            command: ActionCommand::new(1, 0, action, intensity),
            priority: 0,
            confirmation: None,
        }
    }

    fn key() -> ChannelKey {
        ChannelKey::new(GestureKind::Static(StaticPose::Pinch), HandSet::Left)
    }

    fn machine_gate() -> SafetyGate {
        SafetyGate::new(SafetyLatch::new(), Some(SafetyConfig::default()))
    }

    #[test]
    fn test_latch_overrides_everything() {
        let mut gate = machine_gate();
        gate.latch().assert();

        let out = gate.process(0, 7, false, &[], vec![mapped(Action::Scroll { amount: 10 }, 0.5)]);
        assert_eq!(out.commands.len(), 1);
        assert!(out.commands[0].is_stop());
        assert_eq!(out.commands[0].sequence, 7);
        assert!(out.stopped);
    }

    #[test]
    fn test_emergency_gesture_latches_same_frame() {
        let mut gate = SafetyGate::new(SafetyLatch::new(), None);
        let out = gate.process(0, 1, true, &[], vec![mapped(Action::Scroll { amount: 10 }, 0.5)]);

        assert!(out.latched_now);
        assert_eq!(out.commands, vec![ActionCommand::stop(1, 0)]);
        assert!(gate.latch().is_latched());

        // Only an explicit reset clears it
        let out = gate.process(33, 2, false, &[], vec![]);
        assert!(out.commands[0].is_stop());
        gate.latch().reset();
        let out = gate.process(66, 3, false, &[], vec![]);
        assert!(out.commands.is_empty());
    }

    #[test]
    fn test_out_of_bounds_suppressed() {
        let mut gate = machine_gate();
        let out = gate.process(
            0,
            1,
            false,
            &[],
            vec![
                mapped(Action::KeyPress { key: "x".into() }, 1.5),
                mapped(Action::PointerMove { x: 0.99, y: 0.5 }, 1.0),
                mapped(Action::Scroll { amount: 500 }, 1.0),
                mapped(Action::Scroll { amount: 120 }, 1.0),
            ],
        );

        assert_eq!(out.commands.len(), 1);
        assert_eq!(out.violations.len(), 3);
        assert_eq!(gate.violation_count(), 3);
    }

    #[test]
    fn test_rate_limit_sliding_window() {
        let mut gate = machine_gate();
        let mut dispatched = 0;
        let mut limited = 0;
        for i in 0..10u64 {
            let out = gate.process(i * 100, i, false, &[], vec![mapped(Action::KeyPress { key: "a".into() }, 0.5)]);
            dispatched += out.commands.len();
            limited += out.violations.len();
        }
        // 4 per second over a second of frames
        assert_eq!(dispatched, 4);
        assert_eq!(limited, 6);

        // Window slides: a second later the budget is back
        let out = gate.process(1500, 11, false, &[], vec![mapped(Action::KeyPress { key: "a".into() }, 0.5)]);
        assert_eq!(out.commands.len(), 1);
    }

    #[test]
    fn test_confirmation_release_and_expiry() {
        let mut gate = machine_gate();
        let mut cmd = mapped(Action::KeyPress { key: "go".into() }, 0.5);
        cmd.confirmation = Some((key(), 500));

        let out = gate.process(0, 1, false, &[], vec![cmd.clone()]);
        assert!(out.commands.is_empty());
        assert_eq!(gate.pending().len(), 1);

        // Confirming gesture within the window releases it
        let out = gate.process(200, 2, false, &[key()], vec![]);
        assert_eq!(out.commands.len(), 1);
        assert!(gate.pending().is_empty());

        // Without confirmation it expires and is never dispatched
        gate.process(1000, 3, false, &[], vec![cmd]);
        let out = gate.process(1600, 4, false, &[], vec![]);
        assert!(out.commands.is_empty());
        assert_eq!(out.expired.len(), 1);
        assert_eq!(gate.violation_count(), 0);
    }

    #[test]
    fn test_no_safety_section_passes_through() {
        let mut gate = SafetyGate::new(SafetyLatch::new(), None);
        let out = gate.process(0, 1, false, &[], vec![mapped(Action::Scroll { amount: 9000 }, 7.0)]);
        assert_eq!(out.commands.len(), 1);
        assert!(out.violations.is_empty());
    }
}
