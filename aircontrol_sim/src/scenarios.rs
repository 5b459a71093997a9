//! Scenario catalogue.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// SIM-001: Right pinch held for 10 frames fires exactly one click
    PinchHold,

    /// SIM-002: Right swipe maps to browser forward once
    SwipeRight,

    /// SIM-003: Hand leaves past the timeout and comes back as a new identity
    Reacquire,

    /// SIM-004: Profile switch mid-hold discards the in-flight candidate
    ProfileSwitch,

    /// SIM-005: Fist latches the machine profile into stop-only output
    EmergencyStop,

    /// SIM-006: Oversized scroll is suppressed by the safe zone
    SafeZoneViolation,

    /// SIM-007: Two hands with flickering labels keep their identities
    LabelFlicker,

    /// SIM-008: NaN dropouts never reach the output
    NanStorm,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::PinchHold,
            ScenarioId::SwipeRight,
            ScenarioId::Reacquire,
            ScenarioId::ProfileSwitch,
            ScenarioId::EmergencyStop,
            ScenarioId::SafeZoneViolation,
            ScenarioId::LabelFlicker,
            ScenarioId::NanStorm,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PinchHold => "pinch_hold",
            ScenarioId::SwipeRight => "swipe_right",
            ScenarioId::Reacquire => "reacquire",
            ScenarioId::ProfileSwitch => "profile_switch",
            ScenarioId::EmergencyStop => "emergency_stop",
            ScenarioId::SafeZoneViolation => "safe_zone_violation",
            ScenarioId::LabelFlicker => "label_flicker",
            ScenarioId::NanStorm => "nan_storm",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PinchHold => "10 frames of right pinch at 30 fps: one click near 150 ms, then cooldown",
            ScenarioId::SwipeRight => "Right open hand sweeps left to right: exactly one alt+right",
            ScenarioId::Reacquire => "Hand absent for 400 ms: lost, then acquired with a fresh id",
            ScenarioId::ProfileSwitch => "Switch profile 100 ms into a pinch: the hold restarts from zero",
            ScenarioId::EmergencyStop => "Machine profile fist: latch, stop-only output until reset",
            ScenarioId::SafeZoneViolation => "Machine profile scroll of 600: suppressed, one violation",
            ScenarioId::LabelFlicker => "30% label flicker on both hands: no identity changes",
            ScenarioId::NanStorm => "20% NaN observations: rejected, output stays finite",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pinch_hold" | "pinchhold" | "sim-001" => Ok(ScenarioId::PinchHold),
            "swipe_right" | "swiperight" | "sim-002" => Ok(ScenarioId::SwipeRight),
            "reacquire" | "sim-003" => Ok(ScenarioId::Reacquire),
            "profile_switch" | "profileswitch" | "sim-004" => Ok(ScenarioId::ProfileSwitch),
            "emergency_stop" | "emergencystop" | "estop" | "sim-005" => Ok(ScenarioId::EmergencyStop),
            "safe_zone_violation" | "safezone" | "sim-006" => Ok(ScenarioId::SafeZoneViolation),
            "label_flicker" | "flicker" | "sim-007" => Ok(ScenarioId::LabelFlicker),
            "nan_storm" | "nanstorm" | "sim-008" => Ok(ScenarioId::NanStorm),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
        }
        assert!("chaos".parse::<ScenarioId>().is_err());
    }
}
