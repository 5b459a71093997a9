//! Engine counters
//!
//! Plain monotonically increasing counters, snapshotted by value. The
//! runtime publishes them; the simulator exports them with each report.

use serde::{Deserialize, Serialize};

/// Lifetime counters of one engine instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Frames fully processed
    pub frames_processed: u64,

    /// Frames refused (timestamp went backwards, engine halted)
    pub frames_rejected: u64,

    /// Frames replaced in the mailbox before the engine saw them
    pub frames_dropped: u64,

    /// Observations discarded as malformed (non-finite or out of range)
    pub observations_rejected: u64,

    pub tracks_acquired: u64,
    pub tracks_lost: u64,

    /// Confirmed gesture events (bound or not)
    pub gesture_events: u64,

    /// Events with no binding in the active profile
    pub unbound_events: u64,

    /// Commands cleared by the safety gate
    pub commands_emitted: u64,

    /// Commands dropped by `single_action_per_frame`
    pub commands_suppressed: u64,

    pub safety_violations: u64,
    pub confirmations_expired: u64,
    pub emergency_stops: u64,
    pub profile_switches: u64,
}

impl EngineMetrics {
    /// Fraction of incoming frames that were processed.
    pub fn processed_ratio(&self) -> f64 {
        let total = self.frames_processed + self.frames_rejected + self.frames_dropped;
        if total == 0 {
            1.0
        } else {
            self.frames_processed as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_ratio() {
        let mut m = EngineMetrics::default();
        assert_eq!(m.processed_ratio(), 1.0);

        m.frames_processed = 3;
        m.frames_dropped = 1;
        assert!((m.processed_ratio() - 0.75).abs() < 1e-12);
    }
}
