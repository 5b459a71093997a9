//! Engine configuration
//!
//! Every tunable of the pipeline in one serde value. Each section falls back
//! to its documented defaults, so a partial JSON document is enough.

use crate::debounce::{DebounceDefaults, DebounceParams};
use crate::dynamic::DynamicConfig;
use crate::identity::TrackingConfig;
use crate::motion::MotionConfig;
use crate::static_pose::StaticConfig;
use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Smoothing factor {name} out of (0, 1]: {value}")]
    InvalidAlpha { name: &'static str, value: f64 },

    #[error("Entry threshold above confirm threshold for {0}")]
    ThresholdOrder(&'static str),

    #[error("Threshold out of [0, 1] for {0}")]
    ThresholdRange(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Runtime plumbing sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pending control commands (default: 16)
    pub control_capacity: usize,

    /// Observer signal buffer; slow receivers lag past this (default: 256)
    pub signal_capacity: usize,

    /// Emit a motion signal per visible hand every frame (default: false)
    pub emit_motion_signals: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control_capacity: 16,
            signal_capacity: 256,
            emit_motion_signals: false,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tracking: TrackingConfig,
    pub motion: MotionConfig,
    pub statics: StaticConfig,
    pub dynamics: DynamicConfig,
    pub debounce: DebounceDefaults,
    pub runtime: RuntimeConfig,
}

fn check_alpha(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidAlpha { name, value })
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            name,
            reason: format!("{} must be positive", value),
        })
    }
}

fn check_debounce(name: &'static str, p: &DebounceParams) -> Result<(), ConfigError> {
    let in_range = |v: f64| (0.0..=1.0).contains(&v);
    if !in_range(p.entry_threshold) || !in_range(p.confirm_threshold) {
        return Err(ConfigError::ThresholdRange(name));
    }
    if p.entry_threshold > p.confirm_threshold {
        return Err(ConfigError::ThresholdOrder(name));
    }
    Ok(())
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.motion;
        check_alpha("motion.position_alpha", m.position_alpha)?;
        check_alpha("motion.derivative_alpha", m.derivative_alpha)?;
        check_alpha("motion.depth_alpha", m.depth_alpha)?;
        check_alpha("motion.orientation_alpha", m.orientation_alpha)?;

        let t = &self.tracking;
        if t.loss_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "tracking.loss_timeout_ms",
                reason: "must be non-zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&t.min_handedness_confidence) {
            return Err(ConfigError::ThresholdRange("tracking.min_handedness_confidence"));
        }
        if t.history_len == 0 {
            return Err(ConfigError::InvalidValue {
                name: "tracking.history_len",
                reason: "must be non-zero".to_string(),
            });
        }
        if !(t.landmark_margin >= 0.0 && t.landmark_margin.is_finite()) {
            return Err(ConfigError::InvalidValue {
                name: "tracking.landmark_margin",
                reason: format!("must be finite and >= 0, got {}", t.landmark_margin),
            });
        }

        let s = &self.statics;
        check_positive("statics.pinch_span", s.pinch_span)?;
        check_positive("statics.extension_span", s.extension_span)?;
        check_positive("statics.vertical_span", s.vertical_span)?;
        if s.curled_ratio > s.extended_ratio {
            return Err(ConfigError::InvalidValue {
                name: "statics.curled_ratio",
                reason: "above extended_ratio".to_string(),
            });
        }

        let d = &self.dynamics;
        if d.window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "dynamics.window_ms",
                reason: "must be non-zero".to_string(),
            });
        }
        check_positive("dynamics.swipe_min_speed", d.swipe_min_speed)?;
        check_positive("dynamics.swipe_min_displacement", d.swipe_min_displacement)?;
        check_positive("dynamics.push_pull_min_speed", d.push_pull_min_speed)?;
        check_positive("dynamics.push_pull_min_displacement", d.push_pull_min_displacement)?;
        check_positive("dynamics.rotation_min_angular_speed", d.rotation_min_angular_speed)?;
        check_positive("dynamics.rotation_min_angle", d.rotation_min_angle)?;
        if !(d.direction_tolerance_deg > 0.0 && d.direction_tolerance_deg < 90.0) {
            return Err(ConfigError::InvalidValue {
                name: "dynamics.direction_tolerance_deg",
                reason: format!("{} not in (0, 90)", d.direction_tolerance_deg),
            });
        }

        check_debounce("debounce.static_pose", &self.debounce.static_pose)?;
        check_debounce("debounce.dynamic", &self.debounce.dynamic)?;
        check_debounce("debounce.bimanual", &self.debounce.bimanual)?;

        if self.runtime.control_capacity == 0 || self.runtime.signal_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "runtime",
                reason: "channel capacities must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"tracking": {"loss_timeout_ms": 400}, "debounce": {"static_pose": {"min_hold_ms": 90}}}"#)
                .unwrap();

        assert_eq!(config.tracking.loss_timeout_ms, 400);
        assert_eq!(config.tracking.history_len, TrackingConfig::default().history_len);
        assert_eq!(config.debounce.static_pose.min_hold_ms, 90);
        assert_eq!(config.debounce.static_pose.confirm_threshold, 0.8);
        assert_eq!(config.motion, MotionConfig::default());
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let mut config = EngineConfig::default();
        config.motion.depth_alpha = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlpha { .. })));
    }

    #[test]
    fn test_threshold_order_rejected() {
        let mut config = EngineConfig::default();
        config.debounce.dynamic.entry_threshold = 0.9;
        assert_eq!(config.validate(), Err(ConfigError::ThresholdOrder("debounce.dynamic")));
    }

    #[test]
    fn test_negative_landmark_margin_rejected() {
        let mut config = EngineConfig::default();
        config.tracking.landmark_margin = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name: "tracking.landmark_margin", .. })
        ));
    }
}
