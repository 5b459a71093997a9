//! AirControl Deterministic Simulation Harness
//!
//! Drives the gesture engine with scripted synthetic hands instead of a
//! camera, so every recognition and safety property can be checked
//! reproducibly.
//!
//! # Core Principle: One Seed
//!
//! All sources of non-determinism are controlled:
//! - **Time**: frame timestamps derive from the frame index and rate
//! - **Sensor**: jitter, label flicker and NaN dropouts come from a seeded
//!   ChaCha8 RNG
//! - **Engine**: synchronous, single-owner, no wall clock
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                        │
//! │  ┌──────────────┐   ┌────────────┐   ┌───────────────┐   │
//! │  │ GestureScript│──▶│ FrameSynth │──▶│ GestureEngine │   │
//! │  │ (truth)      │   │ (noise)    │   │               │   │
//! │  └──────────────┘   └────────────┘   └──────┬────────┘   │
//! │                                             ▼            │
//! │                          checks + SimExport (JSON)       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use aircontrol_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::PinchHold);
//! assert!(result.passed);
//! ```

mod exporter;
mod replay;
mod runner;
pub mod scenarios;
mod synth;

pub use exporter::{FrameRecord, HandRecord, SimExport};
pub use replay::{run_replay, ReplayReport, ReplaySource};
pub use runner::{pinch_click_profile, ScenarioResult, ScenarioRunner, SimSession};
pub use synth::{FrameSynth, GestureScript, HandScript, NoiseConfig, Segment, SegmentMotion};

use aircontrol_core::{EngineConfig, EngineError, Profile};
use aircontrol_env::LandmarkFrame;
use std::path::Path;

/// Errors loading simulator inputs.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Built-in profile by name, or a profile JSON file.
pub fn load_profile(name_or_path: &str) -> Result<Profile, SimError> {
    if let Some(profile) = Profile::builtin(name_or_path) {
        return Ok(profile);
    }
    if !Path::new(name_or_path).exists() {
        return Err(SimError::UnknownProfile(name_or_path.to_string()));
    }
    let profile: Profile = serde_json::from_str(&std::fs::read_to_string(name_or_path)?)?;
    profile.validate().map_err(EngineError::from)?;
    Ok(profile)
}

/// Engine configuration JSON file (missing fields take their defaults).
pub fn load_config(path: &str) -> Result<EngineConfig, SimError> {
    let config: EngineConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    config.validate().map_err(EngineError::from)?;
    Ok(config)
}

/// Recorded frames: a JSON array of `LandmarkFrame`.
pub fn load_frames(path: &str) -> Result<Vec<LandmarkFrame>, SimError> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profile_by_name() {
        assert_eq!(load_profile("machine").unwrap().name, "machine");
        assert!(matches!(load_profile("no_such_profile"), Err(SimError::UnknownProfile(_))));
    }

    #[test]
    fn test_profile_json_file() {
        let path = std::env::temp_dir().join("aircontrol_sim_profile_test.json");
        let json = serde_json::to_string(&Profile::browser_youtube()).unwrap();
        std::fs::write(&path, json).unwrap();

        let profile = load_profile(path.to_str().unwrap()).unwrap();
        assert_eq!(profile, Profile::browser_youtube());
        std::fs::remove_file(path).ok();
    }
}
