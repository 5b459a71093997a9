//! JSON exporter for scenario traces.
//!
//! One record per frame: where each tracked hand was, what the engine
//! confirmed, what it emitted and which observer signals fired.

use aircontrol_core::engine::{EngineSignal, FrameOutput};
use aircontrol_core::gesture::{GestureEvent, Hand};
use aircontrol_core::identity::{IdentityTracker, TrackId};
use aircontrol_core::landmarks::palm_center;
use aircontrol_core::EngineMetrics;
use aircontrol_env::ActionCommand;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Tracked hand at the end of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandRecord {
    pub hand: Hand,
    pub track_id: TrackId,
    pub visible: bool,
    /// Palm center [x, y] (normalized image units)
    pub palm: [f64; 2],
    pub depth: f64,
    pub speed: f64,
}

/// A single frame of the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub hands: Vec<HandRecord>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<GestureEvent>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub commands: Vec<ActionCommand>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub signals: Vec<EngineSignal>,
}

impl FrameRecord {
    pub fn new(output: &FrameOutput, tracker: &IdentityTracker) -> Self {
        let hands = tracker
            .tracks()
            .filter_map(|track| {
                let state = track.latest()?;
                let palm = palm_center(&track.landmarks);
                Some(HandRecord {
                    hand: track.hand,
                    track_id: track.id,
                    visible: track.is_visible(),
                    palm: [palm.x, palm.y],
                    depth: state.depth,
                    speed: state.speed(),
                })
            })
            .collect();

        Self {
            sequence: output.sequence,
            timestamp_ms: output.timestamp_ms,
            hands,
            events: output.events.clone(),
            commands: output.commands.clone(),
            signals: output.signals.clone(),
        }
    }
}

/// Complete scenario export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub fps: u32,

    /// Timestamp of the last frame
    pub duration_ms: u64,

    /// All frames
    pub frames: Vec<FrameRecord>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EngineMetrics>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, fps: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            fps,
            duration_ms: 0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: FrameRecord) {
        self.duration_ms = frame.timestamp_ms;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, metrics: EngineMetrics) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.metrics = Some(metrics);
    }

    /// Every command of the run, in order.
    pub fn commands(&self) -> impl Iterator<Item = &ActionCommand> {
        self.frames.iter().flat_map(|f| f.commands.iter())
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
