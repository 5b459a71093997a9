//! Frame replay through the async runtime.
//!
//! Recorded `LandmarkFrame`s are served by a [`ReplaySource`] and pumped
//! into an [`EngineRuntime`] exactly as a live camera would be, optionally
//! paced at the recording's own timestamps.

use aircontrol_core::engine::GestureEngine;
use aircontrol_core::runtime::{feed, EngineRuntime};
use aircontrol_core::EngineMetrics;
use aircontrol_env::{ActionCommand, ChannelSink, LandmarkFrame, LandmarkSource};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Serves a fixed list of frames, then reports exhaustion.
pub struct ReplaySource {
    frames: Mutex<VecDeque<LandmarkFrame>>,
    /// Sleep between frames for their timestamp delta
    paced: bool,
    last_ms: Mutex<Option<u64>>,
}

impl ReplaySource {
    pub fn new(frames: Vec<LandmarkFrame>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            paced: false,
            last_ms: Mutex::new(None),
        }
    }

    /// Replays in real time instead of as fast as possible.
    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }
}

#[async_trait]
impl LandmarkSource for ReplaySource {
    async fn next_frame(&self) -> Option<LandmarkFrame> {
        let frame = self.frames.lock().await.pop_front()?;
        if self.paced {
            let mut last = self.last_ms.lock().await;
            if let Some(prev) = *last {
                let gap = frame.timestamp_ms.saturating_sub(prev);
                tokio::time::sleep(Duration::from_millis(gap)).await;
            }
            *last = Some(frame.timestamp_ms);
        } else {
            // Let the engine task take the frame before the next one lands
            tokio::task::yield_now().await;
        }
        Some(frame)
    }
}

/// What a replay produced.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub commands: Vec<ActionCommand>,
    pub metrics: EngineMetrics,
}

/// Runs `source` through `engine` on the tokio runtime until the source is
/// exhausted.
pub async fn run_replay(engine: GestureEngine, source: ReplaySource) -> ReplayReport {
    let (sink, mut rx) = ChannelSink::new(1024);
    let (runtime, handle) = EngineRuntime::new(engine, sink);
    let engine_task = tokio::spawn(runtime.run());
    let collector = tokio::spawn(async move {
        let mut commands = Vec::new();
        while let Some(command) = rx.recv().await {
            commands.push(command);
        }
        commands
    });

    feed(Arc::new(source), handle).await;

    // The runtime owns the sink; its exit closes the command channel
    let metrics = match engine_task.await {
        Ok(engine) => *engine.metrics(),
        Err(_) => EngineMetrics::default(),
    };
    let commands = collector.await.unwrap_or_default();

    info!(
        "Replay done: {} frames processed, {} dropped, {} commands",
        metrics.frames_processed,
        metrics.frames_dropped,
        commands.len()
    );
    ReplayReport { commands, metrics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{FrameSynth, GestureScript, HandScript, NoiseConfig};
    use aircontrol_core::synthetic::{HandShape, SyntheticHand};
    use aircontrol_core::EngineConfig;
    use aircontrol_env::Handedness;

    fn pinch_frames(count: u64) -> Vec<LandmarkFrame> {
        let script = GestureScript::new().with_hand(
            HandScript::new(Handedness::Right, SyntheticHand::new(HandShape::Pinch).at(0.6, 0.7))
                .hold(HandShape::Pinch, 2000),
        );
        let mut synth = FrameSynth::new(3, 30, NoiseConfig::default());
        (0..count)
            .map(|seq| {
                let t = synth.timestamp_ms(seq);
                synth.frame(&script, seq, t)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_replay_source_exhausts() {
        let source = ReplaySource::new(pinch_frames(2));
        assert_eq!(source.next_frame().await.map(|f| f.sequence), Some(0));
        assert_eq!(source.next_frame().await.map(|f| f.sequence), Some(1));
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_accounts_for_every_frame() {
        let engine = GestureEngine::new(EngineConfig::default(), crate::runner::pinch_click_profile()).unwrap();
        let report = run_replay(engine, ReplaySource::new(pinch_frames(20))).await;

        assert_eq!(report.metrics.frames_processed + report.metrics.frames_dropped, 20);
        assert!(report.commands.len() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_replay_processes_all_frames() {
        let engine = GestureEngine::new(EngineConfig::default(), crate::runner::pinch_click_profile()).unwrap();
        let report = run_replay(engine, ReplaySource::new(pinch_frames(12)).paced()).await;

        assert_eq!(report.metrics.frames_processed, 12);
        assert_eq!(report.commands.len(), 1);
    }
}
