//! Engine Runtime - drives a [`GestureEngine`] from a tokio task.
//!
//! ```text
//!  camera thread            control (mpsc)          observers
//!       │ push_frame()           │                      ▲
//!       ▼                        ▼                      │ broadcast
//!  ┌──────────┐   notify   ┌───────────────┐   signals  │
//!  │FrameSlot │──────────▶│ EngineRuntime │────────────┘
//!  │ (1 slot) │            │  run() loop   │──▶ CommandSink::submit()
//!  └──────────┘            └───────────────┘
//! ```
//!
//! The mailbox holds at most one frame. Pushing while a frame is waiting
//! replaces it and counts a drop, so the engine always works on the newest
//! frame and never falls behind the camera.

use crate::engine::{EngineSignal, GestureEngine};
use crate::metrics::EngineMetrics;
use crate::profile::Profile;
use crate::safety::SafetyLatch;
use aircontrol_env::{CommandSink, EnvError, LandmarkFrame, LandmarkSource};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tracing::{debug, info, warn};

/// Commands applied between frames.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    SwitchProfile(Box<Profile>),
    AssertEmergencyStop,
    ResetEmergencyStop,
    Shutdown,
}

/// Single-slot frame mailbox.
#[derive(Debug, Default)]
struct FrameSlot {
    frame: Mutex<Option<LandmarkFrame>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl FrameSlot {
    /// Stores `frame`, returning true if it replaced an unprocessed one.
    fn push(&self, frame: LandmarkFrame) -> bool {
        let replaced = {
            let mut slot = self.frame.lock().unwrap_or_else(|e| e.into_inner());
            slot.replace(frame).is_some()
        };
        if replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        replaced
    }

    fn take(&self) -> Option<LandmarkFrame> {
        self.frame.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

/// Cloneable handle for feeding and controlling a running engine.
#[derive(Clone)]
pub struct RuntimeHandle {
    slot: Arc<FrameSlot>,
    control: mpsc::Sender<ControlCommand>,
    signals: broadcast::Sender<EngineSignal>,
    metrics: watch::Receiver<EngineMetrics>,
    latch: SafetyLatch,
    halted: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Hands a frame to the engine. Returns true if an unprocessed frame was
    /// replaced. Frames pushed after `halt` are discarded.
    pub fn push_frame(&self, frame: LandmarkFrame) -> bool {
        if self.is_halted() {
            return false;
        }
        self.slot.push(frame)
    }

    /// Queues a control command, waiting for capacity.
    pub async fn send(&self, command: ControlCommand) -> Result<(), EnvError> {
        self.control
            .send(command)
            .await
            .map_err(|_| EnvError::closed("engine control channel"))
    }

    /// Queues a control command without waiting.
    pub fn try_send(&self, command: ControlCommand) -> Result<(), EnvError> {
        self.control.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnvError::full("engine control channel"),
            mpsc::error::TrySendError::Closed(_) => EnvError::closed("engine control channel"),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineSignal> {
        self.signals.subscribe()
    }

    /// Receiver updated with a metrics snapshot after every frame.
    pub fn metrics(&self) -> watch::Receiver<EngineMetrics> {
        self.metrics.clone()
    }

    /// Sets the emergency latch immediately, without waiting for the loop.
    pub fn assert_emergency_stop(&self) {
        self.latch.assert();
    }

    pub fn latch(&self) -> &SafetyLatch {
        &self.latch
    }

    /// Stops dispatch at once and discards the buffered frame.
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            warn!("Runtime halted");
        }
        self.slot.take();
        self.slot.notify.notify_one();
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

/// Owns the engine and the output sink for the lifetime of the loop.
pub struct EngineRuntime<S: CommandSink> {
    engine: GestureEngine,
    sink: S,
    slot: Arc<FrameSlot>,
    control_rx: mpsc::Receiver<ControlCommand>,
    signals: broadcast::Sender<EngineSignal>,
    metrics: watch::Sender<EngineMetrics>,
    halted: Arc<AtomicBool>,
}

impl<S: CommandSink> EngineRuntime<S> {
    pub fn new(engine: GestureEngine, sink: S) -> (Self, RuntimeHandle) {
        let runtime_cfg = engine.config().runtime;
        let (control_tx, control_rx) = mpsc::channel(runtime_cfg.control_capacity.max(1));
        let (signals, _) = broadcast::channel(runtime_cfg.signal_capacity.max(1));
        let (metrics_tx, metrics_rx) = watch::channel(*engine.metrics());
        let slot = Arc::new(FrameSlot::default());
        let halted = engine.halt_handle();

        let handle = RuntimeHandle {
            slot: Arc::clone(&slot),
            control: control_tx,
            signals: signals.clone(),
            metrics: metrics_rx,
            latch: engine.latch(),
            halted: Arc::clone(&halted),
        };
        let runtime = Self {
            engine,
            sink,
            slot,
            control_rx,
            signals,
            metrics: metrics_tx,
            halted,
        };
        (runtime, handle)
    }

    /// Runs until shutdown, halt, or every handle is dropped. Returns the
    /// engine so its final state can be inspected.
    ///
    /// Control commands are served before frames. A frame waiting at
    /// shutdown is processed first.
    pub async fn run(mut self) -> GestureEngine {
        info!("Engine runtime started (profile '{}')", self.engine.profile().name);

        loop {
            if self.halted.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                biased;

                control = self.control_rx.recv() => match control {
                    Some(ControlCommand::Shutdown) | None => {
                        // The buffered frame still gets its turn
                        if let Some(frame) = self.slot.take() {
                            self.step(&frame);
                        }
                        break;
                    }
                    Some(command) => self.apply(command),
                },

                _ = self.slot.notify.notified() => {
                    if let Some(frame) = self.slot.take() {
                        self.step(&frame);
                    }
                }
            }
        }

        self.publish_metrics();
        info!(
            "Engine runtime stopped after {} frames ({} dropped)",
            self.engine.metrics().frames_processed,
            self.engine.metrics().frames_dropped
        );
        self.engine
    }

    fn apply(&mut self, command: ControlCommand) {
        debug!("Control: {:?}", command);
        match command {
            ControlCommand::SwitchProfile(profile) => match self.engine.switch_profile(*profile) {
                Ok(signal) => self.broadcast(signal),
                Err(e) => warn!("Profile switch refused: {}", e),
            },
            ControlCommand::AssertEmergencyStop => self.engine.assert_emergency_stop(),
            ControlCommand::ResetEmergencyStop => {
                let signal = self.engine.reset_emergency_stop();
                self.broadcast(signal);
            }
            ControlCommand::Shutdown => {}
        }
    }

    fn step(&mut self, frame: &LandmarkFrame) {
        self.engine.record_dropped_frames(self.slot.take_dropped());

        match self.engine.process_frame(frame) {
            Ok(out) => {
                for command in out.commands {
                    if self.halted.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = self.sink.submit(command) {
                        warn!("Command dropped at frame {}: {}", out.sequence, e);
                    }
                }
                for signal in out.signals {
                    self.broadcast(signal);
                }
            }
            Err(e) => warn!("Frame {} not processed: {}", frame.sequence, e),
        }
        self.publish_metrics();
    }

    fn broadcast(&self, signal: EngineSignal) {
        // No receivers is fine
        let _ = self.signals.send(signal);
    }

    fn publish_metrics(&self) {
        self.metrics.send_replace(*self.engine.metrics());
    }
}

/// Forwards every frame of `source` into the mailbox, then asks the runtime
/// to shut down once the source is exhausted.
pub async fn feed<L: LandmarkSource>(source: Arc<L>, handle: RuntimeHandle) {
    while let Some(frame) = source.next_frame().await {
        handle.push_frame(frame);
        if handle.is_halted() {
            return;
        }
    }
    if handle.send(ControlCommand::Shutdown).await.is_err() {
        debug!("Runtime already stopped");
    }
}
