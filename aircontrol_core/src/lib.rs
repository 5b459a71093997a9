//! AirControl Core - Two-Hand Motion & Gesture Recognition Engine
//!
//! Turns a stream of per-frame hand landmarks into discrete, debounced,
//! context-aware action commands:
//! 1. **Identity**: stable left/right tracks across label flicker and occlusion
//! 2. **Recognition**: static poses, dynamic motions and two-hand combinations
//! 3. **Debounce**: one hysteresis state machine per gesture channel
//! 4. **Mapping & Safety**: profile bindings, emergency latch, safe zone and
//!    rate limits

pub mod combiner;
pub mod config;
pub mod debounce;
pub mod dynamic;
pub mod engine;
pub mod gesture;
pub mod identity;
pub mod landmarks;
pub mod mapper;
pub mod metrics;
pub mod motion;
pub mod profile;
pub mod runtime;
pub mod safety;
pub mod static_pose;

#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;

// Re-export key types for convenience
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, EngineSignal, FrameOutput, GestureEngine, StopSource};
pub use gesture::{GestureEvent, GestureKind, Hand, HandSet, MotionKind, StaticPose};
pub use identity::{IdentityTracker, TrackId};
pub use metrics::EngineMetrics;
pub use profile::{Binding, Profile, ProfileError, ProfileKind};
pub use runtime::{ControlCommand, EngineRuntime, RuntimeHandle};
pub use safety::{SafetyGate, SafetyLatch};
