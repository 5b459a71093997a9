//! AirControl Environment Abstraction Layer
//!
//! This crate holds everything the gesture engine shares with the outside
//! world, so the engine itself never touches cameras or OS input APIs:
//! - Wire types (`LandmarkFrame` in, `ActionCommand` out)
//! - Collaborator traits (`LandmarkSource`, `CommandSink`)
//! - Tokio channel implementations for production and replay
//!
//! # Example
//!
//! ```ignore
//! use aircontrol_env::{ChannelSink, ChannelSource, LandmarkSource};
//!
//! let (frame_tx, source) = ChannelSource::new(8);
//! let (sink, mut commands) = ChannelSink::new(64);
//!
//! while let Some(frame) = source.next_frame().await {
//!     // hand the frame to the engine, submit its commands to `sink`
//! }
//! ```

mod error;
mod source;
mod tokio_impl;
mod types;

pub use error::EnvError;
pub use source::{CommandSink, LandmarkSource};
pub use tokio_impl::{ChannelSink, ChannelSource};
pub use types::{
    Action, ActionCommand, DeviceClass, HandObservation, Handedness, Landmark, LandmarkFrame,
    MacroStep, PointerButton, LANDMARK_COUNT,
};
