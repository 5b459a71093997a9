//! Collaborator traits: where frames come from and where commands go.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{ActionCommand, LandmarkFrame};

/// Abstraction over the external hand tracker.
///
/// # Implementations
///
/// - **Production**: wraps the camera + landmark model pipeline
/// - **Simulation**: replays scripted or recorded frames
///
/// # Frame Flow
///
/// ```text
/// Camera ──> Landmark model ──> LandmarkSource::next_frame() ──> engine
/// ```
#[async_trait]
pub trait LandmarkSource: Send + Sync + 'static {
    /// Waits for the next frame.
    ///
    /// # Returns
    /// * `Some(frame)` - A frame was produced
    /// * `None` - The source is exhausted or shut down
    async fn next_frame(&self) -> Option<LandmarkFrame>;
}

/// Abstraction over the external input dispatcher.
///
/// `submit` must never block: the engine calls it from its frame loop.
/// Implementations that cannot accept a command return an error and the
/// command is dropped by the caller.
pub trait CommandSink: Send + Sync + 'static {
    /// Hands one command to the dispatcher.
    ///
    /// # Returns
    /// * `Ok(())` - Command accepted
    /// * `Err(EnvError::SinkFull)` - Dispatcher is backed up
    /// * `Err(EnvError::ChannelClosed)` - Dispatcher is gone
    fn submit(&self, command: ActionCommand) -> Result<(), EnvError>;
}
