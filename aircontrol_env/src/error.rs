//! Error types for the AirControl collaborator layer.

use thiserror::Error;

/// Errors that can occur at the boundary with external collaborators.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The receiving side of a channel is gone (dispatcher shut down)
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
    
    /// The dispatcher queue is full; the command was not accepted
    #[error("Sink full: {0}")]
    SinkFull(String),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(what: impl Into<String>) -> Self {
        Self::ChannelClosed(what.into())
    }
    
    /// Creates a sink-full error.
    pub fn full(what: impl Into<String>) -> Self {
        Self::SinkFull(what.into())
    }
}
