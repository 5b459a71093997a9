//! Channel-backed implementations of the collaborator traits using Tokio.

use crate::error::EnvError;
use crate::source::{CommandSink, LandmarkSource};
use crate::types::{ActionCommand, LandmarkFrame};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Landmark source fed through a Tokio channel.
///
/// The producer (camera thread, replay task) owns the matching sender.
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<LandmarkFrame>>,
}

impl ChannelSource {
    /// Creates a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<LandmarkFrame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx: Mutex::new(rx) })
    }
}

#[async_trait]
impl LandmarkSource for ChannelSource {
    async fn next_frame(&self) -> Option<LandmarkFrame> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

/// Command sink writing into a bounded Tokio channel.
///
/// Uses `try_send`, so a slow dispatcher causes drops rather than stalls.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ActionCommand>,
}

impl ChannelSink {
    /// Creates a sink and the receiver the dispatcher reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ActionCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl CommandSink for ChannelSink {
    fn submit(&self, command: ActionCommand) -> Result<(), EnvError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnvError::full("dispatcher queue"),
            mpsc::error::TrySendError::Closed(_) => EnvError::closed("dispatcher queue"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    #[tokio::test]
    async fn test_channel_source_yields_frames_in_order() {
        let (tx, source) = ChannelSource::new(4);
        tx.send(LandmarkFrame::new(1, 0)).await.unwrap();
        tx.send(LandmarkFrame::new(2, 33)).await.unwrap();
        drop(tx);

        assert_eq!(source.next_frame().await.map(|f| f.sequence), Some(1));
        assert_eq!(source.next_frame().await.map(|f| f.sequence), Some(2));
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_reports_full_and_closed() {
        let (sink, mut rx) = ChannelSink::new(1);
        let cmd = ActionCommand::new(1, 0, Action::Scroll { amount: 120 }, 1.0);

        assert!(sink.submit(cmd.clone()).is_ok());
        assert!(matches!(sink.submit(cmd.clone()), Err(EnvError::SinkFull(_))));

        assert_eq!(rx.recv().await, Some(cmd.clone()));
        drop(rx);
        assert!(matches!(sink.submit(cmd), Err(EnvError::ChannelClosed(_))));
    }
}
