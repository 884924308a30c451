//! Broadcast bus carrying stream events from the pipeline to the UI.

use super::StreamEvent;
use tokio::sync::broadcast;

/// Sender half of the stream bus.
#[derive(Clone)]
pub struct StreamSender {
    tx: broadcast::Sender<StreamEvent>,
}

impl StreamSender {
    /// Send an event.
    pub fn send(&self, event: StreamEvent) -> Result<(), BusError> {
        self.tx.send(event).map_err(|_| BusError::Closed)?;
        Ok(())
    }

    /// Send accumulated partial content. Ignores a closed channel: a stopped
    /// listener silences the stream without failing the pipeline.
    pub fn delta(&self, text: impl Into<String>) {
        let _ = self.send(StreamEvent::delta(text));
    }

    /// Send a tool-wait progress update.
    pub fn waiting(&self, text: impl Into<String>) {
        let _ = self.send(StreamEvent::waiting(text));
    }

    /// Send the completion sentinel.
    pub fn complete(&self) {
        let _ = self.send(StreamEvent::Complete);
    }
}

/// Receiver half of the stream bus.
pub struct StreamReceiver {
    rx: broadcast::Receiver<StreamEvent>,
}

impl StreamReceiver {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Result<StreamEvent, BusError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BusError::Closed,
            broadcast::error::RecvError::Lagged(n) => BusError::Lagged(n),
        })
    }

    /// Try to receive an event without waiting.
    pub fn try_recv(&mut self) -> Result<Option<StreamEvent>, BusError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(BusError::Lagged(n)),
        }
    }
}

/// Stream bus connecting one pipeline run to any number of listeners.
pub struct StreamBus {
    tx: broadcast::Sender<StreamEvent>,
}

impl StreamBus {
    /// Create a new stream bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Get a sender.
    pub fn sender(&self) -> StreamSender {
        StreamSender {
            tx: self.tx.clone(),
        }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> StreamReceiver {
        StreamReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StreamBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Channel closed")]
    Closed,
    #[error("Lagged behind by {0} events")]
    Lagged(u64),
}
