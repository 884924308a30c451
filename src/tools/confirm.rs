//! Confirmation channel between the pipeline and the human-facing UI.
//!
//! Pending tool calls are broadcast to whoever renders the confirmation
//! prompt; the decision (and the tool's result, if accepted and executed)
//! comes back on an mpsc channel the coordinator waits on. The two halves
//! are deliberately asymmetric: many listeners may observe requests, but
//! exactly one pipeline consumes decisions.

use super::{ToolCallOutcome, ToolCallRequest};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};

/// Delivers decisions back to the waiting pipeline. Held by the UI side.
#[derive(Clone)]
pub struct ConfirmationResponder {
    tx: mpsc::UnboundedSender<ToolCallOutcome>,
}

impl ConfirmationResponder {
    /// Deliver the outcome of a confirmed-and-executed (or failed) tool call.
    pub fn deliver(&self, outcome: ToolCallOutcome) -> Result<(), ConfirmError> {
        self.tx.send(outcome).map_err(|_| ConfirmError::Closed)
    }

    /// Deliver a rejection for the named tool.
    pub fn reject(&self, tool: impl Into<String>) -> Result<(), ConfirmError> {
        self.deliver(ToolCallOutcome::rejected(tool))
    }
}

/// The confirmation channel endpoints plus tool metadata for enrichment.
pub struct ConfirmationBus {
    request_tx: broadcast::Sender<ToolCallRequest>,
    decision_tx: mpsc::UnboundedSender<ToolCallOutcome>,
    decision_rx: Mutex<mpsc::UnboundedReceiver<ToolCallOutcome>>,
    descriptions: RwLock<HashMap<String, String>>,
}

impl ConfirmationBus {
    /// Create a bus pre-loaded with descriptions for the built-in tools.
    pub fn new() -> Self {
        let (request_tx, _) = broadcast::channel(16);
        let (decision_tx, decision_rx) = mpsc::unbounded_channel();

        let mut descriptions = HashMap::new();
        descriptions.insert(
            "web_search".to_string(),
            "Searches the web for up-to-date information.".to_string(),
        );
        descriptions.insert(
            "terminal_command".to_string(),
            "Runs a shell command on the user's machine.".to_string(),
        );
        descriptions.insert(
            "system_info".to_string(),
            "Reads basic information about the user's system.".to_string(),
        );

        Self {
            request_tx,
            decision_tx,
            decision_rx: Mutex::new(decision_rx),
            descriptions: RwLock::new(descriptions),
        }
    }

    /// Watch for pending tool calls (UI side).
    pub fn subscribe_requests(&self) -> broadcast::Receiver<ToolCallRequest> {
        self.request_tx.subscribe()
    }

    /// Get a responder handle for delivering decisions (UI side).
    pub fn responder(&self) -> ConfirmationResponder {
        ConfirmationResponder {
            tx: self.decision_tx.clone(),
        }
    }

    /// Publish a pending tool call to the UI. A missing listener is not an
    /// error here; the coordinator's timeout covers an unattended prompt.
    pub fn publish(&self, request: &ToolCallRequest) {
        debug!(tool = %request.tool, id = %request.id, "publishing tool call for confirmation");
        if self.request_tx.send(request.clone()).is_err() {
            warn!(tool = %request.tool, "no confirmation listener attached");
        }
    }

    /// Discard decisions left over from an earlier, already-resolved wait.
    pub async fn drain_stale(&self) {
        let mut rx = self.decision_rx.lock().await;
        while let Ok(stale) = rx.try_recv() {
            warn!(tool = %stale.tool, "discarding stale tool decision");
        }
    }

    /// Wait for the next decision. `None` means every responder was dropped.
    pub async fn recv_decision(&self) -> Option<ToolCallOutcome> {
        let mut rx = self.decision_rx.lock().await;
        rx.recv().await
    }

    /// Register or replace a tool description used for outcome metadata.
    pub fn set_description(&self, tool: impl Into<String>, description: impl Into<String>) {
        if let Ok(mut map) = self.descriptions.write() {
            map.insert(tool.into(), description.into());
        }
    }

    /// Description of a tool, if known.
    pub fn description(&self, tool: &str) -> Option<String> {
        self.descriptions.read().ok()?.get(tool).cloned()
    }
}

impl Default for ConfirmationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Confirmation channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    #[error("Confirmation channel closed")]
    Closed,
}
