//! Suspend/resume state machine for tool-call confirmation.
//!
//! When the model requests a tool, the pipeline suspends here:
//! Idle → AwaitingConfirmation → Resolved → Idle. The wait is a bounded
//! async receive on the confirmation channel, so the host process keeps
//! servicing its UI and streams while a prompt sits unanswered. Every exit
//! path (decision, timeout, closed channel) normalizes into a
//! [`ToolCallOutcome`] carrying the model's original correlation id.

use super::confirm::ConfirmationBus;
use super::{ToolCallOutcome, ToolCallRequest};
use crate::messaging::StreamSender;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default hard cap on how long a confirmation prompt may sit unanswered.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// How a wait ended. Recorded for logging; the normalized outcome is what
/// flows onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Accepted,
    Rejected,
    TimedOut,
    ChannelClosed,
}

/// Coordinates one tool-call confirmation at a time.
pub struct ToolCoordinator {
    bus: Arc<ConfirmationBus>,
    timeout: Duration,
}

impl ToolCoordinator {
    pub fn new(bus: Arc<ConfirmationBus>) -> Self {
        Self {
            bus,
            timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    /// Override the confirmation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publish the request, wait for a decision, and normalize the result.
    ///
    /// When `progress` is set, a waiting notice with animated dots is pushed
    /// on the stream roughly once a second; `accumulated` is the response
    /// text streamed so far, kept visible under the notice.
    pub async fn resolve(
        &self,
        request: &ToolCallRequest,
        progress: Option<(&StreamSender, &str)>,
    ) -> ToolCallOutcome {
        // Clear the ready-signal: decisions from an earlier wait must not
        // satisfy this one.
        self.bus.drain_stale().await;
        self.bus.publish(request);

        info!(tool = %request.tool, id = %request.id, "awaiting user confirmation");
        let started = Instant::now();
        let deadline = started + self.timeout;

        let (resolution, delivered) = self.wait_for_decision(deadline, started, progress).await;
        let elapsed = started.elapsed();
        debug!(
            tool = %request.tool,
            resolution = ?resolution,
            elapsed_secs = elapsed.as_secs_f64(),
            "confirmation wait finished"
        );

        let mut outcome = match (resolution, delivered) {
            (Resolution::Accepted | Resolution::Rejected, Some(outcome)) => outcome,
            (Resolution::TimedOut, _) => {
                warn!(tool = %request.tool, "timeout waiting for tool call confirmation");
                ToolCallOutcome::error(&request.tool, "Timeout waiting for user confirmation")
            }
            (Resolution::ChannelClosed, _) => {
                warn!(tool = %request.tool, "confirmation channel closed while waiting");
                ToolCallOutcome::error(
                    &request.tool,
                    "Error waiting for response: confirmation channel closed",
                )
            }
            // A delivered resolution always carries an outcome; this arm is
            // unreachable but keeps the match total.
            (_, None) => ToolCallOutcome::error(&request.tool, "Confirmation wait failed"),
        };

        // Reconcile the correlation id: the channel may have stamped its own
        // internal id, but the tool-result turn must carry the id the model
        // issued, or native function-calling providers drop the result.
        outcome.id = Some(request.id.clone());
        if outcome.tool.is_empty() {
            outcome.tool = request.tool.clone();
        }

        if !outcome.is_rejected() && outcome.metadata.is_none() {
            let mut metadata = serde_json::Map::new();
            if let Some(description) = self.bus.description(&request.tool) {
                metadata.insert("tool_description".to_string(), description.into());
            }
            metadata.insert("timestamp".to_string(), Utc::now().timestamp().into());
            outcome.metadata = Some(metadata);
        }

        outcome
    }

    async fn wait_for_decision(
        &self,
        deadline: Instant,
        started: Instant,
        progress: Option<(&StreamSender, &str)>,
    ) -> (Resolution, Option<ToolCallOutcome>) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return (Resolution::TimedOut, None);
            }
            // One-second ticks drive the waiting animation between polls.
            let tick = (deadline - now).min(Duration::from_secs(1));

            match tokio::time::timeout(tick, self.bus.recv_decision()).await {
                Ok(Some(outcome)) => {
                    let resolution = if outcome.is_rejected() {
                        Resolution::Rejected
                    } else {
                        Resolution::Accepted
                    };
                    return (resolution, Some(outcome));
                }
                Ok(None) => return (Resolution::ChannelClosed, None),
                Err(_) => {
                    if let Some((sender, accumulated)) = progress {
                        let dots = ".".repeat((started.elapsed().as_secs() % 4) as usize);
                        sender.waiting(format!(
                            "{accumulated}\n\n[Waiting for your confirmation to use the tool{dots}]"
                        ));
                    }
                }
            }
        }
    }
}
