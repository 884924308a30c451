//! Event types for streaming responses to the host UI.

use serde::{Deserialize, Serialize};

/// An event on the response stream.
///
/// Content events carry the accumulated response so far, not just the new
/// fragment: the popup re-renders the whole markdown body on every event, so
/// the producer does the accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial response content (accumulated).
    Delta { text: String },
    /// The pipeline is suspended on a tool confirmation; `text` is the full
    /// body to display, including the waiting notice.
    Waiting { text: String },
    /// Terminal sentinel: the response is complete. No further events follow.
    Complete,
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta { text: text.into() }
    }

    pub fn waiting(text: impl Into<String>) -> Self {
        Self::Waiting { text: text.into() }
    }
}
