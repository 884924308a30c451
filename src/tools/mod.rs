//! Tool-call types and the human-confirmation machinery.
//!
//! A tool call is a model-requested side-effecting action. It is never
//! executed directly: the request is published to a confirmation channel
//! ([`confirm::ConfirmationBus`]), a human accepts or rejects it, and the
//! [`coordinator::ToolCoordinator`] folds the decision back into the
//! pipeline as a [`ToolCallOutcome`].

pub mod confirm;
pub mod coordinator;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A tool invocation requested by the model, awaiting confirmation.
///
/// `id` is the correlation token: it must survive the round trip through
/// the confirmation channel so the eventual tool-result turn matches the
/// model's own function-call id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    pub args: JsonValue,
    pub id: String,
}

impl ToolCallRequest {
    pub fn new(tool: impl Into<String>, args: JsonValue, id: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args,
            id: id.into(),
        }
    }
}

/// Terminal status of a confirmed (or refused) tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
    Rejected,
}

/// Result payload inside a [`ToolCallOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    pub status: OutcomeStatus,
    /// Tool output on success. Any JSON shape; the assembler knows how to
    /// render the common ones and falls back to pretty-printed JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    /// Human-readable failure text on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The decision and result for a tool call, as delivered by the
/// confirmation collaborator and reconciled by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub tool: String,
    /// Correlation id. The confirmation channel may fill this with its own
    /// internal id; the coordinator overwrites it with the model-supplied
    /// request id before the outcome reaches the assembler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub result: ToolResultPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, JsonValue>>,
}

impl ToolCallOutcome {
    /// Successful execution with tool output.
    pub fn success(tool: impl Into<String>, data: JsonValue) -> Self {
        Self {
            tool: tool.into(),
            id: None,
            result: ToolResultPayload {
                status: OutcomeStatus::Success,
                data: Some(data),
                message: None,
            },
            metadata: None,
        }
    }

    /// Failed execution (or a synthesized failure such as a timeout).
    pub fn error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            id: None,
            result: ToolResultPayload {
                status: OutcomeStatus::Error,
                data: None,
                message: Some(message.into()),
            },
            metadata: None,
        }
    }

    /// User declined the tool call.
    pub fn rejected(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            id: None,
            result: ToolResultPayload {
                status: OutcomeStatus::Rejected,
                data: None,
                message: None,
            },
            metadata: None,
        }
    }

    /// Attach the given correlation id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_rejected(&self) -> bool {
        self.result.status == OutcomeStatus::Rejected
    }
}
