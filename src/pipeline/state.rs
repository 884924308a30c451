//! The mutable record threaded through one query's pipeline run.

use crate::model::Turn;
use crate::search::SearchOutcome;
use crate::tools::{ToolCallOutcome, ToolCallRequest};
use serde::{Deserialize, Serialize};

/// Interaction mode for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Conversational responses, markdown preserved.
    #[default]
    Chat,
    /// Raw-content generation: no framing, code fences unwrapped afterwards.
    Compose,
}

impl Mode {
    /// Parse a mode string; anything unrecognized is chat.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "compose" => Mode::Compose,
            _ => Mode::Chat,
        }
    }
}

/// State for one query's trip through the pipeline.
///
/// Invariant: at pipeline exit at most one of `pending_tool_call` and a
/// finalized `response` is meaningfully set: the run either terminates
/// with a response or suspends on a tool call, never both.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    // Input fields
    pub query: String,
    pub session_id: String,
    pub mode: Mode,
    pub selected_text: Option<String>,
    pub image_data: Option<String>,
    pub model_name: Option<String>,

    // Processing fields
    pub use_web_search: bool,
    /// Explicit web-search request from the query envelope, kept separate
    /// from `use_web_search` so re-classification sees the original signal.
    pub web_search_requested: bool,
    pub web_search_query: Option<String>,
    pub web_search_results: Option<SearchOutcome>,
    pub use_vision: bool,
    pub vision_configured: bool,
    pub vision_description: Option<String>,
    pub pending_tool_call: Option<ToolCallRequest>,
    pub tool_call_result: Option<ToolCallOutcome>,
    pub messages: Vec<Turn>,

    // Output fields
    pub response: String,
    pub detected_language: Option<String>,
}

impl ConversationState {
    /// Fresh state for a raw query in a session.
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// Stages of the pipeline, in the order the interpreter visits them.
///
/// The loop is strictly forward except for one edge: a resolved tool call
/// re-enters `Assemble` so the tool-result turn is folded in before the
/// next generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Search,
    Vision,
    Assemble,
    Generate,
    ToolCall,
    Finalize,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("compose"), Mode::Compose);
        assert_eq!(Mode::parse(" Compose "), Mode::Compose);
        assert_eq!(Mode::parse("chat"), Mode::Chat);
        assert_eq!(Mode::parse("something else"), Mode::Chat);
    }

    #[test]
    fn test_new_state_defaults() {
        let state = ConversationState::new("q", "s");
        assert_eq!(state.mode, Mode::Chat);
        assert!(!state.use_web_search);
        assert!(state.pending_tool_call.is_none());
        assert!(state.messages.is_empty());
    }
}
