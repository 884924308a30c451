//! Turn assembly: builds the ordered message list sent to the model.
//!
//! The order is fixed and load-bearing: base system prompt, mode
//! instruction, bounded history, any tool-result/search injections, then
//! exactly one final user turn. Tool and search results are consumed here:
//! folded into the turns and cleared from state so a later assembly of the
//! same logical turn cannot replay them.

use super::state::ConversationState;
use crate::config::OrchestratorConfig;
use crate::db::TranscriptStore;
use crate::model::{ContentBlock, ImageUrl, Turn};
use crate::prompts::{self, blocks, BLOCK_FOOTER};
use crate::search::{SearchStatus, SearchOutcome};
use crate::tools::ToolCallOutcome;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// Builds the message list for one generation pass.
pub struct MessageAssembler<'a> {
    config: &'a OrchestratorConfig,
    history: &'a dyn TranscriptStore,
}

impl<'a> MessageAssembler<'a> {
    pub fn new(config: &'a OrchestratorConfig, history: &'a dyn TranscriptStore) -> Self {
        Self { config, history }
    }

    /// Assemble `state.messages`, consuming any pending tool/search results.
    pub fn assemble(&self, mut state: ConversationState) -> ConversationState {
        let mut messages = vec![Turn::system(prompts::system_prompt(
            self.config.custom_instructions.as_deref(),
        ))];

        messages.push(Turn::system(match state.mode {
            super::state::Mode::Compose => prompts::COMPOSE_MODE_INSTRUCTION,
            super::state::Mode::Chat => prompts::CHAT_MODE_INSTRUCTION,
        }));

        // Bounded history suffix, chronological order preserved.
        match self.history.get(&state.session_id) {
            Ok(history) => {
                let skip = history.len().saturating_sub(self.config.history_limit);
                messages.extend(history.into_iter().skip(skip));
            }
            Err(e) => warn!(error = %e, "failed to load session history"),
        }

        // Fold in a resolved tool call, at most once.
        if let Some(outcome) = state.tool_call_result.take() {
            self.fold_tool_result(&mut messages, outcome);
        }

        // Fold in search results, rewriting the outgoing query text.
        let mut query_text = state.query.clone();
        if let Some(results) = state.web_search_results.take() {
            query_text = self.fold_search_results(&mut messages, results, &state.query);
        }

        // Selected text, unless an earlier step already embedded it.
        if let Some(selected) = &state.selected_text {
            if !query_text.contains(blocks::SELECTED_TEXT) {
                query_text.push_str(&format!(
                    "\n\n{}\n{selected}\n{BLOCK_FOOTER}",
                    blocks::SELECTED_TEXT_TAGGED
                ));
            }
        }

        messages.push(self.final_user_turn(&state, query_text));
        state.messages = messages;
        state
    }

    fn fold_tool_result(&self, messages: &mut Vec<Turn>, outcome: ToolCallOutcome) {
        let tool = outcome.tool.clone();
        let id = outcome.id.clone();
        debug!(tool = %tool, "folding tool result into messages");

        if outcome.is_rejected() {
            messages.push(Turn::tool_result(
                "The user rejected this tool call request. Please proceed without using this tool.",
                id,
            ));
            return;
        }

        messages.push(Turn::tool_result(render_tool_content(&outcome), id));
        messages.push(Turn::system(format!(
            "This is the result of the {tool} tool call you requested. \
             Incorporate this information into your response to the user."
        )));
    }

    fn fold_search_results(
        &self,
        messages: &mut Vec<Turn>,
        results: SearchOutcome,
        original_query: &str,
    ) -> String {
        match results.status {
            SearchStatus::Error => {
                let what = results.mode.describe();
                let error = results.error.as_deref().unwrap_or("Unknown error");
                warn!(error, "search failed, folding error into query");
                format!(
                    "I tried to perform a {what} based on the query '{original_query}' but \
                     encountered an error: {error}. Please answer the original query \
                     '{original_query}' without the web results."
                )
            }
            SearchStatus::Success => {
                if let Some(instruction) = results.system_instruction {
                    messages.push(Turn::system(instruction));
                }
                if results.query.is_empty() {
                    warn!("search succeeded without a formatted query, keeping the original");
                    original_query.to_string()
                } else {
                    results.query
                }
            }
        }
    }

    /// The final user turn. Shape depends on the vision outcome: plain text,
    /// text plus description, text plus failure note, or multimodal blocks.
    fn final_user_turn(&self, state: &ConversationState, query_text: String) -> Turn {
        if let Some(description) = &state.vision_description {
            return Turn::user(format!(
                "{query_text}\n\n{}\n{description}\n{BLOCK_FOOTER}",
                blocks::VISUAL_DESCRIPTION
            ));
        }

        if let Some(image_data) = &state.image_data {
            if state.vision_configured {
                // A configured vision model produced nothing: soft failure.
                return Turn::user(format!(
                    "{query_text}\n\n{}\n(Failed to process the provided visual input using \
                     the configured vision model.)\n{BLOCK_FOOTER}",
                    blocks::SYSTEM_NOTE
                ));
            }
            // No vision model: the main model gets the image itself.
            let clean = match image_data.split_once(',') {
                Some((prefix, rest)) if prefix.starts_with("data:") => rest,
                _ => image_data.as_str(),
            };
            return Turn::user_blocks(vec![
                ContentBlock::Text { text: query_text },
                ContentBlock::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{clean}"),
                    },
                },
            ]);
        }

        Turn::user(query_text)
    }
}

/// Render a successful or failed tool outcome as tool-result content.
///
/// Known tools returning a plain `data` string pass it through untouched;
/// everything else gets pretty-printed with an attribution header so the
/// model knows which tool produced it.
fn render_tool_content(outcome: &ToolCallOutcome) -> String {
    if matches!(outcome.tool.as_str(), "web_search" | "system_info") {
        if let Some(JsonValue::String(data)) = &outcome.result.data {
            return data.clone();
        }
    }

    let body = match &outcome.result.data {
        Some(JsonValue::String(data)) => data.clone(),
        Some(data @ (JsonValue::Object(_) | JsonValue::Array(_))) => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
        }
        Some(data) => data.to_string(),
        None => serde_json::to_string_pretty(&outcome.result)
            .unwrap_or_else(|_| format!("{:?}", outcome.result)),
    };
    format!("Result from {} tool:\n\n{body}", outcome.tool)
}
