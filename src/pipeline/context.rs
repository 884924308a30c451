//! Query envelope parsing.
//!
//! Callers may wrap a query in a structured envelope:
//!
//! ```text
//! Context:
//! =====SELECTED_TEXT=====<text selected by the user>
//! fn main() {}
//! =======================
//! Mode: compose
//!
//! Query:
//! explain this
//! ```
//!
//! Sections use either `Key:` lines or `=====KEY=====` delimited blocks.
//! Parsing degrades gracefully: a missing closing delimiter takes the rest
//! of the context section, and a malformed envelope simply yields fewer
//! extracted fields, never an error.

use super::state::Mode;
use crate::prompts::{blocks, BLOCK_FOOTER};
use tracing::debug;

const ENVELOPE_HEADER: &str = "Context:";
const QUERY_MARKER: &str = "\n\nQuery:\n";

/// Fields extracted from a raw query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedContext {
    pub query: String,
    pub selected_text: Option<String>,
    pub image_data: Option<String>,
    pub mode: Option<Mode>,
    pub web_search: bool,
}

/// Extract a `=====KEY=====` block body: up to the closing delimiter, or to
/// the end of the section when the delimiter is missing. A leading `<tag>`
/// annotation on the block is dropped.
fn delimited_block(section: &str, marker: &str) -> Option<String> {
    let (_, after) = section.split_once(marker)?;
    let body = match after.split_once(BLOCK_FOOTER) {
        Some((body, _)) => body,
        None => after,
    };
    let body = body.trim();
    let body = match (body.find('<'), body.find('>')) {
        (Some(0), Some(end)) => body[end + 1..].trim(),
        _ => body,
    };
    Some(body.to_string())
}

/// Extract a `Key:` line value (single line, trimmed).
fn keyed_line(section: &str, key: &str) -> Option<String> {
    let (_, after) = section.split_once(key)?;
    let value = after.lines().next().unwrap_or("").trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a raw query, extracting any envelope fields.
///
/// Without an envelope the raw string is the query verbatim and every
/// context field stays empty. An explicit `#web` trigger in the query also
/// raises the web-search flag here; the search resolver will re-examine the
/// unmodified query later, so this is a hint, not the classification.
pub fn parse(raw_query: &str) -> ParsedContext {
    let mut parsed = ParsedContext {
        query: raw_query.to_string(),
        ..Default::default()
    };

    if raw_query.trim_start().starts_with("#web ") || raw_query.contains("#web") {
        parsed.web_search = true;
        debug!("web search trigger present in query");
    }

    if !raw_query.contains(ENVELOPE_HEADER) {
        return parsed;
    }
    let Some((context_part, actual_query)) = raw_query.split_once(QUERY_MARKER) else {
        // "Context:" without a query marker is not an envelope.
        return parsed;
    };
    let section = context_part.replace("Context:\n", "");
    let section = section.trim();

    // Plain "Selected Text:" paragraph form.
    if let Some((_, after)) = section.split_once("Selected Text:\n") {
        let text = after.split("\n\n").next().unwrap_or("").trim();
        if !text.is_empty() {
            parsed.selected_text = Some(text.to_string());
        }
    }

    // Delimited forms override the plain ones when both are present.
    if let Some(text) = delimited_block(section, blocks::SELECTED_TEXT) {
        if !text.is_empty() {
            parsed.selected_text = Some(text);
        }
    }

    if let Some(data) = delimited_block(section, blocks::IMAGE_DATA) {
        if !data.is_empty() {
            parsed.image_data = Some(data);
        }
    }

    if let Some(mode) = keyed_line(section, "Mode:") {
        parsed.mode = Some(Mode::parse(&mode));
    }
    if let Some(mode) = delimited_block(section, blocks::MODE) {
        if !mode.is_empty() {
            parsed.mode = Some(Mode::parse(&mode));
        }
    }

    if section.contains("Web Search:") || section.contains(blocks::WEB_SEARCH) {
        parsed.web_search = true;
        debug!("web search flag set in context section");
    }

    parsed.query = actual_query.to_string();
    parsed
}
