//! Web-search collaborator boundary.
//!
//! The orchestrator never talks to a search provider directly. It asks a
//! [`SearchResolver`] to classify the query (pure and idempotent; the pipeline
//! calls it twice with the same input) and, when the classification says so,
//! to execute the search or scrape. Execution never fails loudly: provider
//! and network problems come back as a [`SearchOutcome`] with
//! `status: Error` and get folded into the query text.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// What kind of web work a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    WebSearch,
    LinkScrape,
    None,
}

impl SearchMode {
    /// Human wording used when folding an error into the query text.
    pub fn describe(&self) -> &'static str {
        match self {
            SearchMode::WebSearch => "web search",
            SearchMode::LinkScrape => "link scrape",
            SearchMode::None => "web task",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, SearchMode::None)
    }
}

/// Classification result: what to do and with which query/URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub mode: SearchMode,
    /// Query with any trigger syntax stripped.
    pub query: String,
    /// Target URL for a scrape.
    pub url: Option<String>,
    /// The query exactly as received.
    pub original_query: String,
}

impl SearchPlan {
    fn none(query: &str) -> Self {
        Self {
            mode: SearchMode::None,
            query: query.to_string(),
            url: None,
            original_query: query.to_string(),
        }
    }
}

/// Contextual signals that can trigger a search without query syntax.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    pub selected_text: Option<String>,
    /// Explicit web-search flag from the query envelope.
    pub web_search: bool,
    /// URL handed over by the caller for scraping.
    pub link_to_scrape: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Success,
    Error,
}

/// Result of executing a search or scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub mode: SearchMode,
    /// On success: the fully formatted query text (results embedded) that
    /// replaces the outgoing user query.
    pub query: String,
    /// Optional system turn to attach alongside the results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn success(
        mode: SearchMode,
        query: impl Into<String>,
        system_instruction: Option<String>,
    ) -> Self {
        Self {
            status: SearchStatus::Success,
            mode,
            query: query.into(),
            system_instruction,
            error: None,
        }
    }

    pub fn failure(mode: SearchMode, error: impl Into<String>) -> Self {
        Self {
            status: SearchStatus::Error,
            mode,
            query: String::new(),
            system_instruction: None,
            error: Some(error.into()),
        }
    }
}

/// The search collaborator.
#[async_trait]
pub trait SearchResolver: Send + Sync {
    /// Decide whether the query wants a search, a scrape, or nothing.
    /// Pure and idempotent; the default is the shared [`classify_query`].
    fn classify(&self, query: &str, context: &SearchContext) -> SearchPlan {
        classify_query(query, context)
    }

    /// Run the planned search or scrape. Must never fail for ordinary
    /// provider/network trouble; return `status: Error` instead.
    async fn execute(&self, plan: &SearchPlan, selected_text: Option<&str>) -> SearchOutcome;
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(https?://[^\s]+)").unwrap())
}

fn hash_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(https?://[^\s]+)").unwrap())
}

/// Classify a raw query: direct URLs and `#url` mean scrape, `#web` (prefix
/// or inline) means search, then the context flags get their say.
///
/// Deterministic over its inputs, so calling it twice with the same
/// `(query, context)` yields the same plan.
pub fn classify_query(query: &str, context: &SearchContext) -> SearchPlan {
    // A bare URL in the query is a scrape request. Length-gate it so
    // something like "http://x" in prose does not hijack the query.
    if let Some(m) = url_regex().captures(query).and_then(|c| c.get(1)) {
        let url = m.as_str();
        if url.len() > 15 && url.contains('.') {
            debug!(url, "direct URL detected in query");
            return SearchPlan {
                mode: SearchMode::LinkScrape,
                query: query.to_string(),
                url: Some(url.to_string()),
                original_query: query.to_string(),
            };
        }
    }

    if let Some(m) = hash_url_regex().captures(query).and_then(|c| c.get(1)) {
        let url = m.as_str().to_string();
        let stripped = query.replacen(&format!("#{url}"), "", 1).trim().to_string();
        debug!(url, "hash-URL scrape request");
        return SearchPlan {
            mode: SearchMode::LinkScrape,
            query: stripped,
            url: Some(url),
            original_query: query.to_string(),
        };
    }

    if query.trim_start().starts_with("#web ") {
        let stripped = query.replacen("#web ", "", 1).trim().to_string();
        debug!("web search requested (prefix)");
        return SearchPlan {
            mode: SearchMode::WebSearch,
            query: stripped,
            url: None,
            original_query: query.to_string(),
        };
    }

    if query.contains("#web") {
        let stripped = query.replacen("#web", "", 1).trim().to_string();
        debug!("web search requested (inline)");
        return SearchPlan {
            mode: SearchMode::WebSearch,
            query: stripped,
            url: None,
            original_query: query.to_string(),
        };
    }

    if let Some(url) = &context.link_to_scrape {
        debug!(url, "link scrape requested from context");
        return SearchPlan {
            mode: SearchMode::LinkScrape,
            query: query.to_string(),
            url: Some(url.clone()),
            original_query: query.to_string(),
        };
    }

    if context.web_search {
        debug!("web search requested from context");
        return SearchPlan {
            mode: SearchMode::WebSearch,
            query: query.to_string(),
            url: None,
            original_query: query.to_string(),
        };
    }

    SearchPlan::none(query)
}
