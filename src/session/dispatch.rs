//! Control-prefix front door.
//!
//! The host multiplexes session control and response-insertion directives
//! onto the same plain-string channel as queries:
//!
//! - `!clear_session:<id>`: wipe a session's history
//! - `!paste:<text>` / `!type:<text>`: insertion directives, returned to
//!   the caller (the OS-level paste/type is the host's job)
//! - `!session:<id>|<query>`: run the query under a specific session
//!
//! Everything else is a query. Before the pipeline runs, the response cache
//! gets a chance to answer.

use crate::db::{ResponseCache, DEFAULT_CACHE_MAX_AGE_SECS};
use crate::pipeline::{Orchestrator, PipelineOutput, QueryOptions};
use std::sync::Arc;
use tracing::{debug, info};

/// How the caller should insert text into the user's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMethod {
    /// Put the text on the clipboard and paste it.
    Paste,
    /// Type the text keystroke by keystroke.
    Type,
}

/// A raw input, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ClearSession(String),
    Insert(InsertMethod, String),
    Query {
        session_id: Option<String>,
        query: String,
    },
}

/// Decode a raw input string into a command.
pub fn parse_command(raw: &str) -> Command {
    if let Some(rest) = raw.strip_prefix("!clear_session:") {
        return Command::ClearSession(rest.to_string());
    }
    if let Some(text) = raw.strip_prefix("!paste:") {
        return Command::Insert(InsertMethod::Paste, text.to_string());
    }
    if let Some(text) = raw.strip_prefix("!type:") {
        return Command::Insert(InsertMethod::Type, text.to_string());
    }
    if let Some(rest) = raw.strip_prefix("!session:") {
        if let Some((session_id, query)) = rest.split_once('|') {
            return Command::Query {
                session_id: Some(session_id.to_string()),
                query: query.to_string(),
            };
        }
    }
    Command::Query {
        session_id: None,
        query: raw.to_string(),
    }
}

/// Result of dispatching one raw input.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A control command was handled; nothing to display.
    Handled,
    /// The caller should insert this text using the given method.
    Insert(InsertMethod, String),
    /// A pipeline (or cached) response.
    Response(PipelineOutput),
}

/// Front door combining command parsing, the response cache, and the
/// orchestrator.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    cache: Option<ResponseCache>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            cache: None,
        }
    }

    /// Attach a response cache.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Process one raw input. `opts.session_id` is a default; a
    /// `!session:` prefix overrides it.
    pub async fn process(&self, raw: &str, mut opts: QueryOptions) -> DispatchOutcome {
        let (session_id, query) = match parse_command(raw) {
            Command::ClearSession(session_id) => {
                info!(session_id, "clearing session");
                self.orchestrator.clear_history(&session_id);
                return DispatchOutcome::Handled;
            }
            Command::Insert(method, text) => {
                debug!(?method, "insertion directive");
                return DispatchOutcome::Insert(method, text);
            }
            Command::Query { session_id, query } => (
                session_id.unwrap_or_else(|| {
                    if opts.session_id.is_empty() {
                        "default".to_string()
                    } else {
                        opts.session_id.clone()
                    }
                }),
                query,
            ),
        };
        opts.session_id = session_id.clone();

        let cache_key = ResponseCache::cache_key(
            opts.model.as_deref(),
            &session_id,
            &query,
            opts.image_data.is_some(),
        );

        if self.orchestrator.config().use_cache {
            if let Some(cache) = &self.cache {
                if let Some(response) = cache.get(&cache_key, DEFAULT_CACHE_MAX_AGE_SECS) {
                    info!("serving response from cache");
                    if let Some(sender) = opts.stream.as_ref() {
                        sender.delta(response.clone());
                        sender.complete();
                    }
                    return DispatchOutcome::Response(PipelineOutput {
                        response,
                        detected_language: None,
                    });
                }
            }
        }

        let output = self.orchestrator.respond(&query, opts).await;

        if self.orchestrator.config().use_cache && !output.response.is_empty() {
            if let Some(cache) = &self.cache {
                cache.put(&cache_key, &output.response);
            }
        }

        DispatchOutcome::Response(output)
    }
}
