//! Per-session bookkeeping.
//!
//! The orchestrator keeps no ambient mutable state; everything a session
//! accumulates across queries lives in this registry, keyed by session id.

pub mod dispatch;

pub use dispatch::{DispatchOutcome, Dispatcher, InsertMethod};

use std::collections::HashMap;
use std::sync::Mutex;

/// What a session carries between queries.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Language tag from the most recent compose-mode completion; consumed
    /// by filename suggestion.
    pub detected_language: Option<String>,
}

/// Explicit session map: session id → context.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<String, SessionContext>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the language (or lack of one) from the latest completion.
    pub fn set_detected_language(&self, session_id: &str, language: Option<String>) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.entry(session_id.to_string()).or_default().detected_language = language;
    }

    /// Take the detected language, resetting it. One suggestion consumes it.
    pub fn take_detected_language(&self, session_id: &str) -> Option<String> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.get_mut(session_id)
            .and_then(|ctx| ctx.detected_language.take())
    }

    /// Current context snapshot for a session.
    pub fn context(&self, session_id: &str) -> SessionContext {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.get(session_id).cloned().unwrap_or_default()
    }

    /// Drop a session's bookkeeping.
    pub fn clear(&self, session_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(session_id);
    }
}
