//! Per-session chat transcript persistence.
//!
//! The orchestrator reads a bounded suffix of the transcript before a query
//! and appends the final user/assistant pair after a terminal completion.
//! Rows store turns as tagged JSON; rows written by older builds used a
//! bare `{"type": "human"|"ai", "content": ...}` shape and are coerced on
//! read.

use crate::db::Database;
use crate::model::{Turn, UserContent};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

/// Transcript store errors.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The history collaborator: ordered turns per session id.
pub trait TranscriptStore: Send + Sync {
    /// All turns for a session, oldest first.
    fn get(&self, session_id: &str) -> Result<Vec<Turn>, TranscriptError>;

    /// Append one turn.
    fn append(&self, session_id: &str, turn: &Turn) -> Result<(), TranscriptError>;

    /// Delete the session's transcript.
    fn clear(&self, session_id: &str) -> Result<(), TranscriptError>;
}

/// Decode a stored row into a typed turn.
///
/// Tagged rows deserialize directly; legacy rows are coerced by their
/// `type` tag. Anything unrecognizable is dropped with a warning rather
/// than failing the whole read.
pub fn coerce_turn(value: JsonValue) -> Option<Turn> {
    if let Ok(turn) = serde_json::from_value::<Turn>(value.clone()) {
        return Some(turn);
    }

    let kind = value.get("type")?.as_str()?;
    let content = value.get("content")?;
    match kind {
        "human" => Some(Turn::User {
            content: serde_json::from_value::<UserContent>(content.clone()).ok()?,
        }),
        "ai" => Some(Turn::assistant(content.as_str()?)),
        "system" => Some(Turn::system(content.as_str()?)),
        "tool" => Some(Turn::tool_result(
            content.as_str()?,
            value
                .get("tool_call_id")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
        )),
        other => {
            warn!(kind = other, "dropping transcript row with unknown type tag");
            None
        }
    }
}

/// SQLite-backed transcript store.
pub struct SqliteTranscripts {
    db: Arc<Database>,
}

impl SqliteTranscripts {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl TranscriptStore for SqliteTranscripts {
    fn get(&self, session_id: &str) -> Result<Vec<Turn>, TranscriptError> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT turn FROM transcripts WHERE session_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map([session_id], |row| row.get::<_, String>(0))?;

        let mut turns = Vec::new();
        for row in rows {
            let raw = row?;
            match serde_json::from_str::<JsonValue>(&raw) {
                Ok(value) => {
                    if let Some(turn) = coerce_turn(value) {
                        turns.push(turn);
                    }
                }
                Err(e) => warn!(error = %e, "skipping unparseable transcript row"),
            }
        }
        Ok(turns)
    }

    fn append(&self, session_id: &str, turn: &Turn) -> Result<(), TranscriptError> {
        let payload = serde_json::to_string(turn)?;
        self.db.conn().execute(
            "INSERT INTO transcripts (session_id, turn) VALUES (?, ?)",
            [session_id, payload.as_str()],
        )?;
        Ok(())
    }

    fn clear(&self, session_id: &str) -> Result<(), TranscriptError> {
        self.db
            .conn()
            .execute("DELETE FROM transcripts WHERE session_id = ?", [session_id])?;
        Ok(())
    }
}

/// In-memory transcript store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryTranscripts {
    sessions: Mutex<HashMap<String, Vec<Turn>>>,
}

impl MemoryTranscripts {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptStore for MemoryTranscripts {
    fn get(&self, session_id: &str) -> Result<Vec<Turn>, TranscriptError> {
        let sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    fn append(&self, session_id: &str, turn: &Turn) -> Result<(), TranscriptError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    fn clear(&self, session_id: &str) -> Result<(), TranscriptError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions.remove(session_id);
        Ok(())
    }
}
