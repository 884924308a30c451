//! Response cache for repeated queries.
//!
//! Keys combine model, session, and query text so a session's follow-ups
//! never collide with another session's. Cache trouble is never fatal:
//! read and write failures degrade to a miss with a warning.

use crate::db::Database;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum age of a cache entry, in seconds (24 hours).
pub const DEFAULT_CACHE_MAX_AGE_SECS: i64 = 86_400;

/// SQLite-backed query/response cache.
pub struct ResponseCache {
    db: Arc<Database>,
}

impl ResponseCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Build the cache key for a query. Image payloads only contribute
    /// their presence, not their bytes.
    pub fn cache_key(
        model: Option<&str>,
        session_id: &str,
        query: &str,
        has_image: bool,
    ) -> String {
        let base = match model {
            Some(model) => format!("{model}:{session_id}:{query}"),
            None => format!("{session_id}:{query}"),
        };
        if has_image {
            format!("image:{base}")
        } else {
            base
        }
    }

    /// Fetch a cached response no older than `max_age_secs`.
    pub fn get(&self, key: &str, max_age_secs: i64) -> Option<String> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT response FROM response_cache
             WHERE cache_key = ? AND (unixepoch() - created_at) <= ?",
            rusqlite::params![key, max_age_secs],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(response) => {
                debug!("cache hit");
                Some(response)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                warn!(error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a response, replacing any previous entry for the key.
    pub fn put(&self, key: &str, response: &str) {
        let result = self.db.conn().execute(
            "INSERT INTO response_cache (cache_key, response, created_at)
             VALUES (?, ?, unixepoch())
             ON CONFLICT(cache_key) DO UPDATE
                 SET response = excluded.response, created_at = excluded.created_at",
            [key, response],
        );
        if let Err(e) = result {
            warn!(error = %e, "cache write failed");
        }
    }

    /// Drop every cached response.
    pub fn clear(&self) {
        if let Err(e) = self.db.conn().execute("DELETE FROM response_cache", []) {
            warn!(error = %e, "cache clear failed");
        }
    }
}
