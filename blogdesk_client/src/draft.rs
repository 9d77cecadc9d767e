//! Persistence for the single in-progress new-post draft.
//!
//! Exactly one draft exists at a time; every save replaces it. Reading never
//! fails: a missing or unreadable draft is reported as `None`.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key the draft lives under in the key-value table.
pub const DRAFT_KEY: &str = "blog_draft";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub last_saved: DateTime<Utc>,
}

impl Draft {
    /// Equality that ignores `last_saved`.
    pub fn same_content(&self, other: &Draft) -> bool {
        self.title == other.title
            && self.content == other.content
            && self.category_id == other.category_id
            && self.tags == other.tags
    }
}

#[derive(Debug, Error)]
pub enum DraftStoreError {
    #[error("failed to serialize draft: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("draft of {size} bytes exceeds the {quota} byte storage quota")]
    QuotaExceeded { size: usize, quota: usize },
    #[error("draft storage failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create draft directory: {0}")]
    Io(#[from] std::io::Error),
}

pub trait DraftStore: Send + Sync {
    fn save(&self, draft: &Draft) -> Result<(), DraftStoreError>;
    fn load(&self) -> Option<Draft>;
    fn clear(&self) -> Result<(), DraftStoreError>;
}

fn decode(raw: &str) -> Option<Draft> {
    match serde_json::from_str(raw) {
        Ok(draft) => Some(draft),
        Err(err) => {
            tracing::warn!(error = %err, "stored draft is unreadable, ignoring it");
            None
        }
    }
}

/// In-process store holding the serialized draft, with an optional byte
/// quota that mimics browser storage limits.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    raw: Mutex<Option<String>>,
    quota: Option<usize>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            raw: Mutex::new(None),
            quota: Some(quota),
        }
    }

    /// Seeds the store with an arbitrary stored value.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
            quota: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl DraftStore for MemoryDraftStore {
    fn save(&self, draft: &Draft) -> Result<(), DraftStoreError> {
        let encoded = serde_json::to_string(draft)?;
        if let Some(quota) = self.quota {
            if encoded.len() > quota {
                return Err(DraftStoreError::QuotaExceeded {
                    size: encoded.len(),
                    quota,
                });
            }
        }
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = Some(encoded);
        Ok(())
    }

    fn load(&self) -> Option<Draft> {
        let raw = self.raw.lock().unwrap_or_else(PoisonError::into_inner);
        raw.as_deref().and_then(decode)
    }

    fn clear(&self) -> Result<(), DraftStoreError> {
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Draft store backed by a `kv_store` table in a local SQLite file.
pub struct SqliteDraftStore {
    conn: Mutex<Connection>,
}

impl SqliteDraftStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DraftStoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, DraftStoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DraftStoreError> {
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"#,
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_raw(&self) -> Result<Option<String>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![DRAFT_KEY],
            |row| row.get(0),
        )
        .optional()
    }

    #[cfg(test)]
    fn write_raw(&self, raw: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![DRAFT_KEY, raw],
        )?;
        Ok(())
    }
}

impl DraftStore for SqliteDraftStore {
    fn save(&self, draft: &Draft) -> Result<(), DraftStoreError> {
        let encoded = serde_json::to_string(draft)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![DRAFT_KEY, encoded],
        )?;
        Ok(())
    }

    fn load(&self) -> Option<Draft> {
        match self.read_raw() {
            Ok(raw) => raw.as_deref().and_then(decode),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read stored draft");
                None
            }
        }
    }

    fn clear(&self) -> Result<(), DraftStoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![DRAFT_KEY])?;
        Ok(())
    }
}
