use crate::config::StorageConfig;
use crate::error::{ConfabError, Result};
use crate::providers::Message;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

pub mod types;
pub use types::StoredSession;

/// Session store keyed by `owner/id`
///
/// Writes are merge-writes: saving messages never touches a cached preview,
/// and the last writer wins on the message list.
pub trait SessionStore: Send + Sync {
    /// Upsert the full message list; returns the store-assigned update time
    fn save_session(&self, owner: &str, id: &str, messages: &[Message]) -> Result<DateTime<Utc>>;

    /// Fetch one session by full id, or by an id prefix or suffix that
    /// matches exactly one session
    fn load_session(&self, owner: &str, id: &str) -> Result<Option<StoredSession>>;

    /// Cache a generated preview title on an existing session
    fn set_preview(&self, owner: &str, id: &str, preview: &str) -> Result<()>;

    /// The `limit` most recently updated sessions, newest first
    fn list_recent(&self, owner: &str, limit: usize) -> Result<Vec<StoredSession>>;
}

/// SQLite-backed session store
pub struct SqliteStorage {
    db_path: PathBuf,
}

const SESSION_COLUMNS: &str = "owner, id, messages, created_at, updated_at, preview";

fn storage_error(e: anyhow::Error) -> ConfabError {
    ConfabError::Storage(format!("{:#}", e))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    // Fixed width so text ordering matches time ordering.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", value))
        .map_err(|e| storage_error(e).into())
}

/// Escape LIKE wildcards so an id fragment only matches literally.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn like_prefix(prefix: &str) -> String {
    format!("{}%", escape_like(prefix))
}

fn like_suffix(suffix: &str) -> String {
    format!("%{}", escape_like(suffix))
}

type RawSession = (String, String, String, String, String, Option<String>);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawSession> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_session(raw: RawSession) -> Result<StoredSession> {
    let (owner, id, messages_json, created_at, updated_at, preview) = raw;
    let messages: Vec<Message> = serde_json::from_str(&messages_json)
        .with_context(|| format!("Failed to deserialize messages of session {}", id))
        .map_err(storage_error)?;

    Ok(StoredSession {
        owner,
        id,
        messages,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        preview,
    })
}

impl SqliteStorage {
    /// Create a new storage instance
    ///
    /// Uses `CONFAB_HISTORY_DB` when set, otherwise `history.db` in the
    /// platform data directory.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("CONFAB_HISTORY_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("dev", "confab", "confab")
            .ok_or_else(|| ConfabError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("history.db"))
    }

    /// Create a storage instance for the configured location
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Self::new_with_path(path),
            None => Self::new(),
        }
    }

    /// Create a new storage instance that uses the specified database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
    /// assert!(storage.db_path().ends_with("history.db"));
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(storage_error)?;
        }

        let storage = Self { db_path };
        storage.init()?;
        tracing::debug!("Session store at {}", storage.db_path.display());
        Ok(storage)
    }

    /// Location of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open database {}", self.db_path.display()))
            .map_err(|e| storage_error(e).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                owner TEXT NOT NULL,
                id TEXT NOT NULL,
                messages JSON NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                preview TEXT,
                PRIMARY KEY (owner, id)
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(storage_error)?;

        Ok(())
    }

    /// Upsert a session with an explicit update time
    ///
    /// `created_at` is set on first insert only; `preview` is never touched.
    pub fn save_session_at(
        &self,
        owner: &str,
        id: &str,
        messages: &[Message],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connect()?;
        let messages_json = serde_json::to_string(messages)
            .context("Failed to serialize messages")
            .map_err(storage_error)?;
        let now = timestamp(&at);

        conn.execute(
            "INSERT INTO sessions (owner, id, messages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(owner, id) DO UPDATE SET
                messages = excluded.messages,
                updated_at = excluded.updated_at",
            params![owner, id, messages_json, now],
        )
        .with_context(|| format!("Failed to save session {}", id))
        .map_err(storage_error)?;

        tracing::debug!(
            "Saved session {}/{} with {} messages",
            owner,
            id,
            messages.len()
        );
        Ok(())
    }
}

impl SessionStore for SqliteStorage {
    fn save_session(&self, owner: &str, id: &str, messages: &[Message]) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        self.save_session_at(owner, id, messages, now)?;
        Ok(now)
    }

    fn load_session(&self, owner: &str, id: &str) -> Result<Option<StoredSession>> {
        let conn = self.connect()?;

        let exact = conn
            .query_row(
                &format!(
                    "SELECT {} FROM sessions WHERE owner = ?1 AND id = ?2",
                    SESSION_COLUMNS
                ),
                params![owner, id],
                read_raw,
            )
            .optional()
            .context("Failed to query session")
            .map_err(storage_error)?;

        if let Some(raw) = exact {
            return into_session(raw).map(Some);
        }

        // Listings show the id tail, so both ends are accepted. Ambiguous
        // fragments resolve to nothing.
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sessions WHERE owner = ?1
                 AND (id LIKE ?2 ESCAPE '\\' OR id LIKE ?3 ESCAPE '\\') LIMIT 2",
                SESSION_COLUMNS
            ))
            .context("Failed to prepare statement")
            .map_err(storage_error)?;

        let mut matches = stmt
            .query_map(params![owner, like_prefix(id), like_suffix(id)], read_raw)
            .context("Failed to query session id fragment")
            .map_err(storage_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read session row")
            .map_err(storage_error)?;

        match matches.len() {
            1 => into_session(matches.remove(0)).map(Some),
            0 => Ok(None),
            _ => {
                tracing::warn!("Session id '{}' is ambiguous", id);
                Ok(None)
            }
        }
    }

    fn set_preview(&self, owner: &str, id: &str, preview: &str) -> Result<()> {
        let conn = self.connect()?;
        let updated = conn
            .execute(
                "UPDATE sessions SET preview = ?3 WHERE owner = ?1 AND id = ?2",
                params![owner, id, preview],
            )
            .context("Failed to store preview")
            .map_err(storage_error)?;

        if updated == 0 {
            return Err(ConfabError::SessionNotFound(id.to_string()).into());
        }
        Ok(())
    }

    fn list_recent(&self, owner: &str, limit: usize) -> Result<Vec<StoredSession>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sessions WHERE owner = ?1
                 ORDER BY updated_at DESC, id ASC LIMIT ?2",
                SESSION_COLUMNS
            ))
            .context("Failed to prepare statement")
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(params![owner, limit as i64], read_raw)
            .context("Failed to query sessions")
            .map_err(storage_error)?;

        let mut sessions = Vec::new();
        for row in rows {
            match row.map_err(anyhow::Error::from).and_then(into_session) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping unreadable session: {:#}", e),
            }
        }
        Ok(sessions)
    }
}
