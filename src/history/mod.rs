//! History browsing
//!
//! Turns stored sessions into listing entries: a preview string per session,
//! a display line with the update time and short id, a compact menu label,
//! and grouping into recency buckets.

pub mod buckets;
pub mod preview;

pub use buckets::TimeBucket;
pub use preview::{ensure_preview, generate_title};

use crate::config::HistoryConfig;
use crate::conversation::excerpt;
use crate::storage::types::short_id;
use crate::storage::StoredSession;
use chrono::{DateTime, Local, TimeZone, Utc};

/// One session as shown in a history listing
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Full session id
    pub id: String,
    /// Cached title, first user message excerpt, or `Session N`
    pub preview: String,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Number of messages in the session
    pub message_count: usize,
    /// True for the session currently open in the chat
    pub is_current: bool,
}

/// Preview string for a session at `position` (zero based) in a listing
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use confab::history::session_preview;
/// use confab::providers::Message;
/// use confab::storage::StoredSession;
///
/// let session = StoredSession {
///     owner: "anonymous".into(),
///     id: "abc".into(),
///     messages: vec![Message::user("What is the borrow checker really doing?")],
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
///     preview: None,
/// };
/// assert_eq!(session_preview(&session, 0, 30), "What is the borrow checker rea...");
/// ```
pub fn session_preview(session: &StoredSession, position: usize, excerpt_chars: usize) -> String {
    if let Some(preview) = session.preview.as_deref().filter(|p| !p.trim().is_empty()) {
        return preview.to_string();
    }

    match session.first_user_message() {
        Some(first) => excerpt(first, excerpt_chars),
        None => format!("Session {}", position + 1),
    }
}

impl HistoryEntry {
    /// Build an entry for `session` at `position` in a listing
    pub fn from_session(
        session: &StoredSession,
        position: usize,
        excerpt_chars: usize,
        current_id: Option<&str>,
    ) -> Self {
        Self {
            id: session.id.clone(),
            preview: session_preview(session, position, excerpt_chars),
            updated_at: session.updated_at,
            message_count: session.messages.len(),
            is_current: current_id == Some(session.id.as_str()),
        }
    }

    /// Last six characters of the id
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// `"{preview} (MM/DD HH:MM) [ID: last6]"` with the time in `tz`
    pub fn display_text_in<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        self.line(&self.preview, tz)
    }

    /// Display line with the preview cut to a menu label
    pub fn menu_text_in<Tz: TimeZone>(&self, tz: &Tz, max_chars: usize) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        self.line(&self.label(max_chars), tz)
    }

    /// Menu line in local time
    pub fn menu_text(&self, max_chars: usize) -> String {
        self.menu_text_in(&Local, max_chars)
    }

    fn line<Tz: TimeZone>(&self, preview: &str, tz: &Tz) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "{} ({}) [ID: {}]",
            preview,
            self.updated_at.with_timezone(tz).format("%m/%d %H:%M"),
            self.short_id()
        )
    }

    /// Single-line menu label cut to `max_chars` characters
    pub fn label(&self, max_chars: usize) -> String {
        excerpt(&self.preview.replace(['\r', '\n'], " "), max_chars)
    }

    /// Recency bucket relative to `now`
    pub fn bucket<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TimeBucket {
        TimeBucket::classify(&self.updated_at, now)
    }
}

/// Build listing entries for `sessions`, newest first as stored.
///
/// When `exclude` names a session it is dropped from the result; positions
/// used for `Session N` fallbacks still count it.
pub fn recent_entries(
    sessions: &[StoredSession],
    exclude: Option<&str>,
    current_id: Option<&str>,
    config: &HistoryConfig,
) -> Vec<HistoryEntry> {
    sessions
        .iter()
        .enumerate()
        .filter(|(_, session)| exclude != Some(session.id.as_str()))
        .map(|(position, session)| {
            HistoryEntry::from_session(session, position, config.excerpt_chars, current_id)
        })
        .collect()
}

/// Group entries by recency bucket, keeping their order
pub fn group_by_bucket<'a, Tz: TimeZone>(
    entries: &'a [HistoryEntry],
    now: &DateTime<Tz>,
) -> Vec<(TimeBucket, Vec<&'a HistoryEntry>)> {
    let mut groups: Vec<(TimeBucket, Vec<&'a HistoryEntry>)> = Vec::new();
    for entry in entries {
        let bucket = entry.bucket(now);
        match groups.iter_mut().find(|(b, _)| *b == bucket) {
            Some((_, members)) => members.push(entry),
            None => groups.push((bucket, vec![entry])),
        }
    }
    groups
}
