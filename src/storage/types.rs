use crate::providers::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation session as kept in the session store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Owner namespace the session belongs to
    pub owner: String,
    /// Random session identifier
    pub id: String,
    /// Full ordered message list
    pub messages: Vec<Message>,
    /// When the session was first saved
    pub created_at: DateTime<Utc>,
    /// When the session was last saved
    pub updated_at: DateTime<Utc>,
    /// Cached generated title
    pub preview: Option<String>,
}

impl StoredSession {
    /// Number of user turns in the session
    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    /// Content of the first user message, if any
    pub fn first_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
    }

    /// Last six characters of the id, as shown in history listings
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Length of the id tail shown in history listings
pub const SHORT_ID_LEN: usize = 6;

/// Last six characters of a session id
pub fn short_id(id: &str) -> &str {
    let start = id
        .char_indices()
        .rev()
        .nth(SHORT_ID_LEN - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &id[start..]
}
