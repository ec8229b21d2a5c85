//! Conversation state for an active chat session
//!
//! This module owns the in-memory message list of the session being chatted
//! in, the message index being edited, and the pending-reply flag that tells
//! the chat loop a new assistant turn is owed. Context window truncation and
//! JSON import/export live in the submodules.

pub mod transfer;
pub mod truncate;

pub use transfer::{export_filename, export_json, import_json};
pub use truncate::{estimate_tokens, plan_truncation, truncate, Truncation, TruncationPlan};

use crate::error::{ConfabError, Result};
use crate::providers::Message;
use uuid::Uuid;

/// Information about the current context window status
///
/// Reports the measured input tokens of the conversation against the
/// configured input budget.
#[derive(Debug, Clone, Copy)]
pub struct ContextInfo {
    /// Input token budget
    pub max_tokens: usize,
    /// Tokens used by the conversation
    pub used_tokens: usize,
    /// Percentage of the budget used (0.0-100.0, may exceed 100 before truncation)
    pub percentage_used: f64,
}

impl ContextInfo {
    /// Create a new ContextInfo instance
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::conversation::ContextInfo;
    ///
    /// let context = ContextInfo::new(40_000, 10_000);
    /// assert_eq!(context.percentage_used, 25.0);
    /// assert_eq!(context.display(), "10.0K tokens (25.0% of 40K)");
    /// ```
    pub fn new(max_tokens: usize, used_tokens: usize) -> Self {
        let percentage_used = if max_tokens == 0 {
            0.0
        } else {
            (used_tokens as f64 / max_tokens as f64) * 100.0
        };

        Self {
            max_tokens,
            used_tokens,
            percentage_used,
        }
    }

    /// Human readable usage line
    pub fn display(&self) -> String {
        format!(
            "{:.1}K tokens ({:.1}% of {}K)",
            self.used_tokens as f64 / 1000.0,
            self.percentage_used,
            self.max_tokens / 1000
        )
    }
}

/// In-memory state of the session being chatted in
///
/// # Examples
///
/// ```
/// use confab::conversation::Conversation;
///
/// let mut conversation = Conversation::new();
/// conversation.push_user("Hello");
/// assert!(conversation.needs_reply());
/// assert!(conversation.take_reply_request());
/// conversation.push_assistant("Hi there");
/// assert!(!conversation.needs_reply());
/// ```
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
    pending_reply: bool,
    editing: Option<usize>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Start an empty conversation with a fresh random id
    pub fn new() -> Self {
        Self::with_messages(Uuid::new_v4().to_string(), Vec::new())
    }

    /// Rebuild a conversation from stored messages
    ///
    /// A resumed conversation never owes a reply, even if it ends in a user
    /// turn; the user has to send or edit something first.
    pub fn with_messages(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
            pending_reply: false,
            editing: None,
        }
    }

    /// Session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when no message has been sent yet
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of user turns
    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    /// Append a user turn and mark a reply as owed
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
        self.pending_reply = true;
    }

    /// Append an assistant turn
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Replace the content of message `index` and drop everything after it.
    ///
    /// The rewrite is irreversible. A reply is owed afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::InvalidEdit` when `index` is out of range; the
    /// conversation is left untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::conversation::Conversation;
    ///
    /// let mut conversation = Conversation::new();
    /// conversation.push_user("first");
    /// conversation.push_assistant("reply");
    /// conversation.push_user("second");
    /// conversation.edit(0, "first, reworded").unwrap();
    /// assert_eq!(conversation.len(), 1);
    /// assert_eq!(conversation.messages()[0].content, "first, reworded");
    /// ```
    pub fn edit(&mut self, index: usize, content: impl Into<String>) -> Result<()> {
        if index >= self.messages.len() {
            return Err(ConfabError::InvalidEdit {
                index,
                len: self.messages.len(),
            }
            .into());
        }

        self.messages.truncate(index + 1);
        self.messages[index].content = content.into();
        self.pending_reply = true;
        self.editing = None;
        Ok(())
    }

    /// Mark message `index` as being edited and return it
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::InvalidEdit` when `index` is out of range.
    pub fn begin_edit(&mut self, index: usize) -> Result<&Message> {
        let len = self.messages.len();
        match self.messages.get(index) {
            Some(message) => {
                self.editing = Some(index);
                Ok(message)
            }
            None => Err(ConfabError::InvalidEdit { index, len }.into()),
        }
    }

    /// Index of the message being edited, if any
    pub fn editing(&self) -> Option<usize> {
        self.editing
    }

    /// Abandon an edit in progress
    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// True when a reply is owed and the last turn is the user's
    pub fn needs_reply(&self) -> bool {
        self.pending_reply && self.messages.last().is_some_and(|m| m.is_user())
    }

    /// Consume the pending-reply flag.
    ///
    /// Returns whether a reply should be generated now. The flag is cleared
    /// either way, so a failed request is never retried on its own.
    pub fn take_reply_request(&mut self) -> bool {
        let needed = self.needs_reply();
        self.pending_reply = false;
        needed
    }

    /// Owe a reply again for a trailing user turn, as after a failed request
    pub fn request_reply(&mut self) -> bool {
        self.pending_reply = self.messages.last().is_some_and(|m| m.is_user());
        self.pending_reply
    }

    /// Replace the whole message list under a new id, as an import does
    pub fn replace(&mut self, id: impl Into<String>, messages: Vec<Message>) {
        self.id = id.into();
        self.messages = messages;
        self.pending_reply = false;
        self.editing = None;
    }
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
///
/// # Examples
///
/// ```
/// use confab::conversation::excerpt;
///
/// assert_eq!(excerpt("short", 30), "short");
/// assert_eq!(excerpt("abcdefghij", 4), "abcd...");
/// ```
pub fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}
