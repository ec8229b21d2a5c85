//! Conversation import and export
//!
//! A conversation travels as a pretty printed JSON array of
//! `{"role": ..., "content": ...}` objects. Import is all or nothing: one bad
//! element rejects the whole document.

use crate::error::{ConfabError, Result};
use crate::providers::Message;
use chrono::{DateTime, TimeZone};
use serde_json::Value;

/// Serialize messages for export.
///
/// # Examples
///
/// ```
/// use confab::conversation::export_json;
/// use confab::providers::Message;
///
/// let json = export_json(&[Message::user("¿Qué tal?")]).unwrap();
/// assert!(json.contains("¿Qué tal?"));
/// ```
pub fn export_json(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string_pretty(messages)?)
}

/// File name for an export taken at `now`: `conversation_YYYYMMDD_HHMMSS.json`
pub fn export_filename<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("conversation_{}.json", now.format("%Y%m%d_%H%M%S"))
}

/// Parse and validate an exported conversation.
///
/// # Errors
///
/// Returns `ConfabError::Import` when the text is not JSON, is not an array,
/// or any element lacks a string `role` or `content`.
///
/// # Examples
///
/// ```
/// use confab::conversation::import_json;
///
/// let messages = import_json(r#"[{"role": "user", "content": "hi"}]"#).unwrap();
/// assert_eq!(messages[0].content, "hi");
/// assert!(import_json(r#"[{"role": "user"}]"#).is_err());
/// ```
pub fn import_json(text: &str) -> Result<Vec<Message>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ConfabError::Import(format!("Invalid JSON: {}", e)))?;

    let items = value
        .as_array()
        .ok_or_else(|| ConfabError::Import("Expected a JSON array of messages".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_message(index, item))
        .collect()
}

fn parse_message(index: usize, item: &Value) -> Result<Message> {
    let field = |name: &str| -> Result<String> {
        item.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ConfabError::Import(format!(
                    "Message {} is missing a string '{}' field",
                    index, name
                ))
                .into()
            })
    };

    Ok(Message {
        role: field("role")?,
        content: field("content")?,
    })
}
