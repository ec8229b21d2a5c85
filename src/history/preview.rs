//! Generated session titles
//!
//! Once a session has enough user turns, a short title is requested from the
//! completion provider and cached on the session record. A cached title is
//! never regenerated.

use crate::error::Result;
use crate::providers::{CompletionRequest, Message, Provider};
use crate::storage::{SessionStore, StoredSession};

/// User turns quoted in the title prompt
const TITLE_SOURCE_TURNS: usize = 5;
/// Output token limit for a title
const TITLE_MAX_TOKENS: u32 = 64;
/// Longest title kept, in characters
const TITLE_MAX_CHARS: usize = 40;

fn title_prompt(messages: &[Message]) -> String {
    let quoted = messages
        .iter()
        .filter(|m| m.is_user())
        .take(TITLE_SOURCE_TURNS)
        .map(|m| format!("- {}", m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Write a title for the following conversation in at most 20 characters. \
         Output only the title and nothing else.\n{}\nTitle:",
        quoted
    )
}

/// Reduce a model reply to a single clean title line
fn clean_title(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or_default();
    let line = line.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    line.chars().take(TITLE_MAX_CHARS).collect()
}

/// Ask the provider for a short title of `messages`
///
/// # Errors
///
/// Propagates provider errors.
pub async fn generate_title(
    provider: &dyn Provider,
    model: &str,
    messages: &[Message],
) -> Result<String> {
    let request = CompletionRequest::new(model, vec![Message::user(title_prompt(messages))])
        .with_temperature(0.2)
        .with_max_tokens(TITLE_MAX_TOKENS);

    let response = provider.complete(&request).await?;
    Ok(clean_title(&response.message.content))
}

/// Make sure `session` carries a cached preview once it qualifies.
///
/// Returns `true` when a title was generated and stored by this call.
/// Sessions that already have a preview, or have fewer than
/// `min_user_turns` user turns, are left alone.
///
/// # Errors
///
/// Propagates provider and storage errors; `session` is only updated after
/// the title was stored.
pub async fn ensure_preview(
    provider: &dyn Provider,
    store: &dyn SessionStore,
    model: &str,
    session: &mut StoredSession,
    min_user_turns: usize,
) -> Result<bool> {
    if session.preview.is_some() || session.user_turns() < min_user_turns {
        return Ok(false);
    }

    let title = generate_title(provider, model, &session.messages).await?;
    if title.is_empty() {
        tracing::debug!("Provider returned an empty title for {}", session.id);
        return Ok(false);
    }

    store.set_preview(&session.owner, &session.id, &title)?;
    tracing::info!("Cached preview '{}' for session {}", title, session.id);
    session.preview = Some(title);
    Ok(true)
}
