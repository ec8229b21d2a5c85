//! Chat session controller
//!
//! `ChatSession` is the request-handling context of one interactive chat:
//! it owns the active [`Conversation`], the user-adjustable settings, and
//! handles to the provider and the session store. Every user action goes
//! through it and runs to completion before the next one.
//!
//! Control flow of a turn: append the user message, persist, truncate the
//! history to the input budget, stream the reply to the display, append the
//! assistant message, persist again. Storage failures never abort a turn;
//! they come back as warnings and the conversation carries on in memory.

use crate::config::{normalize_owner, Config, HistoryConfig};
use crate::conversation::{self, ContextInfo, Conversation};
use crate::error::{ConfabError, Result};
use crate::history::{self, HistoryEntry};
use crate::providers::{CompletionRequest, Provider};
use crate::relay::{relay, text_deltas};
use crate::storage::SessionStore;

use std::sync::Arc;
use uuid::Uuid;

/// User-adjustable generation settings
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    /// Active model id
    pub model: String,
    /// Model ids offered for selection
    pub models: Vec<String>,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
    /// Output token limit per reply
    pub max_output_tokens: u32,
    /// System instruction
    pub system_prompt: String,
    /// Input token budget
    pub max_input_tokens: usize,
    /// History listing and preview settings
    pub history: HistoryConfig,
}

impl ChatSettings {
    /// Settings taken from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let model = config.provider.anthropic.model.clone();
        let mut models = config.provider.anthropic.models.clone();
        if !models.contains(&model) {
            models.insert(0, model.clone());
        }

        Self {
            model,
            models,
            temperature: config.chat.temperature,
            max_output_tokens: config.chat.max_output_tokens,
            system_prompt: config.chat.system_prompt.clone(),
            max_input_tokens: config.context.max_input_tokens,
            history: config.history.clone(),
        }
    }

    fn system(&self) -> Option<&str> {
        Some(self.system_prompt.as_str()).filter(|s| !s.trim().is_empty())
    }
}

/// What happened while generating a reply
#[derive(Debug, Default)]
pub struct ReplyOutcome {
    /// Text committed as the assistant turn (may be partial)
    pub text: String,
    /// Input tokens of the request
    pub input_tokens: usize,
    /// Leading messages left out of the request
    pub dropped: usize,
    /// The truncated history started with a non-user turn
    pub misaligned: bool,
    /// The stream broke off; `text` is what arrived before
    pub interrupted: bool,
    /// Preview generated for the session by this turn
    pub preview: Option<String>,
    /// Non-fatal problems to show the user
    pub warnings: Vec<String>,
}

/// One interactive chat against a provider and a session store
pub struct ChatSession {
    provider: Arc<dyn Provider>,
    store: Arc<dyn SessionStore>,
    settings: ChatSettings,
    owner: String,
    conversation: Conversation,
    input_tokens: usize,
    preview_cached: bool,
}

impl ChatSession {
    /// Start a chat with an empty conversation
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::Identity` when `owner` is blank.
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn SessionStore>,
        settings: ChatSettings,
        owner: &str,
    ) -> Result<Self> {
        let owner = normalize_owner(owner)?;
        tracing::info!("Chat session for owner '{}' using {}", owner, provider.name());

        Ok(Self {
            provider,
            store,
            settings,
            owner,
            conversation: Conversation::new(),
            input_tokens: 0,
            preview_cached: false,
        })
    }

    /// Normalized owner namespace
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Active conversation
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Mutable access to the active conversation
    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// Current settings
    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Input tokens of the last request or measurement
    pub fn input_tokens(&self) -> usize {
        self.input_tokens
    }

    /// Input token usage against the budget
    pub fn context_info(&self) -> ContextInfo {
        ContextInfo::new(self.settings.max_input_tokens, self.input_tokens)
    }

    /// Drop the active conversation and start an empty one
    pub fn start_new(&mut self) {
        self.conversation = Conversation::new();
        self.input_tokens = 0;
        self.preview_cached = false;
        tracing::info!("Started new session {}", self.conversation.id());
    }

    /// Append a user message and persist; returns storage warnings
    pub fn submit(&mut self, text: &str) -> Vec<String> {
        self.conversation.push_user(text);
        self.persist().into_iter().collect()
    }

    /// Rewrite message `index`, drop later messages, and persist
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::InvalidEdit` for an out-of-range index; nothing
    /// changes in that case.
    pub fn edit(&mut self, index: usize, content: &str) -> Result<Vec<String>> {
        self.conversation.edit(index, content)?;
        tracing::info!(
            "Edited message {} of session {}; {} messages remain",
            index,
            self.conversation.id(),
            self.conversation.len()
        );
        Ok(self.persist().into_iter().collect())
    }

    /// True when the next step is generating a reply
    pub fn needs_reply(&self) -> bool {
        self.conversation.needs_reply()
    }

    /// Owe a reply again after a failed request; false when the last turn
    /// is not the user's
    pub fn retry(&mut self) -> bool {
        self.conversation.request_reply()
    }

    /// Generate the owed assistant reply, streaming text to `on_text`.
    ///
    /// Returns `Ok(None)` when no reply is owed. The owed flag is cleared
    /// before the request, so after a failure the user decides whether to
    /// retry.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the request fails before any text
    /// arrived. Overload and rate limiting keep their classification.
    pub async fn generate_reply<F>(&mut self, on_text: F) -> Result<Option<ReplyOutcome>>
    where
        F: FnMut(&str),
    {
        if !self.conversation.take_reply_request() {
            return Ok(None);
        }

        let truncation = conversation::truncate(
            self.provider.as_ref(),
            &self.settings.model,
            self.settings.system(),
            self.conversation.messages(),
            self.settings.max_input_tokens,
        )
        .await;
        self.input_tokens = truncation.input_tokens;

        let mut outcome = ReplyOutcome {
            input_tokens: truncation.input_tokens,
            dropped: truncation.dropped,
            misaligned: truncation.misaligned,
            ..Default::default()
        };
        if truncation.estimated_locally {
            outcome
                .warnings
                .push("Token count unavailable; using a local estimate".to_string());
        }
        if truncation.misaligned {
            outcome.warnings.push(
                "Context truncation left an assistant turn first in the request".to_string(),
            );
        }

        let mut request = CompletionRequest::new(&self.settings.model, truncation.messages)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_output_tokens);
        if let Some(system) = self.settings.system() {
            request = request.with_system(system);
        }

        let events = self.provider.stream(&request).await?;
        let relayed = relay(text_deltas(events), on_text).await;

        if let Some(error) = relayed.interruption {
            if relayed.text.is_empty() {
                return Err(error);
            }
            outcome.interrupted = true;
            outcome.warnings.push(format!(
                "Reply interrupted ({}); the partial response was saved",
                error
            ));
        }

        if relayed.text.is_empty() {
            tracing::warn!("Provider returned an empty reply");
            return Ok(Some(outcome));
        }

        self.conversation.push_assistant(relayed.text.clone());
        outcome.text = relayed.text;
        outcome.warnings.extend(self.persist());

        match self.refresh_preview().await {
            Ok(preview) => outcome.preview = preview,
            Err(e) => {
                tracing::warn!("Preview generation failed: {:#}", e);
                outcome
                    .warnings
                    .push(format!("Could not generate a session title: {}", e));
            }
        }

        Ok(Some(outcome))
    }

    /// Switch to a stored session by full id or unique prefix
    ///
    /// The loaded conversation is measured against the provider so token
    /// usage is accurate right away. Preview and token count failures come
    /// back as warnings.
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::SessionNotFound` when nothing matches, or the
    /// storage error when the read fails.
    pub async fn resume(&mut self, id: &str) -> Result<Vec<String>> {
        let mut session = self
            .store
            .load_session(&self.owner, id)?
            .ok_or_else(|| ConfabError::SessionNotFound(id.to_string()))?;

        let mut warnings = Vec::new();
        if let Err(e) = history::ensure_preview(
            self.provider.as_ref(),
            self.store.as_ref(),
            &self.settings.model,
            &mut session,
            self.settings.history.preview_min_user_turns,
        )
        .await
        {
            tracing::warn!("Preview generation failed for {}: {:#}", session.id, e);
            warnings.push(format!("Could not generate a session title: {}", e));
        }

        self.preview_cached = session.preview.is_some();
        self.conversation = Conversation::with_messages(session.id, session.messages);
        warnings.extend(self.measure_tokens().await);

        tracing::info!(
            "Resumed session {} with {} messages",
            self.conversation.id(),
            self.conversation.len()
        );
        Ok(warnings)
    }

    /// Recent sessions of this owner, newest first
    ///
    /// With `include_current == false` the active session is left out after
    /// the store applied its limit.
    pub fn recent_history(&self, include_current: bool) -> Result<Vec<HistoryEntry>> {
        let sessions = self
            .store
            .list_recent(&self.owner, self.settings.history.recent_limit)?;
        let current = Some(self.conversation.id());
        let exclude = if include_current { None } else { current };
        Ok(history::recent_entries(
            &sessions,
            exclude,
            current,
            &self.settings.history,
        ))
    }

    /// Active conversation as export JSON
    pub fn export_json(&self) -> Result<String> {
        conversation::export_json(self.conversation.messages())
    }

    /// Replace the active conversation with imported JSON under a fresh id
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::Import` when the document is rejected; the
    /// active conversation is untouched in that case.
    pub async fn import_json(&mut self, text: &str) -> Result<Vec<String>> {
        let messages = conversation::import_json(text)?;
        let count = messages.len();
        self.conversation
            .replace(Uuid::new_v4().to_string(), messages);
        self.preview_cached = false;
        tracing::info!(
            "Imported {} messages into session {}",
            count,
            self.conversation.id()
        );

        let mut warnings: Vec<String> = self.persist().into_iter().collect();
        warnings.extend(self.measure_tokens().await);
        Ok(warnings)
    }

    /// Select one of the configured models
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::Config` for a model not in the list.
    pub fn set_model(&mut self, model: &str) -> Result<()> {
        if !self.settings.models.iter().any(|m| m == model) {
            return Err(ConfabError::Config(format!(
                "Unknown model '{}'. Available: {}",
                model,
                self.settings.models.join(", ")
            ))
            .into());
        }
        self.settings.model = model.to_string();
        Ok(())
    }

    /// Set the sampling temperature
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::Config` outside 0.0-1.0.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfabError::Config(
                "temperature must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }
        self.settings.temperature = temperature;
        Ok(())
    }

    /// Replace the system instruction
    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.settings.system_prompt = prompt.trim().to_string();
    }

    /// Save the active conversation; returns a warning on failure
    fn persist(&self) -> Option<String> {
        if self.conversation.is_empty() {
            return None;
        }

        match self.store.save_session(
            &self.owner,
            self.conversation.id(),
            self.conversation.messages(),
        ) {
            Ok(_) => None,
            Err(e) => {
                tracing::error!(
                    "Failed to save session {}: {:#}",
                    self.conversation.id(),
                    e
                );
                Some(format!("Could not save the conversation: {}", e))
            }
        }
    }

    /// Measure the active conversation without truncating it
    async fn measure_tokens(&mut self) -> Option<String> {
        let measured = conversation::truncate(
            self.provider.as_ref(),
            &self.settings.model,
            self.settings.system(),
            self.conversation.messages(),
            usize::MAX,
        )
        .await;
        self.input_tokens = measured.input_tokens;
        measured
            .estimated_locally
            .then(|| "Token count unavailable; using a local estimate".to_string())
    }

    /// Generate and cache a preview once the session qualifies
    async fn refresh_preview(&mut self) -> Result<Option<String>> {
        if self.preview_cached
            || self.conversation.user_turns() < self.settings.history.preview_min_user_turns
        {
            return Ok(None);
        }

        let Some(mut session) = self
            .store
            .load_session(&self.owner, self.conversation.id())?
        else {
            return Ok(None);
        };

        let generated = history::ensure_preview(
            self.provider.as_ref(),
            self.store.as_ref(),
            &self.settings.model,
            &mut session,
            self.settings.history.preview_min_user_turns,
        )
        .await?;

        self.preview_cached = session.preview.is_some();
        Ok(if generated { session.preview } else { None })
    }
}
