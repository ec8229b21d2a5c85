//! Provider module for Confab
//!
//! This module contains the completion provider abstraction, the SSE body
//! parser, and the Anthropic Messages API implementation.

pub mod anthropic;
pub mod base;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use base::{
    ApiErrorBody, CompletionRequest, CompletionResponse, ContentBlock, ContentDelta, EventStream,
    Message, Provider, StreamEvent, TokenCountRequest, TokenUsage, ROLE_ASSISTANT, ROLE_USER,
};

use crate::config::ProviderConfig;
use crate::error::{ConfabError, Result};

/// Create a provider instance based on configuration
///
/// # Arguments
///
/// * `config` - Provider configuration; `provider_type` selects the backend
///
/// # Errors
///
/// Returns error if the provider type is unknown or initialization fails
/// (for example when no API key is configured).
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    match config.provider_type.as_str() {
        "anthropic" => Ok(Box::new(AnthropicProvider::new(config.anthropic.clone())?)),
        other => Err(ConfabError::Provider(format!("Unknown provider type: {}", other)).into()),
    }
}
