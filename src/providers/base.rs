//! Base provider trait and common types for Confab
//!
//! This module defines the Provider trait that completion backends implement,
//! along with the message type, request structures, and stream event types
//! shared by the conversation, relay, and history modules.

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Role tag for user turns
pub const ROLE_USER: &str = "user";
/// Role tag for assistant turns
pub const ROLE_ASSISTANT: &str = "assistant";

/// Message structure for conversation
///
/// One turn of a conversation. Serializes to exactly `{role, content}`,
/// which is also the import/export format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user or assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::providers::Message;
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_USER.to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::providers::Message;
    ///
    /// let msg = Message::assistant("Hello, user!");
    /// assert_eq!(msg.role, "assistant");
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_ASSISTANT.to_string(),
            content: content.into(),
        }
    }

    /// Returns true for user turns
    pub fn is_user(&self) -> bool {
        self.role == ROLE_USER
    }

    /// Returns true for assistant turns
    pub fn is_assistant(&self) -> bool {
        self.role == ROLE_ASSISTANT
    }
}

/// Parameters for a completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Ordered conversation turns
    pub messages: Vec<Message>,
    /// System instruction sent outside the message list
    pub system: Option<String>,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
    /// Maximum number of output tokens
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Create a request with default sampling parameters
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::providers::{CompletionRequest, Message};
    ///
    /// let request = CompletionRequest::new("claude-sonnet-4-20250514", vec![Message::user("hi")])
    ///     .with_system("Be concise.")
    ///     .with_max_tokens(256);
    /// assert_eq!(request.max_tokens, 256);
    /// assert_eq!(request.system.as_deref(), Some("Be concise."));
    /// ```
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    /// Set the system instruction; blank instructions are dropped
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system = if system.trim().is_empty() {
            None
        } else {
            Some(system)
        };
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the output token limit
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Parameters for a token counting call
#[derive(Debug, Clone, PartialEq)]
pub struct TokenCountRequest {
    /// Model identifier
    pub model: String,
    /// System instruction
    pub system: Option<String>,
    /// Ordered conversation turns
    pub messages: Vec<Message>,
}

/// Token usage information from a completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub input_tokens: usize,
    /// Number of tokens in the completion
    pub output_tokens: usize,
}

/// Non-streaming completion result
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The response message from the model
    pub message: Message,
    /// Optional token usage information
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Create a new CompletionResponse
    ///
    /// # Examples
    ///
    /// ```
    /// use confab::providers::{CompletionResponse, Message};
    ///
    /// let response = CompletionResponse::new(Message::assistant("Hello!"));
    /// assert_eq!(response.message.role, "assistant");
    /// assert!(response.usage.is_none());
    /// ```
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    /// Create a new CompletionResponse with token usage
    pub fn with_usage(message: Message, usage: TokenUsage) -> Self {
        Self {
            message,
            usage: Some(usage),
        }
    }
}

/// Content block announced by a `content_block_start` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Block kind (`text`, `tool_use`, ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Initial text for text blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Incremental payload of a `content_block_delta` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDelta {
    /// Delta kind (`text_delta`, `input_json_delta`, ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Text fragment for text deltas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Structured error body reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Error kind, e.g. `overloaded_error`
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
}

/// Server-sent events of a streaming completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Response header carrying model and usage metadata
    MessageStart {
        #[serde(default)]
        message: serde_json::Value,
    },
    /// A new content block begins
    ContentBlockStart {
        #[serde(default)]
        index: usize,
        content_block: ContentBlock,
    },
    /// Incremental content for an open block
    ContentBlockDelta {
        #[serde(default)]
        index: usize,
        delta: ContentDelta,
    },
    /// A content block is complete
    ContentBlockStop {
        #[serde(default)]
        index: usize,
    },
    /// Stop reason and output usage
    MessageDelta {
        #[serde(default)]
        delta: serde_json::Value,
        #[serde(default)]
        usage: Option<serde_json::Value>,
    },
    /// End of the response
    MessageStop,
    /// Keep-alive
    Ping,
    /// Provider failure reported inside the stream
    Error { error: ApiErrorBody },
    /// Any event type this client does not know about
    #[serde(other)]
    Unknown,
}

/// Lazy, single-pass sequence of provider events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Provider trait for completion backends
///
/// # Examples
///
/// ```no_run
/// use confab::providers::{
///     CompletionRequest, CompletionResponse, EventStream, Message, Provider, TokenCountRequest,
/// };
/// use confab::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
///         let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
///         Ok(CompletionResponse::new(Message::assistant(last)))
///     }
///
///     async fn stream(&self, _request: &CompletionRequest) -> Result<EventStream> {
///         Ok(Box::pin(futures::stream::empty()))
///     }
///
///     async fn count_tokens(&self, request: &TokenCountRequest) -> Result<usize> {
///         Ok(request.messages.len())
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Completes a conversation and returns the full assistant message
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::Overloaded`, `RateLimited`, `Authentication`, or
    /// `Provider` depending on the provider's failure report.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Starts a streaming completion and returns its event sequence
    ///
    /// Failures before the first event are returned directly; failures after
    /// that arrive as `Err` items inside the stream.
    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream>;

    /// Estimates the number of input tokens the request would consume
    async fn count_tokens(&self, request: &TokenCountRequest) -> Result<usize>;
}
