//! Anthropic provider implementation for Confab
//!
//! This module implements the Provider trait for the Anthropic Messages API:
//! single-shot completions, SSE streaming completions, and input token
//! counting. Provider failures are classified so callers can tell an
//! overloaded service apart from a broken request.

use crate::config::AnthropicConfig;
use crate::error::{ConfabError, Result};
use crate::providers::sse::data_events;
use crate::providers::{
    ApiErrorBody, CompletionRequest, CompletionResponse, EventStream, Message, Provider,
    StreamEvent, TokenCountRequest, TokenUsage,
};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Non-standard status the API uses for overload
const STATUS_OVERLOADED: u16 = 529;

/// Anthropic Messages API provider
///
/// # Examples
///
/// ```no_run
/// use confab::config::AnthropicConfig;
/// use confab::providers::{AnthropicProvider, CompletionRequest, Message, Provider};
///
/// # async fn example() -> confab::error::Result<()> {
/// let config = AnthropicConfig {
///     api_key: Some("sk-ant-...".to_string()),
///     ..Default::default()
/// };
/// let provider = AnthropicProvider::new(config)?;
/// let request = CompletionRequest::new(provider.model(), vec![Message::user("Hello!")]);
/// let response = provider.complete(&request).await?;
/// println!("{}", response.message.content);
/// # Ok(())
/// # }
/// ```
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
    api_key: String,
}

/// Request body for `/v1/messages`
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Request body for `/v1/messages/count_tokens`
#[derive(Debug, Serialize)]
struct CountTokensRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: usize,
}

/// Content block in a non-streaming response
#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

/// Error envelope `{"type":"error","error":{...}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider instance
    ///
    /// The API key comes from the configuration or, failing that, the
    /// `ANTHROPIC_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfabError::MissingCredentials` when no API key is available,
    /// or a provider error if the HTTP client cannot be built.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfabError::MissingCredentials("anthropic".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("confab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfabError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Anthropic provider: api_base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Get the configured default model
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.endpoint(path);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Anthropic request failed: {}", e);
                ConfabError::Provider(format!("Failed to reach Anthropic API: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::error!("Anthropic returned error {}: {}", status, body_text);
            return Err(classify_api_error(Some(status), &body_text).into());
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = MessagesRequest {
            model: &request.model,
            messages: &request.messages,
            system: request.system.as_deref(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let response: MessagesResponse = self
            .post("messages", &body)
            .await?
            .json()
            .await
            .map_err(|e| {
                ConfabError::Provider(format!("Failed to parse Anthropic response: {}", e))
            })?;

        let text = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        let message = Message::assistant(text);
        Ok(match response.usage {
            Some(usage) => CompletionResponse::with_usage(message, usage),
            None => CompletionResponse::new(message),
        })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream> {
        let body = MessagesRequest {
            model: &request.model,
            messages: &request.messages,
            system: request.system.as_deref(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        let response = self.post("messages", &body).await?;
        tracing::debug!("Streaming reply from model {}", request.model);

        let events = data_events(Box::pin(response.bytes_stream())).filter_map(|item| async move {
            match item {
                Ok(data) => match serde_json::from_str::<StreamEvent>(&data) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        tracing::warn!("Skipping unparseable stream event: {} ({})", data, e);
                        None
                    }
                },
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(events))
    }

    async fn count_tokens(&self, request: &TokenCountRequest) -> Result<usize> {
        let body = CountTokensRequest {
            model: &request.model,
            messages: &request.messages,
            system: request.system.as_deref(),
        };

        let response: CountTokensResponse = self
            .post("messages/count_tokens", &body)
            .await?
            .json()
            .await
            .map_err(|e| {
                ConfabError::Provider(format!("Failed to parse token count response: {}", e))
            })?;

        tracing::debug!("Counted {} input tokens", response.input_tokens);
        Ok(response.input_tokens)
    }
}

/// Map a provider failure report onto the error taxonomy.
///
/// `status` is `None` for errors reported inside an event stream.
///
/// # Examples
///
/// ```
/// use confab::error::ConfabError;
/// use confab::providers::anthropic::classify_api_error;
///
/// let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
/// assert!(matches!(classify_api_error(None, body), ConfabError::Overloaded(_)));
/// ```
pub fn classify_api_error(status: Option<StatusCode>, body: &str) -> ConfabError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_else(|_| ApiErrorBody {
            kind: String::new(),
            message: body.trim().to_string(),
        });
    classify_error_body(status, &detail)
}

/// Classify an already-parsed error body
pub fn classify_error_body(status: Option<StatusCode>, detail: &ApiErrorBody) -> ConfabError {
    let code = status.map(|s| s.as_u16());
    let message = if detail.message.is_empty() {
        detail.kind.clone()
    } else {
        detail.message.clone()
    };

    if detail.kind == "overloaded_error" || code == Some(STATUS_OVERLOADED) {
        return ConfabError::Overloaded(message);
    }
    if detail.kind == "rate_limit_error" || code == Some(429) {
        return ConfabError::RateLimited(message);
    }
    if detail.kind == "authentication_error"
        || detail.kind == "permission_error"
        || matches!(code, Some(401) | Some(403))
    {
        return ConfabError::Authentication(message);
    }

    match code {
        Some(code) => ConfabError::Provider(format!("API error {}: {}", code, message)),
        None => ConfabError::Provider(message),
    }
}
