//! Error types for Confab
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Confab operations
///
/// Covers configuration loading, provider interactions, stream relay,
/// conversation editing, import/export, and session storage.
#[derive(Error, Debug)]
pub enum ConfabError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-related errors (API calls, malformed responses, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider reported that it is temporarily overloaded
    #[error("Provider is overloaded: {0}")]
    Overloaded(String),

    /// Provider rejected the request because of rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Authentication errors (e.g., 401 Unauthorized)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Missing credentials for provider
    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    /// The response stream broke off before the provider finished
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Imported conversation JSON was rejected
    #[error("Import error: {0}")]
    Import(String),

    /// Edit targeted a message that does not exist
    #[error("Cannot edit message {index}: conversation has {len} messages")]
    InvalidEdit {
        /// Requested message index
        index: usize,
        /// Number of messages in the conversation
        len: usize,
    },

    /// No stored session matches the requested id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Owner identity could not be resolved
    #[error("Identity error: {0}")]
    Identity(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Confab operations
///
/// Uses `anyhow::Error` so callers can attach context while the concrete
/// `ConfabError` stays recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Returns true when the error means the provider is busy and the user
/// should simply retry later (overload or rate limiting).
pub fn is_retryable_provider_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ConfabError>(),
        Some(ConfabError::Overloaded(_)) | Some(ConfabError::RateLimited(_))
    )
}

/// Returns true when the error is a provider overload
pub fn is_overloaded(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ConfabError>(),
        Some(ConfabError::Overloaded(_))
    )
}
