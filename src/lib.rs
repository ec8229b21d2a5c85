//! Confab - terminal chat client library
//!
//! This library provides the core of a chat client that talks to a hosted
//! language model, streams replies, and keeps every conversation in a local
//! session store.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: The per-chat controller tying conversation, provider and store together
//! - `conversation`: Message list, edits, context truncation, JSON import/export
//! - `relay`: Streaming reply relay that survives interrupted streams
//! - `history`: Session previews, listing entries and recency buckets
//! - `storage`: Session persistence keyed by owner and session id
//! - `providers`: Model provider abstraction and the Anthropic Messages API client
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use confab::{ChatSession, Config};
//! use confab::chat::ChatSettings;
//! use confab::providers::create_provider;
//! use confab::storage::SqliteStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let provider = Arc::from(create_provider(&config.provider)?);
//!     let store = Arc::new(SqliteStorage::from_config(&config.storage)?);
//!     let mut chat = ChatSession::new(provider, store, ChatSettings::from_config(&config), "me")?;
//!
//!     chat.submit("Hello!");
//!     chat.generate_reply(|text| print!("{}", text)).await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod history;
pub mod providers;
pub mod relay;
pub mod storage;

// Re-export commonly used types
pub use chat::ChatSession;
pub use config::Config;
pub use error::{ConfabError, Result};

#[cfg(test)]
pub mod test_utils;
