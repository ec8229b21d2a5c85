//! Integration tests for chat sessions
//!
//! Drives `ChatSession` against a mock Messages API and a real SQLite store:
//! streaming turns, persistence, previews, truncation, resume, and failure
//! handling.

use chrono::{DateTime, Utc};
use confab::chat::{ChatSession, ChatSettings};
use confab::config::Config;
use confab::error::{is_overloaded, ConfabError, Result};
use confab::providers::{AnthropicProvider, Message};
use confab::storage::{SessionStore, SqliteStorage, StoredSession};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

fn settings(server: &MockServer) -> ChatSettings {
    let mut config = Config::default();
    config.provider.anthropic = common::mock_config(server);
    ChatSettings::from_config(&config)
}

fn chat_for(
    server: &MockServer,
    settings: ChatSettings,
    owner: &str,
) -> (ChatSession, Arc<SqliteStorage>, TempDir) {
    let (storage, dir) = common::create_temp_storage();
    let storage = Arc::new(storage);
    let provider = AnthropicProvider::new(common::mock_config(server)).unwrap();
    let chat = ChatSession::new(Arc::new(provider), storage.clone(), settings, owner).unwrap();
    (chat, storage, dir)
}

/// Bodies of the streaming requests the server received
async fn streamed_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v1/messages")
        .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
        .filter(|body| body["stream"] == json!(true))
        .collect()
}

#[tokio::test]
async fn test_conversation_round_trip_with_preview_and_resume() {
    let server = MockServer::start().await;
    common::mount_token_count(&server, 120).await;
    common::mount_stream_reply(&server, &["Borrowing ", "is ", "fine."]).await;
    common::mount_completion(&server, "\"Borrow checker chat\"").await;

    let (mut chat, storage, _dir) = chat_for(&server, settings(&server), "Ada");

    chat.submit("Why does the borrow checker complain?");
    let mut streamed = String::new();
    let first = chat
        .generate_reply(|t| streamed.push_str(t))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(streamed, "Borrowing is fine.");
    assert_eq!(first.input_tokens, 120);
    assert!(first.preview.is_none());

    chat.submit("And with two mutable references?");
    let second = chat.generate_reply(|_| {}).await.unwrap().unwrap();
    assert_eq!(second.preview.as_deref(), Some("Borrow checker chat"));
    assert!(second.warnings.is_empty());

    let id = chat.conversation().id().to_string();
    let stored = storage.load_session("ada", &id).unwrap().unwrap();
    assert_eq!(stored.messages.len(), 4);
    assert_eq!(stored.preview.as_deref(), Some("Borrow checker chat"));

    // A second client on the same store picks the session up by prefix.
    let provider = AnthropicProvider::new(common::mock_config(&server)).unwrap();
    let mut other = ChatSession::new(
        Arc::new(provider),
        storage.clone(),
        settings(&server),
        "ada",
    )
    .unwrap();
    let listed = other.recent_history(false).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].preview, "Borrow checker chat");

    other.resume(&id[..10]).await.unwrap();
    assert_eq!(other.conversation().id(), id);
    assert_eq!(other.conversation().len(), 4);
    assert_eq!(other.input_tokens(), 120);

    // The short id from the listing also resumes the session.
    other.start_new();
    other.resume(listed[0].short_id()).await.unwrap();
    assert_eq!(other.conversation().id(), id);
}

#[tokio::test]
async fn test_long_history_is_truncated_to_budget() {
    let server = MockServer::start().await;
    common::mount_token_count(&server, 3000).await;
    common::mount_stream_reply(&server, &["short answer"]).await;
    common::mount_completion(&server, "Title").await;

    let mut settings = settings(&server);
    settings.max_input_tokens = 750;
    let (mut chat, _storage, _dir) = chat_for(&server, settings, "ada");

    let history: Vec<Value> = (0..6)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            json!({"role": role, "content": format!("turn {}", i)})
        })
        .collect();
    chat.import_json(&Value::Array(history).to_string())
        .await
        .unwrap();

    chat.submit("turn 6");
    let outcome = chat.generate_reply(|_| {}).await.unwrap().unwrap();

    // 7 messages are 3 pairs; a quarter of the budget keeps one pair.
    assert_eq!(outcome.dropped, 5);
    assert_eq!(outcome.input_tokens, 750);
    assert!(outcome.misaligned);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains("assistant turn first")));

    let bodies = streamed_bodies(&server).await;
    let sent = bodies[0]["messages"].as_array().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["content"], "turn 5");
    assert_eq!(sent[1]["content"], "turn 6");

    // The full history is kept locally.
    assert_eq!(chat.conversation().len(), 8);
}

#[tokio::test]
async fn test_overloaded_provider_leaves_user_turn_for_retry() {
    let server = MockServer::start().await;
    common::mount_token_count(&server, 10).await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let (mut chat, storage, _dir) = chat_for(&server, settings(&server), "ada");
    chat.submit("Anyone there?");
    let err = chat.generate_reply(|_| {}).await.unwrap_err();

    assert!(is_overloaded(&err));
    assert!(!chat.needs_reply());
    let stored = storage
        .load_session("ada", chat.conversation().id())
        .unwrap()
        .unwrap();
    assert_eq!(stored.messages, vec![Message::user("Anyone there?")]);
}

#[tokio::test]
async fn test_token_count_failure_falls_back_to_estimate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages/count_tokens"))
        .respond_with(ResponseTemplate::new(500).set_body_string("count unavailable"))
        .mount(&server)
        .await;
    common::mount_stream_reply(&server, &["still works"]).await;

    let (mut chat, _storage, _dir) = chat_for(&server, settings(&server), "ada");
    chat.submit("Hello");
    let outcome = chat.generate_reply(|_| {}).await.unwrap().unwrap();

    assert_eq!(outcome.text, "still works");
    assert!(outcome.input_tokens > 0);
    assert!(outcome.warnings.iter().any(|w| w.contains("local estimate")));
}

#[tokio::test]
async fn test_sessions_are_namespaced_by_owner() {
    let server = MockServer::start().await;
    common::mount_token_count(&server, 10).await;
    common::mount_stream_reply(&server, &["hi"]).await;

    let (storage, _dir) = common::create_temp_storage();
    let storage = Arc::new(storage);
    let make = |owner: &str| {
        let provider = AnthropicProvider::new(common::mock_config(&server)).unwrap();
        ChatSession::new(Arc::new(provider), storage.clone(), settings(&server), owner).unwrap()
    };

    let mut ada = make("ada");
    ada.submit("from ada");
    ada.generate_reply(|_| {}).await.unwrap();

    let mut bob = make("BOB");
    bob.submit("from bob");
    bob.generate_reply(|_| {}).await.unwrap();

    assert_eq!(ada.recent_history(true).unwrap().len(), 1);
    assert_eq!(bob.recent_history(true).unwrap()[0].preview, "from bob");

    let ada_id = ada.conversation().id().to_string();
    let err = bob.resume(&ada_id).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfabError>(),
        Some(ConfabError::SessionNotFound(_))
    ));
}

/// Store whose writes always fail
struct ReadOnlyStore;

impl SessionStore for ReadOnlyStore {
    fn save_session(
        &self,
        _owner: &str,
        _id: &str,
        _messages: &[Message],
    ) -> Result<DateTime<Utc>> {
        Err(ConfabError::Storage("disk full".to_string()).into())
    }

    fn load_session(&self, _owner: &str, _id: &str) -> Result<Option<StoredSession>> {
        Ok(None)
    }

    fn set_preview(&self, _owner: &str, id: &str, _preview: &str) -> Result<()> {
        Err(ConfabError::SessionNotFound(id.to_string()).into())
    }

    fn list_recent(&self, _owner: &str, _limit: usize) -> Result<Vec<StoredSession>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_storage_failure_does_not_stop_the_chat() {
    let server = MockServer::start().await;
    common::mount_token_count(&server, 10).await;
    common::mount_stream_reply(&server, &["answer"]).await;

    let provider = AnthropicProvider::new(common::mock_config(&server)).unwrap();
    let mut chat = ChatSession::new(
        Arc::new(provider),
        Arc::new(ReadOnlyStore),
        settings(&server),
        "ada",
    )
    .unwrap();

    let warnings = chat.submit("question");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("disk full"));

    let outcome = chat.generate_reply(|_| {}).await.unwrap().unwrap();
    assert_eq!(outcome.text, "answer");
    assert!(outcome.warnings.iter().any(|w| w.contains("disk full")));
    assert_eq!(chat.conversation().len(), 2);
}
