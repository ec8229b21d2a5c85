//! Test utilities for Confab
//!
//! Provides a scripted in-memory provider and temporary storage helpers for
//! unit tests.

use crate::error::{ConfabError, Result};
use crate::providers::{
    CompletionRequest, CompletionResponse, ContentBlock, ContentDelta, EventStream, Message,
    Provider, StreamEvent, TokenCountRequest,
};
use crate::storage::SqliteStorage;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Create a session store in a fresh temporary directory
///
/// The returned `TempDir` must be kept alive for the duration of the test.
pub fn temp_storage() -> (SqliteStorage, TempDir) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let storage =
        SqliteStorage::new_with_path(dir.path().join("history.db")).expect("Failed to open storage");
    (storage, dir)
}

/// Failure kinds a scripted provider can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Provider overloaded
    Overloaded,
    /// Connection dropped mid-stream
    Interrupted,
    /// Any other provider failure
    Provider,
}

impl Failure {
    /// Build the matching error
    pub fn error(self) -> anyhow::Error {
        match self {
            Failure::Overloaded => ConfabError::Overloaded("Overloaded".to_string()).into(),
            Failure::Interrupted => {
                ConfabError::StreamInterrupted("connection reset".to_string()).into()
            }
            Failure::Provider => ConfabError::Provider("boom".to_string()).into(),
        }
    }
}

/// One scripted streaming reply
#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    /// Text fragments delivered in order
    pub chunks: Vec<String>,
    /// Fail the request before any event
    pub fail_at_start: Option<Failure>,
    /// Break the stream after the last chunk
    pub fail_after: Option<Failure>,
}

impl StreamScript {
    fn into_events(self) -> Vec<Result<StreamEvent>> {
        let mut events: Vec<Result<StreamEvent>> = vec![
            Ok(StreamEvent::MessageStart {
                message: serde_json::json!({"role": "assistant"}),
            }),
            Ok(StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock {
                    kind: "text".to_string(),
                    text: Some(String::new()),
                },
            }),
        ];
        events.extend(self.chunks.into_iter().map(|text| {
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta {
                    kind: "text_delta".to_string(),
                    text: Some(text),
                },
            })
        }));
        match self.fail_after {
            Some(failure) => events.push(Err(failure.error())),
            None => {
                events.push(Ok(StreamEvent::ContentBlockStop { index: 0 }));
                events.push(Ok(StreamEvent::MessageStop));
            }
        }
        events
    }
}

/// In-memory provider with scripted replies and call counters
pub struct ScriptedProvider {
    token_count: Option<usize>,
    completion: String,
    streams: Mutex<VecDeque<StreamScript>>,
    stream_requests: Mutex<Vec<CompletionRequest>>,
    count_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Provider counting 10 tokens, titling everything "Title", replying "ok"
    pub fn new() -> Self {
        Self {
            token_count: Some(10),
            completion: "Title".to_string(),
            streams: Mutex::new(VecDeque::new()),
            stream_requests: Mutex::new(Vec::new()),
            count_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    /// Report `count` input tokens for every request
    pub fn with_token_count(mut self, count: usize) -> Self {
        self.token_count = Some(count);
        self
    }

    /// Fail every token count call
    pub fn with_failing_token_count(mut self) -> Self {
        self.token_count = None;
        self
    }

    /// Text returned by non-streaming completions
    pub fn with_completion(mut self, text: &str) -> Self {
        self.completion = text.to_string();
        self
    }

    /// Queue a streamed reply made of `chunks`
    pub fn with_reply(self, chunks: &[&str]) -> Self {
        self.with_script(StreamScript {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Queue an arbitrary stream script
    pub fn with_script(self, script: StreamScript) -> Self {
        self.streams
            .lock()
            .expect("script lock poisoned")
            .push_back(script);
        self
    }

    /// Number of token count calls
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Number of non-streaming completion calls
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// Requests passed to `stream`, in order
    pub fn stream_requests(&self) -> Vec<CompletionRequest> {
        self.stream_requests
            .lock()
            .expect("request lock poisoned")
            .clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse::new(Message::assistant(
            self.completion.clone(),
        )))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<EventStream> {
        self.stream_requests
            .lock()
            .expect("request lock poisoned")
            .push(request.clone());

        let script = self
            .streams
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| StreamScript {
                chunks: vec!["ok".to_string()],
                ..Default::default()
            });

        if let Some(failure) = script.fail_at_start {
            return Err(failure.error());
        }
        Ok(Box::pin(futures::stream::iter(script.into_events())))
    }

    async fn count_tokens(&self, _request: &TokenCountRequest) -> Result<usize> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.token_count
            .ok_or_else(|| ConfabError::Provider("count unavailable".to_string()).into())
    }
}
