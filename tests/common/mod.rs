use confab::config::AnthropicConfig;
use confab::storage::SqliteStorage;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("history.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Provider config pointing at a mock server
#[allow(dead_code)]
pub fn mock_config(server: &MockServer) -> AnthropicConfig {
    AnthropicConfig {
        api_base: server.uri(),
        api_key: Some("test-key".to_string()),
        ..Default::default()
    }
}

/// SSE body streaming `chunks` as one text block
#[allow(dead_code)]
pub fn sse_body(chunks: &[&str]) -> String {
    let mut events = vec![
        json!({"type": "message_start", "message": {"role": "assistant", "content": []}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "ping"}),
    ];
    events.extend(chunks.iter().map(|chunk| {
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": chunk}})
    }));
    events.push(json!({"type": "content_block_stop", "index": 0}));
    events.push(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 5}}));
    events.push(json!({"type": "message_stop"}));

    events
        .iter()
        .map(|event| format!("event: {}\ndata: {}\n\n", event["type"].as_str().unwrap(), event))
        .collect()
}

/// Answer every streaming request with `chunks`
#[allow(dead_code)]
pub async fn mount_stream_reply(server: &MockServer, chunks: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(chunks)),
        )
        .mount(server)
        .await;
}

/// Answer every non-streaming request with `text`
#[allow(dead_code)]
pub async fn mount_completion(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "usage": {"input_tokens": 40, "output_tokens": 4}
        })))
        .mount(server)
        .await;
}

/// Report `tokens` input tokens for every count request
#[allow(dead_code)]
pub async fn mount_token_count(server: &MockServer, tokens: usize) {
    Mock::given(method("POST"))
        .and(path("/v1/messages/count_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"input_tokens": tokens})))
        .mount(server)
        .await;
}
