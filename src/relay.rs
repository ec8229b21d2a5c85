//! Stream relay
//!
//! Turns a provider event stream into plain text fragments and forwards them
//! to the display layer as they arrive. The relay is single pass: each
//! fragment is handed on immediately and only the running reply text is
//! kept. When the stream breaks off, the text received so far is returned
//! together with the error so the caller can still commit it.

use crate::error::Result;
use crate::providers::anthropic::classify_error_body;
use crate::providers::{EventStream, StreamEvent};

use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Lazy sequence of reply text fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Result of relaying one streamed reply
#[derive(Debug)]
pub struct RelayOutcome {
    /// Concatenation of every fragment received
    pub text: String,
    /// Error that ended the stream early, if any
    pub interruption: Option<anyhow::Error>,
}

impl RelayOutcome {
    /// True when the stream ran to its natural end
    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Extract the text carried by one event, if any.
///
/// Text arrives in `content_block_delta` events and, occasionally, as the
/// initial text of a `content_block_start` block.
pub fn event_text(event: &StreamEvent) -> Option<&str> {
    match event {
        StreamEvent::ContentBlockDelta { delta, .. } => delta.text.as_deref(),
        StreamEvent::ContentBlockStart { content_block, .. } => content_block.text.as_deref(),
        _ => None,
    }
    .filter(|text| !text.is_empty())
}

/// Map provider events to text fragments.
///
/// Events without text are skipped. An in-stream `error` event becomes an
/// `Err` item classified the same way as an HTTP error response.
///
/// # Examples
///
/// ```
/// use confab::providers::{ContentDelta, EventStream, StreamEvent};
/// use confab::relay::text_deltas;
/// use futures::StreamExt;
///
/// # futures::executor::block_on(async {
/// let events: EventStream = Box::pin(futures::stream::iter(vec![
///     Ok(StreamEvent::Ping),
///     Ok(StreamEvent::ContentBlockDelta {
///         index: 0,
///         delta: ContentDelta { kind: "text_delta".into(), text: Some("Hi".into()) },
///     }),
/// ]));
/// let texts: Vec<String> = text_deltas(events).map(|t| t.unwrap()).collect().await;
/// assert_eq!(texts, vec!["Hi"]);
/// # });
/// ```
pub fn text_deltas(events: EventStream) -> TextStream {
    Box::pin(events.filter_map(|item| async move {
        match item {
            Ok(StreamEvent::Error { error }) => {
                tracing::warn!("Provider reported an error mid-stream: {}", error.kind);
                Some(Err(classify_error_body(None, &error).into()))
            }
            Ok(event) => event_text(&event).map(|text| Ok(text.to_string())),
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Drain a text stream, forwarding each fragment to `on_text`.
///
/// Consumption stops at the first error; the text collected up to that point
/// is kept in the outcome.
pub async fn relay<F>(mut stream: TextStream, mut on_text: F) -> RelayOutcome
where
    F: FnMut(&str),
{
    let mut text = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                on_text(&fragment);
                text.push_str(&fragment);
            }
            Err(e) => {
                tracing::warn!(
                    "Reply stream interrupted after {} chars: {:#}",
                    text.len(),
                    e
                );
                return RelayOutcome {
                    text,
                    interruption: Some(e),
                };
            }
        }
    }

    tracing::debug!("Reply stream finished with {} chars", text.len());
    RelayOutcome {
        text,
        interruption: None,
    }
}
