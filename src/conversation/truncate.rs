//! Context window truncation
//!
//! Keeps a conversation under the input token budget by dropping whole
//! user/assistant pairs from the oldest end. The total is measured with the
//! provider's token counting call; the size of the kept tail is extrapolated
//! from the keep ratio rather than measured again.
//!
//! Pairs are counted as `len / 2` and the kept tail is always an even number
//! of messages. On an odd-length or role-irregular history the tail can start
//! with an assistant turn. That outcome is reported through
//! [`Truncation::misaligned`] and a warning, and the messages are returned
//! as sliced.

use crate::providers::{Message, Provider, TokenCountRequest};

/// What to keep of a conversation measured at `current_tokens`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPlan {
    /// Send the conversation as is
    KeepAll,
    /// Send only the trailing `messages` messages
    KeepTail {
        /// Number of trailing pairs kept
        pairs: usize,
        /// Number of trailing messages kept (`2 * pairs`, capped at the length)
        messages: usize,
        /// Extrapolated input tokens of the kept tail
        estimated_tokens: usize,
    },
}

/// Decide how much of a conversation fits the budget.
///
/// # Arguments
///
/// * `message_count` - Number of messages in the conversation
/// * `current_tokens` - Measured input tokens of the whole conversation
/// * `budget` - Input token budget
///
/// # Examples
///
/// ```
/// use confab::conversation::{plan_truncation, TruncationPlan};
///
/// // 3 messages is one pair; half the budget still keeps one pair.
/// assert_eq!(
///     plan_truncation(3, 200, 100),
///     TruncationPlan::KeepTail { pairs: 1, messages: 2, estimated_tokens: 100 }
/// );
/// assert_eq!(plan_truncation(3, 90, 100), TruncationPlan::KeepAll);
/// ```
pub fn plan_truncation(message_count: usize, current_tokens: usize, budget: usize) -> TruncationPlan {
    if current_tokens <= budget {
        return TruncationPlan::KeepAll;
    }

    let pair_count = message_count / 2;
    if pair_count == 0 {
        return TruncationPlan::KeepAll;
    }

    let keep_ratio = budget as f64 / current_tokens as f64;
    let pairs = ((pair_count as f64 * keep_ratio).floor() as usize).max(1);
    let messages = (pairs * 2).min(message_count);
    let estimated_tokens = (current_tokens as f64 * keep_ratio).floor() as usize;

    TruncationPlan::KeepTail {
        pairs,
        messages,
        estimated_tokens,
    }
}

/// Messages to send plus their token accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Messages to send, a contiguous tail of the input
    pub messages: Vec<Message>,
    /// Input tokens: measured when nothing was dropped, extrapolated otherwise
    pub input_tokens: usize,
    /// Number of leading messages dropped
    pub dropped: usize,
    /// True when the kept tail does not start with a user turn
    pub misaligned: bool,
    /// True when the count came from the local heuristic instead of the provider
    pub estimated_locally: bool,
}

impl Truncation {
    /// True when messages were dropped
    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }
}

/// Local token estimate used when the provider cannot count.
///
/// Roughly four characters per token, rounded up.
///
/// # Examples
///
/// ```
/// use confab::conversation::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcde"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

fn estimate_request_tokens(system: Option<&str>, messages: &[Message]) -> usize {
    system.map(estimate_tokens).unwrap_or(0)
        + messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum::<usize>()
}

/// Fit `messages` into `budget` input tokens.
///
/// An empty conversation is returned as is without calling the provider. If
/// the token count call fails, the local estimate is used and a warning is
/// logged so the turn can still go ahead.
pub async fn truncate(
    provider: &dyn Provider,
    model: &str,
    system: Option<&str>,
    messages: &[Message],
    budget: usize,
) -> Truncation {
    if messages.is_empty() {
        return Truncation {
            messages: Vec::new(),
            input_tokens: 0,
            dropped: 0,
            misaligned: false,
            estimated_locally: false,
        };
    }

    let request = TokenCountRequest {
        model: model.to_string(),
        system: system.map(str::to_string),
        messages: messages.to_vec(),
    };

    let (current_tokens, estimated_locally) = match provider.count_tokens(&request).await {
        Ok(count) => (count, false),
        Err(e) => {
            let estimate = estimate_request_tokens(system, messages);
            tracing::warn!(
                "Token count failed ({:#}); using local estimate of {} tokens",
                e,
                estimate
            );
            (estimate, true)
        }
    };

    match plan_truncation(messages.len(), current_tokens, budget) {
        TruncationPlan::KeepAll => Truncation {
            messages: messages.to_vec(),
            input_tokens: current_tokens,
            dropped: 0,
            misaligned: false,
            estimated_locally,
        },
        TruncationPlan::KeepTail {
            pairs,
            messages: kept,
            estimated_tokens,
        } => {
            let start = messages.len() - kept;
            let tail = messages[start..].to_vec();
            let misaligned = tail.first().is_some_and(|m| !m.is_user());

            tracing::info!(
                "Conversation at {} tokens exceeds budget {}; keeping last {} pairs (~{} tokens)",
                current_tokens,
                budget,
                pairs,
                estimated_tokens
            );
            if misaligned {
                tracing::warn!(
                    "Truncated history starts with a {} turn instead of a user turn",
                    tail.first().map(|m| m.role.as_str()).unwrap_or_default()
                );
            }

            Truncation {
                messages: tail,
                input_tokens: estimated_tokens,
                dropped: start,
                misaligned,
                estimated_locally,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedProvider;

    fn alternating(pairs: usize) -> Vec<Message> {
        (0..pairs)
            .flat_map(|i| {
                vec![
                    Message::user(format!("question {}", i)),
                    Message::assistant(format!("answer {}", i)),
                ]
            })
            .collect()
    }

    #[test]
    fn test_plan_under_and_at_budget_keeps_all() {
        assert_eq!(plan_truncation(10, 999, 1000), TruncationPlan::KeepAll);
        assert_eq!(plan_truncation(10, 1000, 1000), TruncationPlan::KeepAll);
    }

    #[test]
    fn test_plan_keeps_proportional_pairs() {
        // 5 pairs at 4000 tokens with a 1000 budget: floor(5 * 0.25) = 1 pair.
        assert_eq!(
            plan_truncation(10, 4000, 1000),
            TruncationPlan::KeepTail {
                pairs: 1,
                messages: 2,
                estimated_tokens: 1000,
            }
        );
        // 10 pairs at 2500 with 1000 budget: floor(10 * 0.4) = 4 pairs.
        assert_eq!(
            plan_truncation(20, 2500, 1000),
            TruncationPlan::KeepTail {
                pairs: 4,
                messages: 8,
                estimated_tokens: 1000,
            }
        );
    }

    #[test]
    fn test_plan_keeps_at_least_one_pair() {
        assert_eq!(
            plan_truncation(8, 1_000_000, 10),
            TruncationPlan::KeepTail {
                pairs: 1,
                messages: 2,
                estimated_tokens: 10,
            }
        );
    }

    #[test]
    fn test_plan_single_message_over_budget_keeps_all() {
        assert_eq!(plan_truncation(1, 5000, 10), TruncationPlan::KeepAll);
    }

    #[tokio::test]
    async fn test_truncate_empty_skips_provider() {
        let provider = ScriptedProvider::new().with_token_count(1_000_000);
        let result = truncate(&provider, "m", None, &[], 10).await;
        assert!(result.messages.is_empty());
        assert_eq!(result.input_tokens, 0);
        assert_eq!(provider.count_calls(), 0);
    }

    #[tokio::test]
    async fn test_truncate_under_budget_returns_input() {
        let messages = alternating(3);
        let provider = ScriptedProvider::new().with_token_count(500);
        let result = truncate(&provider, "m", Some("Be concise."), &messages, 1000).await;
        assert_eq!(result.messages, messages);
        assert_eq!(result.input_tokens, 500);
        assert!(!result.is_truncated());
        assert_eq!(provider.count_calls(), 1);
    }

    #[tokio::test]
    async fn test_truncate_odd_history_keeps_last_two() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("bye"),
        ];
        let provider = ScriptedProvider::new().with_token_count(200);
        let result = truncate(&provider, "m", None, &messages, 100).await;

        assert_eq!(result.messages, messages[1..].to_vec());
        assert_eq!(result.input_tokens, 100);
        assert_eq!(result.dropped, 1);
        assert!(result.misaligned);
    }

    #[tokio::test]
    async fn test_truncate_result_is_contiguous_tail() {
        let messages = alternating(6);
        let provider = ScriptedProvider::new().with_token_count(3000);
        let result = truncate(&provider, "m", None, &messages, 750).await;

        // floor(6 * 0.25) = 1 pair
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages, messages[10..].to_vec());
        assert!(!result.misaligned);
        assert_eq!(result.input_tokens, 750);
    }

    #[tokio::test]
    async fn test_truncate_falls_back_to_local_estimate() {
        let messages = vec![Message::user("abcdefgh"), Message::assistant("abcd")];
        let provider = ScriptedProvider::new().with_failing_token_count();
        let result = truncate(&provider, "m", None, &messages, 1000).await;

        assert!(result.estimated_locally);
        assert_eq!(result.input_tokens, 3);
        assert_eq!(result.messages, messages);
    }
}
