//! Streaming Chat Client
//!
//! Thin wrapper over an [`LlmProvider`] that retries transient network
//! failures with a [`RetryPolicy`] and offers client-side stop-sequence
//! truncation, since providers do not always honour `stop` exactly.

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{Completion, CompletionStream, GenerationOptions, LlmProvider};
use crate::retry::RetryPolicy;

/// Retrying chat-completion client
#[derive(Clone)]
pub struct ChatClient {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::model_default(),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// One complete message
    pub async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.retry
            .run(self.provider.name(), AgentError::is_transient, || {
                self.provider.complete(messages, options)
            })
            .await
    }

    /// Incremental deltas. Retries cover opening the stream; an error
    /// surfacing mid-stream is yielded to the consumer as-is.
    pub async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        self.retry
            .run(self.provider.name(), AgentError::is_transient, || {
                self.provider.complete_stream(messages, options)
            })
            .await
    }
}

/// Byte offset of the earliest occurrence of any stop sequence.
pub fn first_stop(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Everything before the earliest stop sequence, or `text` unchanged when
/// none occurs.
pub fn truncate_at_stop<'a>(text: &'a str, stops: &[String]) -> &'a str {
    first_stop(text, stops).map_or(text, |idx| &text[..idx])
}

/// Length of the longest suffix of `text` that is a proper prefix of some
/// stop sequence. Streaming emitters hold these bytes back until the next
/// delta shows whether a stop sequence is forming.
pub fn partial_stop_suffix(text: &str, stops: &[String]) -> usize {
    stops
        .iter()
        .flat_map(|stop| {
            stop.char_indices()
                .skip(1)
                .map(|(i, _)| &stop[..i])
                .filter(|prefix| text.ends_with(prefix))
                .map(str::len)
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, ScriptedProvider};
    use tokio::time::Instant;

    fn stops(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_truncate_without_stop_is_identity() {
        let text = "Thought: nothing to stop here";
        assert_eq!(truncate_at_stop(text, &stops(&["Observation:"])), text);
        assert_eq!(truncate_at_stop(text, &[]), text);
    }

    #[test]
    fn test_truncate_uses_earliest_stop() {
        let text = "Action: x\nOBS: a\nObservation: b";
        let cut = truncate_at_stop(text, &stops(&["Observation:", "OBS:"]));
        assert_eq!(cut, "Action: x\n");
    }

    #[test]
    fn test_truncate_is_idempotent_prefix() {
        let s = stops(&["Observation:"]);
        let text = "Thought: t\nObservation: leaked";
        let once = truncate_at_stop(text, &s);
        assert!(text.starts_with(once));
        assert_eq!(truncate_at_stop(once, &s), once);
    }

    #[test]
    fn test_truncate_stop_at_start() {
        assert_eq!(truncate_at_stop("Observation: x", &stops(&["Observation:"])), "");
    }

    #[test]
    fn test_partial_suffix() {
        let s = stops(&["Observation:"]);
        assert_eq!(partial_stop_suffix("answer\nObser", &s), 5);
        assert_eq!(partial_stop_suffix("answer", &s), 0);
        // a complete stop sequence is handled by `first_stop`, not here
        assert_eq!(partial_stop_suffix("x Observation:", &s), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_retries_connection_errors() {
        let provider = Arc::new(ScriptedProvider::new([
            Reply::ConnectionError,
            Reply::ConnectionError,
            Reply::ConnectionError,
            Reply::ConnectionError,
            Reply::text("answer"),
        ]));
        let client = ChatClient::new(provider.clone());

        let start = Instant::now();
        let completion = client
            .complete(&[Message::user("hi")], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.content, "answer");
        assert_eq!(provider.calls(), 5);
        assert_eq!(start.elapsed().as_secs(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new([
            Reply::ProviderError("bad request".into()),
            Reply::text("unused"),
        ]));
        let client = ChatClient::new(provider.clone());

        let start = Instant::now();
        let result = client
            .stream(&[Message::user("hi")], &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(AgentError::Provider(_))));
        assert_eq!(provider.calls(), 1);
        assert_eq!(start.elapsed().as_secs(), 0);
    }
}
