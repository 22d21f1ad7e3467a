//! Scripted provider for tests
//!
//! Replays queued replies in order and records every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, StreamChunk,
};

/// One scripted response
#[derive(Clone, Debug)]
pub enum Reply {
    /// Streamed as the given deltas; `complete` joins them
    Chunks(Vec<String>),
    /// Fail opening the request with a connection error
    ConnectionError,
    /// Fail opening the request with a non-transient provider error
    ProviderError(String),
    /// Stream the deltas, then fail mid-stream
    BrokenStream(Vec<String>),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Chunks(vec![text.into()])
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }
}

/// A recorded request
#[derive(Clone, Debug)]
pub struct Request {
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
}

/// Provider that replays [`Reply`] values
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Request>>,
    chunk_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new<I: IntoIterator<Item = Reply>>(replies: I) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Sleep before each streamed delta
    #[must_use]
    pub const fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn push(&self, reply: Reply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next(&self, messages: &[Message], options: &GenerationOptions) -> Result<Reply> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(Request {
                messages: messages.to_vec(),
                options: options.clone(),
            });
        }
        let reply = self
            .replies
            .lock()
            .map_err(|_| AgentError::Other("script lock poisoned".into()))?
            .pop_front()
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))?;
        match reply {
            Reply::ConnectionError => Err(AgentError::Connection("scripted refusal".into())),
            Reply::ProviderError(msg) => Err(AgentError::Provider(msg)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let content = match self.next(messages, options)? {
            Reply::Chunks(chunks) => chunks.concat(),
            Reply::BrokenStream(_) => return Err(AgentError::Provider("broken".into())),
            Reply::ConnectionError | Reply::ProviderError(_) => unreachable!("mapped in next()"),
        };
        Ok(Completion {
            content,
            model: options.model.clone(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let (chunks, broken) = match self.next(messages, options)? {
            Reply::Chunks(chunks) => (chunks, false),
            Reply::BrokenStream(chunks) => (chunks, true),
            Reply::ConnectionError | Reply::ProviderError(_) => unreachable!("mapped in next()"),
        };

        let mut items: Vec<Result<StreamChunk>> =
            chunks.into_iter().map(|c| Ok(StreamChunk::delta(c))).collect();
        if broken {
            items.push(Err(AgentError::Provider("stream interrupted".into())));
        } else {
            items.push(Ok(StreamChunk::done()));
        }

        let delay = self.chunk_delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }
}
