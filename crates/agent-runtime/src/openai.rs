//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` for any endpoint speaking the OpenAI
//! chat-completion protocol (OpenAI, vLLM, Ollama's `/v1`, LM Studio, ...).
//! Streaming responses arrive as server-sent events, one JSON chunk per
//! `data:` line, terminated by `data: [DONE]`.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::Message,
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, StreamChunk,
        TokenUsage,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OpenAI-compatible provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Base URL up to and including the API version, e.g. `http://host/v1`
    pub base_url: String,

    /// Bearer token, if the endpoint wants one
    pub api_key: Option<String>,

    /// Default model when the request options leave it empty
    pub model: String,

    /// Total timeout per HTTP request
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("LLM_URI").unwrap_or(defaults.base_url);
        let api_key = std::env::var("LLM_TOKEN").ok().filter(|k| !k.is_empty());
        let model = std::env::var("LLM_MODEL").unwrap_or(defaults.model);
        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            base_url,
            api_key,
            model,
            timeout_secs,
        }
    }
}

/// OpenAI-compatible LLM provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env())
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn model<'a>(&'a self, options: &'a GenerationOptions) -> &'a str {
        if options.model.is_empty() {
            &self.config.model
        } else {
            &options.model
        }
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let mut request = self.client.post(self.url("chat/completions")).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(%status, body = %text, base = %self.config.base_url, "chat completion request rejected");
        Err(match status.as_u16() {
            429 => AgentError::RateLimited(text),
            408 | 504 => AgentError::Timeout(format!("HTTP {status}")),
            _ => AgentError::Provider(format!("HTTP {status}: {text}")),
        })
    }
}

/// Map a reqwest failure onto the transient/non-transient split
fn transport_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout(err.to_string())
    } else if err.is_connect() {
        AgentError::Connection(err.to_string())
    } else {
        AgentError::Provider(err.to_string())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    fn new(
        model: &'a str,
        messages: &'a [Message],
        options: &'a GenerationOptions,
        stream: bool,
    ) -> Self {
        Self {
            model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stop: &options.stop_sequences,
            frequency_penalty: options.frequency_penalty,
            stream,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceContent>,
    #[serde(default)]
    delta: Option<ChoiceContent>,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct ChoiceContent {
    #[serde(default)]
    content: Option<String>,
}

/// Turn one SSE `data:` payload into a stream item. Chunks without
/// choices (keep-alives, usage-only chunks) are skipped.
fn parse_chunk(payload: &str) -> Option<Result<StreamChunk>> {
    if payload == "[DONE]" {
        return Some(Ok(StreamChunk::done()));
    }
    let chunk: ChatResponse = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(err) => return Some(Err(err.into())),
    };
    if let Some(error) = chunk.error {
        return Some(Err(AgentError::Provider(error.to_string())));
    }
    let choice = chunk.choices.into_iter().next()?;
    let delta = choice.delta.and_then(|d| d.content).unwrap_or_default();
    Some(Ok(StreamChunk::delta(delta)))
}

/// Line splitter for a server-sent event byte stream. Bytes are buffered
/// until a full line arrives, so multi-byte characters split across
/// network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the `data:` payloads of completed lines
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        payloads
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn health_check(&self) -> Result<bool> {
        let mut request = self.client.get(self.url("models"));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("LLM endpoint health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let model = self.model(options);
        let response = self
            .post(&ChatRequest::new(model, messages, options, false))
            .await?;
        let body: ChatResponse = response.json().await.map_err(transport_error)?;
        if let Some(error) = body.error {
            return Err(AgentError::Provider(error.to_string()));
        }

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("completion has no choices".into()))?;
        Ok(Completion {
            content: choice.message.and_then(|m| m.content).unwrap_or_default(),
            model: body.model.unwrap_or_else(|| model.to_string()),
            usage: body.usage,
            finish_reason: choice.finish_reason,
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let model = self.model(options);
        let response = self
            .post(&ChatRequest::new(model, messages, options, true))
            .await?;

        let stream = response
            .bytes_stream()
            .scan(SseDecoder::default(), |decoder, bytes| {
                let items: Vec<Result<StreamChunk>> = match bytes {
                    Ok(bytes) => decoder
                        .feed(&bytes)
                        .iter()
                        .filter_map(|payload| parse_chunk(payload))
                        .collect(),
                    Err(err) => vec![Err(transport_error(err))],
                };
                futures::future::ready(Some(futures::stream::iter(items)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
