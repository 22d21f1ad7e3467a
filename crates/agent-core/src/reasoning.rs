//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for agent behavior.
//! Every round renders the ReAct prompt, lets the model think, and either
//! streams its final answer or runs the tool it asked for and appends the
//! observation to the scratchpad for the next round.
//!
//! Three variants share the tool plumbing:
//!
//! - [`Agent::tool_call_chat`] streams the final answer as it is generated
//!   and aborts on a tool that keeps failing.
//! - [`Agent::tool_call_answer`] waits for each full reply and substitutes
//!   a fixed observation when a tool keeps failing.
//! - [`Agent::tool_call_round_chat`] keeps a growing transcript instead of a
//!   scratchpad and feeds each observation back as a user turn.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::client::{first_stop, partial_stop_suffix, truncate_at_stop, ChatClient};
use crate::error::{AgentError, Result};
use crate::memo::ContentMemoizer;
use crate::message::{Message, Transcript};
use crate::parse::{self, ActionRequest, Signal};
use crate::provider::{CompletionStream, GenerationOptions, LlmProvider};
use crate::retry::RetryPolicy;
use crate::template::{self, fields, PromptTemplate};
use crate::tool::{Tool, ToolRegistry};

/// Observation used when a tool returns nothing
pub const NO_USEFUL_INFO: &str = "No useful information.";

/// Observation substituted for a tool that failed every attempt
pub const TOOL_ERROR_MSG: &str =
    "Tool calling failed. Please give the final answer directly according to the prompt.";

/// Instruction for the last request once the round limit is reached
pub const FORCE_ANSWER_PROMPT: &str =
    "Provide your answer directly in the format:\nFinal Answer:\n<Your final answer>";

const ANSWER_MARKER: &str = "final answer:";

/// Streamed answer text
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System turn of every transcript the agent builds
    pub system_prompt: String,

    /// Tool rounds before the forced final request
    pub max_rounds: usize,

    /// Generation options for tool-call rounds
    pub generation: GenerationOptions,

    /// Retries for transient model-call failures
    pub model_retry: RetryPolicy,

    /// Retries for tool invocations
    pub tool_retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_rounds: 10,
            generation: GenerationOptions::default().with_temperature(1.0),
            model_retry: RetryPolicy::model_default(),
            tool_retry: RetryPolicy::tool_default(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// One question for a tool-call loop
#[derive(Clone, Debug, Default)]
pub struct Question {
    /// The question as asked
    pub text: String,

    /// Earlier turns placed between the system turn and the prompt
    pub history: Vec<Message>,

    /// Tools offered to the model; all registered tools when `None`
    pub tool_names: Option<Vec<String>>,

    /// Tool result cache for this exchange
    pub memo: Option<Arc<ContentMemoizer>>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_memo(mut self, memo: Arc<ContentMemoizer>) -> Self {
        self.memo = Some(memo);
        self
    }
}

/// The main Agent struct
#[derive(Clone)]
pub struct Agent {
    client: ChatClient,
    tools: Arc<ToolRegistry>,
    config: Arc<AgentConfig>,
    template: PromptTemplate,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            client: ChatClient::new(provider).with_retry(config.model_retry),
            tools,
            config: Arc::new(config),
            template: template::react(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Stream the final answer to `question`.
    ///
    /// The stream ends after the answer, after the forced answer once
    /// `max_rounds` rounds are used up, or after the first error. A tool
    /// that fails every attempt ends the stream with that error.
    pub fn tool_call_chat(&self, question: Question) -> AnswerStream {
        let state = LoopState::new(self.clone(), question);
        Box::pin(futures::stream::unfold(state, LoopState::step))
    }

    /// Non-streaming tool-call loop. Returns the text after `Final Answer:`,
    /// or the whole forced reply when the round limit is reached.
    pub async fn tool_call_answer(&self, question: Question) -> Result<String> {
        let ctx = RoundContext::new(self, &question);
        let stops = self.template.stop_sequences().to_vec();
        let options = self.config.generation.clone().with_stop(&stops);
        let mut scratchpad = String::new();

        for round in 0..self.config.max_rounds {
            let prompt = ctx.render(self, &scratchpad)?;
            tracing::debug!(round, %prompt, "tool-call round prompt");

            let completion = self.client.complete(&ctx.messages(prompt), &options).await?;
            let reply = truncate_at_stop(&completion.content, &stops);
            tracing::debug!(round, %reply, "tool-call round reply");

            match parse::scan(reply, true) {
                Signal::FinalAnswer { start } => return Ok(reply[start..].trim().to_string()),
                Signal::Action(request) => {
                    let observation = match self.observe(&request, question.memo.as_deref()).await {
                        Ok(observation) => observation,
                        Err(err) => {
                            tracing::warn!(tool = %request.tool, error = %err, "tool failed, substituting observation");
                            TOOL_ERROR_MSG.to_string()
                        }
                    };
                    append_round(&mut scratchpad, &reply[..request.end], &observation);
                }
                Signal::Pending => append_round(&mut scratchpad, reply, NO_USEFUL_INFO),
            }
        }

        tracing::info!(max_rounds = self.config.max_rounds, "round limit reached, forcing an answer");
        let prompt = ctx.render(self, &scratchpad)?;
        let mut messages = ctx.messages(prompt);
        messages.push(Message::user(FORCE_ANSWER_PROMPT));
        let completion = self.client.complete(&messages, &options).await?;
        Ok(parse::final_answer_or_all(truncate_at_stop(&completion.content, &stops)))
    }

    /// Conversation that keeps its transcript between calls.
    ///
    /// `history` is trimmed to its `max_history` most recent turns and
    /// placed after `system_prompt`.
    pub fn round_chat(
        &self,
        system_prompt: &str,
        history: &[Message],
        max_history: usize,
    ) -> RoundChat {
        RoundChat {
            client: self.client.clone(),
            transcript: Transcript::with_history(system_prompt, history, max_history),
            options: GenerationOptions {
                model: self.config.generation.model.clone(),
                temperature: 0.0,
                max_tokens: 1024,
                top_p: None,
                stop_sequences: Vec::new(),
                frequency_penalty: Some(1.5),
            },
        }
    }

    /// Tool-call loop over a [`RoundChat`]: every observation goes back to
    /// the model as the next user turn.
    ///
    /// Each round is one model call, starting with the rendered prompt.
    /// After `max_rounds` rounds without a final answer, or right after a
    /// tool failed every attempt, one more call tells the model to answer
    /// directly, so at most `max_rounds + 1` calls are made.
    pub async fn tool_call_round_chat(&self, question: Question) -> Result<String> {
        let ctx = RoundContext::new(self, &question);
        let stops = self.template.stop_sequences().to_vec();
        let mut chat = self.round_chat(&self.config.system_prompt, &question.history, usize::MAX);
        chat.options.max_tokens = 512;
        chat.options.temperature = 0.2;
        chat.options.stop_sequences.clone_from(&stops);

        let mut turn = ctx.render(self, "")?;
        let mut forced = None;
        for round in 0..self.config.max_rounds {
            let reply = chat.send(std::mem::take(&mut turn)).await?;
            let cut = truncate_at_stop(&reply, &stops);
            let request = match parse::scan(cut, true) {
                Signal::FinalAnswer { .. } => return Ok(parse::final_answer_or_all(cut)),
                Signal::Action(request) => Some(request),
                Signal::Pending => None,
            };

            turn = match request {
                Some(request) => match self.observe(&request, question.memo.as_deref()).await {
                    Ok(observation) => format!("Observation: {observation}"),
                    Err(err) => {
                        tracing::warn!(tool = %request.tool, error = %err, "tool failed in round chat");
                        forced = Some(TOOL_ERROR_MSG.to_string());
                        break;
                    }
                },
                None => format!("Observation: {NO_USEFUL_INFO}"),
            };
            tracing::debug!(round, observation = %turn, "round chat observation");
        }

        let last = forced.unwrap_or_else(|| {
            tracing::info!(max_rounds = self.config.max_rounds, "round limit reached, forcing an answer");
            format!("{turn}\n\n{TOOL_ERROR_MSG}")
        });
        let reply = chat.send(last).await?;
        Ok(parse::final_answer_or_all(truncate_at_stop(&reply, &stops)))
    }

    /// Stream a single reply to `prompt` after the system turn
    pub async fn chat_once(
        &self,
        prompt: &str,
        temperature: f32,
        stop: &[String],
    ) -> Result<AnswerStream> {
        let messages = [
            Message::system(self.config.system_prompt.clone()),
            Message::user(prompt),
        ];
        let options = self
            .config
            .generation
            .clone()
            .with_temperature(temperature)
            .with_stop(stop);
        let stream = self.client.stream(&messages, &options).await?;
        Ok(Box::pin(stream.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) if chunk.delta.is_empty() => None,
                Ok(chunk) => Some(Ok(chunk.delta)),
                Err(err) => Some(Err(err)),
            }
        })))
    }

    /// Resolve and run the requested tool. Unknown tools and malformed
    /// arguments become explanatory observations; a tool that fails every
    /// attempt is an error.
    async fn observe(
        &self,
        request: &ActionRequest,
        memo: Option<&ContentMemoizer>,
    ) -> Result<String> {
        let Some((name, tool)) = self.tools.resolve(&request.tool) else {
            tracing::warn!(tool = %request.tool, "model asked for an unknown tool");
            return Ok(format!(
                "{} is not a valid tool, try one of {:?}.",
                request.tool,
                self.tools.names()
            ));
        };
        let args = match request.arguments() {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!(%name, error = %err, "invalid action input");
                return Ok(format!("Invalid Action Input for {name}: {err}"));
            }
        };

        tracing::debug!(%name, ?args, "invoking tool");
        let invoke = || self.invoke(&name, tool.as_ref(), &args);
        let output = match memo {
            Some(memo) => memo.get_or_compute(&name, &args, invoke).await?,
            None => invoke().await?,
        };
        if output.trim().is_empty() {
            Ok(NO_USEFUL_INFO.to_string())
        } else {
            Ok(output)
        }
    }

    async fn invoke(
        &self,
        name: &str,
        tool: &dyn Tool,
        args: &crate::tool::ToolArgs,
    ) -> Result<String> {
        self.config
            .tool_retry
            .run(name, |_| true, || tool.call(args))
            .await
            .map_err(|err| match err {
                AgentError::ToolExecution(_) => err,
                other => AgentError::ToolExecution(format!("{name}: {other}")),
            })
    }
}

/// Per-question values shared by every round
struct RoundContext {
    base: Vec<Message>,
    question: String,
    tool_doc: String,
    tool_names: String,
}

impl RoundContext {
    fn new(agent: &Agent, question: &Question) -> Self {
        let names = question
            .tool_names
            .clone()
            .unwrap_or_else(|| agent.tools.names());
        let mut base = vec![Message::system(agent.config.system_prompt.clone())];
        base.extend(question.history.iter().cloned());
        Self {
            base,
            question: question.text.clone(),
            tool_doc: agent.tools.document(Some(names.as_slice())),
            tool_names: serde_json::to_string(&names).unwrap_or_else(|_| "[]".into()),
        }
    }

    fn render(&self, agent: &Agent, scratchpad: &str) -> Result<String> {
        agent.template.render(&fields([
            ("question", self.question.as_str()),
            ("tools", self.tool_doc.as_str()),
            ("tool_names", self.tool_names.as_str()),
            ("agent_scratchpad", scratchpad),
        ]))
    }

    fn messages(&self, prompt: String) -> Vec<Message> {
        let mut messages = self.base.clone();
        messages.push(Message::user(prompt));
        messages
    }
}

fn append_round(scratchpad: &mut String, round_text: &str, observation: &str) {
    scratchpad.push('\n');
    scratchpad.push_str(round_text);
    scratchpad.push_str("\nObservation: ");
    scratchpad.push_str(observation);
}

// ============================================================================
// Round Chat
// ============================================================================

/// Conversation with a persistent transcript, see [`Agent::round_chat`]
pub struct RoundChat {
    client: ChatClient,
    transcript: Transcript,
    /// Options for [`RoundChat::send`]
    pub options: GenerationOptions,
}

impl RoundChat {
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Send `prompt` as a user turn and record the reply
    pub async fn send(&mut self, prompt: impl Into<String>) -> Result<String> {
        let options = self.options.clone();
        self.send_with(prompt, &options).await
    }

    /// [`RoundChat::send`] with explicit options. Neither turn is recorded
    /// when the request fails.
    pub async fn send_with(
        &mut self,
        prompt: impl Into<String>,
        options: &GenerationOptions,
    ) -> Result<String> {
        let prompt = Message::user(prompt);
        let mut messages = self.transcript.messages().to_vec();
        messages.push(prompt.clone());

        let completion = self.client.complete(&messages, options).await?;
        self.transcript.push(prompt);
        self.transcript.push(Message::assistant(completion.content.clone()));
        Ok(completion.content)
    }
}

// ============================================================================
// Streaming Loop
// ============================================================================

/// Emission cursor over the answer part of a reply
#[derive(Debug)]
struct AnswerCursor {
    pos: usize,
    begun: bool,
}

impl AnswerCursor {
    const fn at(pos: usize) -> Self {
        Self { pos, begun: false }
    }

    /// Next emittable slice of `text` and whether a stop sequence was hit.
    /// Leading whitespace is skipped and a possible partial stop sequence
    /// at the end is held back until `eof`.
    fn take(&mut self, text: &str, stops: &[String], eof: bool) -> (Option<String>, bool) {
        let rest = &text[self.pos..];
        let (end, stopped) = match first_stop(rest, stops) {
            Some(idx) => (self.pos + idx, true),
            None if eof => (text.len(), false),
            None => (text.len() - partial_stop_suffix(rest, stops), false),
        };

        let mut piece = &text[self.pos.min(end)..end];
        if !self.begun {
            piece = piece.trim_start();
        }
        self.pos = end.max(self.pos);
        if piece.is_empty() {
            return (None, stopped);
        }
        self.begun = true;
        (Some(piece.to_string()), stopped)
    }
}

/// Where the answer starts in a forced reply: after a leading
/// `Final Answer:` marker, or at 0. `None` while the reply could still
/// turn into the marker.
fn forced_answer_start(text: &str) -> Option<usize> {
    let body = text.trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '#');
    let skipped = text.len() - body.len();
    let lower = body.to_ascii_lowercase();
    if lower.starts_with(ANSWER_MARKER) {
        let after = skipped + ANSWER_MARKER.len();
        let emphasis = text[after..].len() - text[after..].trim_start_matches('*').len();
        Some(after + emphasis)
    } else if ANSWER_MARKER.starts_with(lower.as_str()) {
        None
    } else {
        Some(0)
    }
}

/// Accumulated output of the current round
#[derive(Debug, Default)]
struct RoundBuffer {
    text: String,
    answer: Option<AnswerCursor>,
}

enum Phase {
    Render,
    Receiving {
        stream: CompletionStream,
        buffer: RoundBuffer,
    },
    Forcing {
        stream: CompletionStream,
        buffer: RoundBuffer,
    },
    Finished,
}

struct LoopState {
    agent: Agent,
    ctx: RoundContext,
    memo: Option<Arc<ContentMemoizer>>,
    stops: Vec<String>,
    options: GenerationOptions,
    scratchpad: String,
    round: usize,
    phase: Phase,
}

impl LoopState {
    fn new(agent: Agent, question: Question) -> Self {
        let ctx = RoundContext::new(&agent, &question);
        let stops = agent.template.stop_sequences().to_vec();
        let options = agent.config.generation.clone().with_stop(&stops);
        Self {
            agent,
            ctx,
            memo: question.memo,
            stops,
            options,
            scratchpad: String::new(),
            round: 0,
            phase: Phase::Render,
        }
    }

    /// Advance until the next answer slice, an error, or the end
    async fn step(mut self) -> Option<(Result<String>, Self)> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return None,
                Phase::Render => {
                    if let Err(err) = self.open_round().await {
                        tracing::error!(error = %err, "tool-call round failed to start");
                        return Some((Err(err), self));
                    }
                }
                Phase::Receiving { stream, buffer } => {
                    match self.receive(stream, buffer).await {
                        Ok(Some(piece)) => return Some((Ok(piece), self)),
                        Ok(None) => {}
                        Err(err) => {
                            tracing::error!(error = %err, round = self.round, "tool-call round aborted");
                            return Some((Err(err), self));
                        }
                    }
                }
                Phase::Forcing { stream, buffer } => match self.receive_forced(stream, buffer).await {
                    Ok(Some(piece)) => return Some((Ok(piece), self)),
                    Ok(None) => {}
                    Err(err) => return Some((Err(err), self)),
                },
            }
        }
    }

    async fn open_round(&mut self) -> Result<()> {
        let prompt = self.ctx.render(&self.agent, &self.scratchpad)?;
        let mut messages = self.ctx.messages(prompt);

        if self.round >= self.agent.config.max_rounds {
            tracing::info!(max_rounds = self.agent.config.max_rounds, "round limit reached, forcing an answer");
            messages.push(Message::user(FORCE_ANSWER_PROMPT));
            let stream = self.agent.client.stream(&messages, &self.options).await?;
            self.phase = Phase::Forcing {
                stream,
                buffer: RoundBuffer::default(),
            };
            return Ok(());
        }

        self.round += 1;
        tracing::debug!(round = self.round, prompt = %messages.last().map_or("", |m| m.content.as_str()), "tool-call round prompt");
        let stream = self.agent.client.stream(&messages, &self.options).await?;
        self.phase = Phase::Receiving {
            stream,
            buffer: RoundBuffer::default(),
        };
        Ok(())
    }

    /// Pull one chunk of a tool-call round. Leaves `self.phase` set for the
    /// next step.
    async fn receive(
        &mut self,
        mut stream: CompletionStream,
        mut buffer: RoundBuffer,
    ) -> Result<Option<String>> {
        let Some(chunk) = stream.next().await else {
            return self.finish_round(buffer).await;
        };
        buffer.text.push_str(&chunk?.delta);

        if buffer.answer.is_none() {
            if first_stop(&buffer.text, &self.stops).is_some() {
                // the provider ignored `stop`; the round is over
                drop(stream);
                return self.finish_round(buffer).await;
            }
            match parse::scan(&buffer.text, false) {
                Signal::FinalAnswer { start } => {
                    tracing::debug!(round = self.round, "final answer detected");
                    buffer.answer = Some(AnswerCursor::at(start));
                }
                Signal::Action(request) => {
                    drop(stream);
                    self.act(&buffer.text, &request).await?;
                    self.phase = Phase::Render;
                    return Ok(None);
                }
                Signal::Pending => {
                    self.phase = Phase::Receiving { stream, buffer };
                    return Ok(None);
                }
            }
        }

        let RoundBuffer { text, answer } = &mut buffer;
        let (piece, stopped) = match answer.as_mut() {
            Some(cursor) => cursor.take(text, &self.stops, false),
            None => (None, false),
        };
        if !stopped {
            self.phase = Phase::Receiving { stream, buffer };
        }
        Ok(piece)
    }

    /// The round's stream ended: flush the answer or inspect the full reply
    async fn finish_round(&mut self, mut buffer: RoundBuffer) -> Result<Option<String>> {
        if let Some(cursor) = buffer.answer.as_mut() {
            return Ok(cursor.take(&buffer.text, &self.stops, true).0);
        }

        let reply = truncate_at_stop(&buffer.text, &self.stops);
        tracing::debug!(round = self.round, %reply, "tool-call round reply");
        match parse::scan(reply, true) {
            Signal::FinalAnswer { start } => {
                let mut cursor = AnswerCursor::at(start);
                Ok(cursor.take(reply, &self.stops, true).0)
            }
            Signal::Action(request) => {
                self.act(reply, &request).await?;
                self.phase = Phase::Render;
                Ok(None)
            }
            Signal::Pending => {
                append_round(&mut self.scratchpad, reply, NO_USEFUL_INFO);
                self.phase = Phase::Render;
                Ok(None)
            }
        }
    }

    async fn act(&mut self, round_text: &str, request: &ActionRequest) -> Result<()> {
        let observation = self.agent.observe(request, self.memo.as_deref()).await?;
        tracing::debug!(round = self.round, tool = %request.tool, %observation, "observation");
        append_round(&mut self.scratchpad, &round_text[..request.end], &observation);
        Ok(())
    }

    async fn receive_forced(
        &mut self,
        mut stream: CompletionStream,
        mut buffer: RoundBuffer,
    ) -> Result<Option<String>> {
        let chunk = stream.next().await;
        let eof = chunk.is_none();
        if let Some(chunk) = chunk {
            buffer.text.push_str(&chunk?.delta);
        }

        if buffer.answer.is_none() {
            match forced_answer_start(&buffer.text) {
                Some(start) => buffer.answer = Some(AnswerCursor::at(start)),
                None if eof => buffer.answer = Some(AnswerCursor::at(0)),
                None => {
                    self.phase = Phase::Forcing { stream, buffer };
                    return Ok(None);
                }
            }
        }

        let RoundBuffer { text, answer } = &mut buffer;
        let (piece, stopped) = match answer.as_mut() {
            Some(cursor) => cursor.take(text, &self.stops, eof),
            None => (None, true),
        };
        if !stopped && !eof {
            self.phase = Phase::Forcing { stream, buffer };
        }
        Ok(piece)
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    #[must_use]
    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register_arc(tool);
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub const fn max_rounds(mut self, max: usize) -> Self {
        self.config.max_rounds = max;
        self
    }

    #[must_use]
    pub const fn model_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.model_retry = policy;
        self
    }

    #[must_use]
    pub const fn tool_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.tool_retry = policy;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}
