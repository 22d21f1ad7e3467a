//! # agent-core
//!
//! Provider-agnostic ReAct agent: prompt templates, a tool registry, the
//! tool-call loop that drives a chat model through Thought / Action /
//! Observation rounds, and a merger that interleaves several loops
//! answering in parallel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Agent                              │
//! │  ┌──────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ ToolCallLoop │──│ ToolRegistry│  │ ChatClient (retry)  │  │
//! │  │  (reasoning) │──│  + Memo     │  │   └─ LlmProvider    │  │
//! │  └──────────────┘  └─────────────┘  └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!        │ AnswerStream × K
//!        ▼
//!  ConcurrentStreamMerger ──▶ Token / End
//! ```
//!
//! The `LlmProvider` trait keeps the loop independent of the model
//! endpoint; `agent-runtime` supplies the OpenAI-compatible one.

pub mod client;
pub mod error;
pub mod memo;
pub mod merge;
pub mod message;
pub mod parse;
pub mod provider;
pub mod reasoning;
pub mod retry;
pub mod session;
pub mod template;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{truncate_at_stop, ChatClient};
pub use error::{AgentError, Result};
pub use memo::ContentMemoizer;
pub use merge::{ConcurrentStreamMerger, Merged, MergedStream};
pub use message::{HistoryRecord, Message, Role, Sender, Transcript};
pub use provider::{GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, AnswerStream, Question, RoundChat};
pub use retry::{Backoff, RetryPolicy};
pub use session::{MemorySessionStore, Session, SessionId, SessionStore};
pub use template::PromptTemplate;
pub use tool::{FnTool, ParameterSchema, Tool, ToolArgs, ToolRegistry, ToolSchema};
