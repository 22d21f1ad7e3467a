//! # agent-runtime
//!
//! Runtime providers for the react-agents system.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** (default): any `/v1/chat/completions` endpoint,
//!   streaming over server-sent events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::OpenAiProvider;
//!
//! let provider = OpenAiProvider::from_env()?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

pub mod openai;

pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentBuilder, AgentError, LlmProvider, Message, Result, Role, Session, Tool,
    ToolRegistry,
};
