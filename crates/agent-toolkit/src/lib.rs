//! # agent-toolkit
//!
//! Collaborators for the react-agents chatbots: the `Search Engine` web
//! search tool, document retrieval, and [`ReferenceChatbot`], which routes
//! each question to a general or reference-backed answer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use agent_toolkit::{ChatbotConfig, HttpRetriever, ReferenceChatbot, SerpApiSearch};
//!
//! let bot = ReferenceChatbot::build(
//!     ChatbotConfig::from_env(),
//!     provider,
//!     Some(Arc::new(SerpApiSearch::from_env()?)),
//!     Some(Arc::new(HttpRetriever::from_env()?)),
//! )?;
//! let answer = bot.answer("How is biological age measured?", &[]).await?;
//! ```

pub mod chatbot;
pub mod error;
pub mod retrieval;
pub mod search;

pub use chatbot::{ChatbotConfig, ReferenceChatbot, Route};
pub use error::{Result, ToolkitError};
pub use retrieval::{
    group_references, HttpRetriever, ReferenceDocument, RetrievalConfig, RetrievalReference,
    Retriever, SearchParams, StaticRetriever,
};
pub use search::{SerpApiConfig, SerpApiSearch, SEARCH_TOOL_NAME};

/// System prompt for the router conversation
pub const ROUTER_SYSTEM_PROMPT: &str =
    "You are an helpful intelligent assistant, think step by step to make tasks done.";

/// System prompt for answering research questions
pub const SYSTEM_PROMPT: &str = r"You are a specialized AI expert in longevity research and scientific paper analysis. You answer questions about aging, longevity interventions and related biomedical research by synthesizing information from retrieved paper chunks.

When reference text from research papers is provided:
- Analyze the content and identify key findings, methods, limitations and implications.
- Compare study results across sources and combine them into one well-structured answer.
- Keep a neutral tone and note uncertainties or gaps in the research.
- Base your answer on the provided evidence. Use tools only when the references are not enough.

Adapt the depth of technical detail to the question while staying concise and clear.";

/// Reply to a session reset
pub const GREETING: &str = "Hello! 👋

I'm Longevity AI, your personal assistant for exploring the latest medical research on longevity and health. Whether you have questions about aging, life extension strategies, or insights from cutting-edge scientific papers, I'm here to help!

Ask me anything about longevity, and I'll provide answers based on peer-reviewed research.

Disclaimer: The information I provide is based on scientific studies and should not be considered as medical advice. Always consult with a healthcare professional before making any decisions related to your health and well-being.";
