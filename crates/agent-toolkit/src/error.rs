//! Error Types for the Toolkit

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolkitError>;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Search error: {0}")]
    Search(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ToolkitError> for AgentError {
    fn from(err: ToolkitError) -> Self {
        match err {
            ToolkitError::Config(msg) => Self::Config(msg),
            ToolkitError::Serialization(err) => Self::Json(err),
            ToolkitError::Network(err) if err.is_timeout() => Self::Timeout(err.to_string()),
            ToolkitError::Network(err) if err.is_connect() => Self::Connection(err.to_string()),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}

/// Read an environment variable, treating empty values as unset
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Read and parse an environment variable, falling back to `default`
pub(crate) fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}
