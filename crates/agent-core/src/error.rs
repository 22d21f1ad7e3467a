//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider returned an error response
    #[error("Provider error: {0}")]
    Provider(String),

    /// Request to the model endpoint timed out
    #[error("Provider timeout: {0}")]
    Timeout(String),

    /// Could not connect to the model endpoint
    #[error("Provider connection error: {0}")]
    Connection(String),

    /// A template placeholder had no bound value
    #[error("Missing template field: {0}")]
    MissingField(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Structured output could not be extracted from model text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Session error
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Transient network failures on a model call. Only these are retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::Timeout(_) | Self::Connection(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::Session(_) => {
                "Error: session_id invalid, please reset session first.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            _ => "Error: generate answer failed.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_transient() {
        assert!(AgentError::Timeout("t".into()).is_transient());
        assert!(AgentError::Connection("c".into()).is_transient());
        assert!(!AgentError::Provider("500".into()).is_transient());
        assert!(!AgentError::RateLimited("429".into()).is_transient());
        assert!(!AgentError::ToolExecution("boom".into()).is_transient());
    }

    #[test]
    fn anyhow_errors_become_other() {
        let err: AgentError = anyhow::anyhow!("wrapped").into();
        assert!(matches!(err, AgentError::Other(ref m) if m == "wrapped"));
    }
}
