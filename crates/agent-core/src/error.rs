//! Error Types

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Only provider, configuration and persistence problems surface here. Tool
/// failures travel inside [`crate::tool::InvocationOutcome`] and decode
/// failures are absorbed by the decision producer.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing a session document failed
    #[error("Persistence error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_) | AgentError::RateLimited(_)
        )
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AgentError::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

/// Why a tool invocation did not succeed.
///
/// The dispatcher folds every variant into a failed
/// [`InvocationOutcome`](crate::tool::InvocationOutcome); none of them
/// escape a call to `execute`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool is registered under the requested name
    #[error("tool '{name}' not found; available tools: [{}]", available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    /// The supplied parameters do not fit the tool's signature
    #[error("parameter error: {0}")]
    InvalidParameters(String),

    /// The tool ran and failed
    #[error("execution error: {0}")]
    Execution(String),
}

impl ToolError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ToolError::InvalidParameters(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        ToolError::Execution(msg.into())
    }

    /// Coarse tag recorded on failed outcomes
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::NotFound { .. } => ToolErrorKind::NotFound,
            ToolError::InvalidParameters(_) => ToolErrorKind::InvalidParameters,
            ToolError::Execution(_) => ToolErrorKind::Execution,
        }
    }
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        ToolError::Execution(format!("{err:#}"))
    }
}

/// Tag distinguishing the three tool failure classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    NotFound,
    InvalidParameters,
    Execution,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_available_tools() {
        let err = ToolError::NotFound {
            name: "unknown_tool".into(),
            available: vec!["calculator".into(), "datetime".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("unknown_tool"));
        assert!(msg.contains("calculator, datetime"));
        assert_eq!(err.kind(), ToolErrorKind::NotFound);
    }

    #[test]
    fn parameter_and_execution_errors_are_tagged() {
        assert!(ToolError::invalid("missing 'a'").to_string().starts_with("parameter error:"));
        assert!(ToolError::execution("boom").to_string().starts_with("execution error:"));
    }

    #[test]
    fn anyhow_errors_become_execution_errors() {
        let err: ToolError = anyhow::anyhow!("disk full").into();
        assert_eq!(err, ToolError::Execution("disk full".into()));
    }

    #[test]
    fn retryable_errors() {
        assert!(AgentError::RateLimited("slow down".into()).is_retryable());
        assert!(!AgentError::Config("bad".into()).is_retryable());
    }
}
