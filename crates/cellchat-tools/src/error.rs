//! Tool error types.
//!
//! Capabilities and the registry surface failures through [`ToolError`].
//! Every variant that concerns a single capability carries its identifier so
//! the converted [`AgentError`] still says which tool failed.

use cellchat_agent::AgentError;
use cellchat_store::StoreError;

/// Unified error type for cellchat tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A required credential is not configured.
    #[error("capability {capability} is enabled but credential {field} is not set")]
    MissingCredential { capability: String, field: String },

    /// The HTTP request could not be sent or its body not read.
    #[error("request failed: {reason}")]
    Request { capability: String, reason: String },

    /// The upstream API answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Status {
        capability: String,
        status: u16,
        body: String,
    },

    /// The upstream response did not have the expected shape.
    #[error("unexpected response: {reason}")]
    Parse { capability: String, reason: String },

    /// The query or configuration value is unusable.
    #[error("invalid input: {reason}")]
    InvalidInput { capability: String, reason: String },

    /// Reading capability configuration failed.
    #[error("tool configuration store error: {0}")]
    Store(#[from] StoreError),
}

impl ToolError {
    pub(crate) fn request(capability: &str, err: impl std::fmt::Display) -> Self {
        Self::Request {
            capability: capability.to_owned(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn parse(capability: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            capability: capability.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_input(capability: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            capability: capability.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the tools crate.
pub type Result<T> = std::result::Result<T, ToolError>;

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::MissingCredential { .. } => AgentError::configuration(err.to_string()),
            ToolError::Store(e) => {
                AgentError::configuration(format!("cannot read tool configuration: {e}"))
            }
            ToolError::Request { ref capability, .. }
            | ToolError::Status { ref capability, .. }
            | ToolError::Parse { ref capability, .. }
            | ToolError::InvalidInput { ref capability, .. } => AgentError::ToolExecution {
                capability: capability.clone(),
                reason: err.to_string(),
            },
        }
    }
}
