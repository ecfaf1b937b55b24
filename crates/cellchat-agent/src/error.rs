//! Agent error types.
//!
//! Every subsystem of the agent crate surfaces failures through
//! [`AgentError`]. The first group of variants is the gateway-level
//! taxonomy that callers map to HTTP responses or in-band notices; the rest
//! are transport details of the model client.

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Request-level taxonomy ----------------------------------------------
    /// The request was malformed or empty.
    #[error("{reason}")]
    Validation { reason: String },

    /// A required piece of configuration is absent or unusable.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// The model identifier is not part of the supported enumeration.
    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// A capability call failed.
    #[error("{capability} failed: {reason}")]
    ToolExecution { capability: String, reason: String },

    /// Any other failure while the event stream is being pumped.
    #[error("{reason}")]
    Stream { reason: String },

    // -- Model transport -----------------------------------------------------
    /// An HTTP request to the model provider failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The model response could not be parsed.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    /// The SSE stream was interrupted or reported an error.
    #[error("llm stream error: {reason}")]
    LlmStreamError { reason: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal agent error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn stream(reason: impl Into<String>) -> Self {
        Self::Stream {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}
