//! Agent error types.
//!
//! The intent parser never propagates these.  It logs them and falls back
//! to the rule table.

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The request never produced a response (connect, TLS, timeout, headers).
    #[error("llm request failed: {reason}")]
    Request { reason: String },

    /// The provider answered with a non-success status.
    #[error("llm provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The reply did not have the expected shape.
    #[error("unexpected llm response: {reason}")]
    InvalidResponse { reason: String },

    #[error("no api key configured for {provider}")]
    MissingApiKey { provider: String },

    #[error("unknown llm provider `{name}` (expected `anthropic` or `openai`)")]
    UnknownProvider { name: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request {
            reason: err.to_string(),
        }
    }
}
