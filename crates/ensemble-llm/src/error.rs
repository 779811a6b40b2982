//! Gateway and model errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LLMError>;

#[derive(Error, Debug)]
pub enum LLMError {
    /// Gateway answered with a non-success status not covered below
    #[error("gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway rejected the API key")]
    Unauthorized,

    #[error("rate limited by gateway: {0}")]
    RateLimited(String),

    #[error("gateway rejected the request: {0}")]
    BadRequest(String),

    #[error("model {0} is not served by this gateway")]
    UnknownModel(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed completion: {0}")]
    MalformedResponse(String),

    #[error("model {0} returned no text")]
    EmptyCompletion(String),

    #[error("LLM configuration: {0}")]
    Config(String),
}

impl LLMError {
    /// Network-level or throttling failures that may succeed on retry
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::RateLimited(_)
        )
    }
}
