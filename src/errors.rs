use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no auth token available")]
    MissingToken,

    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("api rejected request: {0}")]
    Rejected(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("push connect timed out")]
    ConnectTimeout,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl NotifyError {
    /// True for failures that mean the token is no longer accepted.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            NotifyError::MissingToken => true,
            NotifyError::Api { status, .. } => {
                *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
