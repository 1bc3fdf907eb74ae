pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Rejected before any network call.
    #[error("{0}")]
    Validation(String),
    #[error("not logged in")]
    NotAuthenticated,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} ({status})")]
    Status { status: StatusCode, message: String },
    #[error("media upload failed: {0}")]
    Upload(String),
    #[error("event channel: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("event channel protocol: {0}")]
    Protocol(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Text shown to the user: the backend's own message when it sent one, otherwise the
    /// given fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Status { message, .. } if !message.is_empty() => message.clone(),
            _ => fallback.to_owned(),
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
