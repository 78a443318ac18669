use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Data service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Local flag store error: {0}")]
    Local(#[from] sqlx::Error),

    #[error("Realtime subscription error: {0}")]
    Realtime(String),

    #[error("Realtime socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown option: {0}")]
    UnknownOption(i64),

    #[error("This view does not accept votes")]
    ReadOnlyView,

    #[error("View session is closed")]
    SessionClosed,
}

pub type Result<T, E = VoteError> = std::result::Result<T, E>;
