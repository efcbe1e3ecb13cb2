use thiserror::Error;

#[derive(Debug, Error)]
pub enum RxDigestError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sandbox denied request: {0}")]
    Sandbox(String),
}

pub type Result<T> = std::result::Result<T, RxDigestError>;
