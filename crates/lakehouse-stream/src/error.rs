use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Topic '{0}' has no registered handler")]
    NoHandler(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
