use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransformError>;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unknown transformation: {0}")]
    UnknownTransformation(String),

    #[error("Transformation '{name}' requires {requirement}")]
    MissingContext { name: String, requirement: String },

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Encryption error: {0}")]
    Encryption(#[from] lakehouse_core::Error),
}
