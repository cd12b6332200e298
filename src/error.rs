use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Failure classes surfaced to callers of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Embedding,
    Index,
    Generation,
    InvalidInput,
    Internal,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Embedding(_) => ErrorKind::Embedding,
            RagError::Index(_) => ErrorKind::Index,
            RagError::Generation(_) => ErrorKind::Generation,
            RagError::InvalidQuestion(_) => ErrorKind::InvalidInput,
            RagError::Config(_) | RagError::Toml(_) => ErrorKind::Internal,
        }
    }

    /// Single message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        format!("An error occurred: {}", self)
    }
}

impl From<config::ConfigError> for RagError {
    fn from(err: config::ConfigError) -> Self {
        RagError::Config(err.to_string())
    }
}

impl From<candle_core::Error> for RagError {
    fn from(err: candle_core::Error) -> Self {
        RagError::Embedding(format!("Candle error: {}", err))
    }
}

impl From<hf_hub::api::tokio::ApiError> for RagError {
    fn from(err: hf_hub::api::tokio::ApiError) -> Self {
        RagError::Embedding(format!("HuggingFace Hub error: {}", err))
    }
}

impl From<qdrant_client::QdrantError> for RagError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        RagError::Index(format!("Qdrant error: {}", err))
    }
}
