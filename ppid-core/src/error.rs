use thiserror::Error;

use crate::embeddings::EmbeddingError;
use crate::generation::GenerationError;

/// Umbrella error for callers that cross several core modules.
#[derive(Error, Debug)]
pub enum PpidError {
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the JSON file repositories.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode record: {0}")]
    Serialize(#[from] serde_json::Error),
}
