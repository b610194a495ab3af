use thiserror::Error;

use ppid_core::{EmbeddingError, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF parsing failed for {path}: {message}")]
    Pdf { path: String, message: String },

    #[error("Embedding failed for chunk {index} of {source_id}: {source}")]
    Embedding {
        index: usize,
        source_id: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding backend error: {0}")]
    Backend(#[from] EmbeddingError),
}
