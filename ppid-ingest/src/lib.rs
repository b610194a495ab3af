pub mod chat_parser;
pub mod chunker;
pub mod error;
pub mod index;
pub mod loader;

use std::path::Path;

use ppid_core::embeddings::EmbeddingBackend;

pub use chunker::RecursiveSplitter;
pub use error::IngestError;
pub use index::{cosine_similarity, embed_documents, VectorIndex};
pub use loader::{list_source_files, load_folder, SourceFile};

/// Summary of one full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Load, split and embed everything under `docs_folder`. Nothing is
/// written; the caller decides where the index goes.
pub async fn build_index(
    docs_folder: &Path,
    splitter: &RecursiveSplitter,
    backend: &dyn EmbeddingBackend,
) -> Result<(VectorIndex, IngestReport), IngestError> {
    let documents = load_folder(docs_folder).await?;
    let doc_count = documents.len();
    let pieces = splitter.split_documents(documents);
    let chunk_count = pieces.len();

    tracing::info!(
        documents = doc_count,
        chunks = chunk_count,
        backend = backend.name(),
        "Embedding chunks"
    );
    let index = embed_documents(pieces, backend).await?;

    Ok((
        index,
        IngestReport {
            documents: doc_count,
            chunks: chunk_count,
        },
    ))
}
