//! Flat in-memory vector index, persisted as a JSON list of chunks.

use std::path::Path;

use ppid_core::embeddings::EmbeddingBackend;
use ppid_core::models::{DocumentChunk, RawDocument};
use ppid_core::store::{read_json_file, write_json_atomic};

use crate::error::IngestError;

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    chunks: Vec<DocumentChunk>,
}

impl VectorIndex {
    pub fn new(chunks: Vec<DocumentChunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// Copy of this index with one more chunk. The receiver is untouched so
    /// readers holding it keep a consistent view.
    pub fn with_chunk(&self, chunk: DocumentChunk) -> Self {
        let mut chunks = Vec::with_capacity(self.chunks.len() + 1);
        chunks.extend_from_slice(&self.chunks);
        chunks.push(chunk);
        Self { chunks }
    }

    /// Top `k` chunks by cosine similarity, best first. No score threshold.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(&DocumentChunk, f32)> {
        let mut scored: Vec<(&DocumentChunk, f32)> = self
            .chunks
            .iter()
            .map(|c| (c, cosine_similarity(query, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }

    /// `Ok(None)` when the file has not been built yet.
    pub async fn load(path: &Path) -> Result<Option<Self>, IngestError> {
        let chunks: Option<Vec<DocumentChunk>> = read_json_file(path).await?;
        Ok(chunks.map(Self::new))
    }

    pub async fn save(&self, path: &Path) -> Result<(), IngestError> {
        write_json_atomic(path, &self.chunks).await?;
        tracing::info!(path = %path.display(), chunks = self.chunks.len(), "Vector index saved");
        Ok(())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Embed every chunk in order. The first failure aborts the whole run.
pub async fn embed_documents(
    docs: Vec<RawDocument>,
    backend: &dyn EmbeddingBackend,
) -> Result<VectorIndex, IngestError> {
    let total = docs.len();
    let mut chunks = Vec::with_capacity(total);

    for (index, doc) in docs.into_iter().enumerate() {
        let embedding = backend
            .embed(&doc.content)
            .await
            .map_err(|source| IngestError::Embedding {
                index,
                source_id: doc.source_id.clone(),
                source,
            })?;

        chunks.push(DocumentChunk {
            content: doc.content,
            source_id: doc.source_id,
            source_type: doc.source_type,
            embedding,
        });

        if (index + 1) % 25 == 0 {
            tracing::info!(done = index + 1, total, "Embedding progress");
        }
    }

    Ok(VectorIndex::new(chunks))
}
