//! Live vector index and context retrieval.
//!
//! Readers clone the current `Arc<VectorIndex>` and search it without
//! holding any lock. Writers (learning, reindex, reload) are serialised by
//! a separate mutex, build a complete new index, persist it, and only then
//! swap the shared pointer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{broadcast, Mutex, RwLock};

use ppid_core::embeddings::EmbeddingBackend;
use ppid_core::models::{DocumentChunk, SourceType};
use ppid_ingest::{build_index, IngestError, IngestReport, RecursiveSplitter, VectorIndex};

/// Query used to sample the index when proposing likely questions.
pub const SAMPLE_QUERY: &str = "apa saja layanan yang tersedia";

pub const LEARNING_SOURCE: &str = "admin-training";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learned {
    Stored,
    Failed,
    TimedOut,
}

pub struct Retriever {
    index: RwLock<Arc<VectorIndex>>,
    writer: Mutex<()>,
    embedder: Arc<dyn EmbeddingBackend>,
    path: PathBuf,
    top_k: usize,
    loaded_mtime: Mutex<Option<SystemTime>>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, path: impl Into<PathBuf>, top_k: usize) -> Self {
        Self {
            index: RwLock::new(Arc::new(VectorIndex::default())),
            writer: Mutex::new(()),
            embedder,
            path: path.into(),
            top_k,
            loaded_mtime: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn current(&self) -> Arc<VectorIndex> {
        self.index.read().await.clone()
    }

    pub async fn chunk_count(&self) -> usize {
        self.current().await.len()
    }

    async fn swap(&self, next: VectorIndex) {
        *self.index.write().await = Arc::new(next);
    }

    async fn file_mtime(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
    }

    async fn note_mtime(&self) {
        *self.loaded_mtime.lock().await = self.file_mtime().await;
    }

    /// Formatted context for `text`, or an empty string when the index is
    /// empty or the query cannot be embedded.
    pub async fn query(&self, text: &str) -> String {
        let index = self.current().await;
        if index.is_empty() {
            return String::new();
        }

        let embedding = match self.embedder.embed_query(text).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed, answering without context");
                return String::new();
            }
        };

        let hits = index.search(&embedding, self.top_k);
        format_context(hits.iter().map(|(chunk, _)| *chunk))
    }

    /// Teach one question/answer pair. Returns `false` when the pair could
    /// not be embedded or persisted; the live index is unchanged then.
    pub async fn add_learning_data(&self, question: &str, answer: &str) -> bool {
        self.learn(question, answer, None).await == Learned::Stored
    }

    /// Like [`Retriever::add_learning_data`], with `embed_limit` bounding
    /// only the embedding call. Once the pair is embedded the save and the
    /// swap always run together, so the file and the live index agree.
    pub async fn learn(&self, question: &str, answer: &str, embed_limit: Option<Duration>) -> Learned {
        let content = format!("Pertanyaan: {}\nJawaban: {}", question.trim(), answer.trim());
        let embedded = match embed_limit {
            Some(limit) => match tokio::time::timeout(limit, self.embedder.embed(&content)).await {
                Ok(r) => r,
                Err(_) => {
                    tracing::warn!(limit = ?limit, "Embedding learning pair timed out");
                    return Learned::TimedOut;
                }
            },
            None => self.embedder.embed(&content).await,
        };
        let embedding = match embedded {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "Failed to embed learning pair");
                return Learned::Failed;
            }
        };

        let _guard = self.writer.lock().await;
        let next = self.current().await.with_chunk(DocumentChunk {
            content,
            source_id: LEARNING_SOURCE.to_string(),
            source_type: SourceType::Faq,
            embedding,
        });

        if let Err(e) = next.save(&self.path).await {
            tracing::error!(error = %e, "Failed to persist learning pair");
            return Learned::Failed;
        }
        self.swap(next).await;
        self.note_mtime().await;
        tracing::info!("Learned new question/answer pair");
        Learned::Stored
    }

    /// Replace the live index with the file on disk. `Ok(false)` when no
    /// index has been built yet.
    pub async fn reload(&self) -> Result<bool, IngestError> {
        let _guard = self.writer.lock().await;
        match VectorIndex::load(&self.path).await? {
            Some(index) => {
                tracing::info!(chunks = index.len(), "Vector index loaded");
                self.swap(index).await;
                self.note_mtime().await;
                Ok(true)
            }
            None => {
                tracing::warn!(path = %self.path.display(), "Vector index not built yet");
                Ok(false)
            }
        }
    }

    /// Reload when the index file changed since it was last loaded or
    /// written here, e.g. after an out-of-process ingestion run.
    pub async fn refresh_if_stale(&self) -> Result<bool, IngestError> {
        let on_disk = self.file_mtime().await;
        if on_disk.is_none() || on_disk == *self.loaded_mtime.lock().await {
            return Ok(false);
        }
        tracing::info!("Vector index changed on disk, reloading");
        self.reload().await
    }

    /// Rebuild from the documents folder in-process. Learning writes wait
    /// for the rebuild, so no taught pair is lost to the swap.
    pub async fn reindex(
        &self,
        docs_folder: &Path,
        splitter: &RecursiveSplitter,
    ) -> Result<IngestReport, IngestError> {
        let _guard = self.writer.lock().await;
        let (index, report) = build_index(docs_folder, splitter, self.embedder.as_ref()).await?;
        index.save(&self.path).await?;
        self.swap(index).await;
        self.note_mtime().await;
        Ok(report)
    }
}

pub async fn run_refresh_loop(
    retriever: Arc<Retriever>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("Index refresh loop started (interval: {}s)", every.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = retriever.refresh_if_stale().await {
                    tracing::error!(error = %e, "Index refresh failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Index refresh loop shutting down");
                break;
            }
        }
    }
}

/// Knowledge chunks first, labelled by source, then chat-history chunks as
/// style examples.
pub fn format_context<'a>(hits: impl IntoIterator<Item = &'a DocumentChunk>) -> String {
    let (style, knowledge): (Vec<&DocumentChunk>, Vec<&DocumentChunk>) = hits
        .into_iter()
        .partition(|c| c.source_type.is_style_example());

    let mut out = String::new();
    if !knowledge.is_empty() {
        out.push_str("--- [SUMBER INFORMASI UTAMA] ---\n");
        let docs: Vec<String> = knowledge
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[Dokumen {}: {}]\n{}", i + 1, c.source_id, c.content.trim()))
            .collect();
        out.push_str(&docs.join("\n\n"));
    }
    if !style.is_empty() {
        out.push_str("\n\n--- [CONTOH GAYA BAHASA / PERCAKAPAN LALU] ---\n");
        let examples: Vec<&str> = style.iter().map(|c| c.content.trim()).collect();
        out.push_str(&examples.join("\n\n---\n\n"));
    }
    out.trim_start().to_string()
}
