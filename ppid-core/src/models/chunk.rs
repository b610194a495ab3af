use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Pdf,
    Markdown,
    ChatHistory,
    Faq,
}

impl SourceType {
    /// Chat-history chunks are style examples, everything else is knowledge.
    pub fn is_style_example(&self) -> bool {
        matches!(self, SourceType::ChatHistory)
    }
}

/// A slice of source text before embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub content: String,
    pub source_id: String,
    pub source_type: SourceType,
}

/// An embedded chunk as stored in the vector index file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub source_id: String,
    pub source_type: SourceType,
    pub embedding: Vec<f32>,
}
