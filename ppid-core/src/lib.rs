pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ipc;
pub mod models;
pub mod store;

pub use config::PpidConfig;
pub use embeddings::{
    create_backend, EmbeddingBackend, EmbeddingError, GeminiEmbeddingClient,
    OllamaEmbeddingClient, GEMINI_DIMENSIONS,
};
pub use error::{PpidError, StoreError};
pub use generation::{build_generator, select_provider, GenerationError, ProviderKind, TextGenerator};
pub use store::JsonRepository;
