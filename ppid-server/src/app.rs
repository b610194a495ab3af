//! Composition root shared by the dispatcher, the operator router and the
//! HTTP API.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{broadcast, RwLock};

use ppid_core::embeddings::{create_backend, EmbeddingBackend};
use ppid_core::generation::build_generator;
use ppid_core::ipc::OperatorEvent;
use ppid_core::models::{Settings, SettingsPatch};
use ppid_core::store::{read_json_file, write_json_atomic};
use ppid_core::{PpidConfig, StoreError};
use ppid_ingest::RecursiveSplitter;

use crate::subsystems::curation::Curation;
use crate::subsystems::governor::Governor;
use crate::subsystems::intent::{IntentClassifier, PhraseClassifier};
use crate::subsystems::recap::RecapLog;
use crate::subsystems::responder::Responder;
use crate::subsystems::retriever::Retriever;
use crate::subsystems::sessions::SessionStore;
use crate::transport::{GatewayTransport, Transport};

pub use crate::subsystems::responder::GeneratorFactory;

const EVENT_CAPACITY: usize = 256;

/// Collaborators that differ between production and tests.
pub struct AppDeps {
    pub transport: Arc<dyn Transport>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub generator_factory: GeneratorFactory,
}

pub struct App {
    pub config: PpidConfig,
    pub sessions: SessionStore,
    pub governor: Governor,
    pub retriever: Arc<Retriever>,
    pub responder: Responder,
    pub recaps: RecapLog,
    pub curation: Curation,
    pub intents: Box<dyn IntentClassifier>,
    pub transport: Arc<dyn Transport>,
    settings: RwLock<Settings>,
    settings_path: PathBuf,
    generator_factory: GeneratorFactory,
    events: broadcast::Sender<OperatorEvent>,
    running: AtomicBool,
}

async fn load_settings(path: &std::path::Path) -> Settings {
    match read_json_file::<Settings>(path).await {
        Ok(Some(s)) => s,
        Ok(None) => Settings::default(),
        Err(e) => {
            tracing::error!(error = %e, "Settings unreadable, using defaults");
            Settings::default()
        }
    }
}

impl App {
    /// Production wiring: gateway transport, configured embedding backend and
    /// provider selection from settings.
    pub async fn bootstrap(config: PpidConfig) -> anyhow::Result<Arc<Self>> {
        let settings = load_settings(&config.data_dir().join("settings.json")).await;

        let embedder: Arc<dyn EmbeddingBackend> = Arc::from(
            create_backend(&config.embedding, settings.gemini_api_key.clone())
                .context("embedding backend")?,
        );
        let transport = Arc::new(
            GatewayTransport::new(
                &config.transport.gateway_url,
                Duration::from_secs(config.operator.command_timeout_seconds),
            )
            .context("gateway transport")?,
        );
        let generation = config.generation.clone();
        let generator_factory: GeneratorFactory =
            Arc::new(move |settings: &Settings| build_generator(&generation, settings));

        Self::build(
            config,
            AppDeps {
                transport,
                embedder,
                generator_factory,
            },
        )
        .await
    }

    /// Load persisted state and assemble the subsystems.
    pub async fn build(config: PpidConfig, deps: AppDeps) -> anyhow::Result<Arc<Self>> {
        let data_dir = config.data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let settings_path = data_dir.join("settings.json");
        let settings = load_settings(&settings_path).await;
        let generator = (deps.generator_factory)(&settings).context("text generator")?;

        let sessions = SessionStore::new(config.conversation.clone(), data_dir.join("sessions.json"));
        sessions.restore().await;

        let retriever = Arc::new(Retriever::new(
            deps.embedder,
            config.index_path(),
            config.rag.top_k,
        ));
        if let Err(e) = retriever.reload().await {
            tracing::error!(error = %e, "Vector index unreadable, starting without context");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Arc::new(Self {
            governor: Governor::new(config.pacing.clone()),
            responder: Responder::new(
                generator,
                Duration::from_secs(config.generation.timeout_seconds),
            ),
            recaps: RecapLog::new(&data_dir, config.conversation.recap_retention),
            curation: Curation::new(&data_dir),
            intents: Box::new(PhraseClassifier::from_config(&config.intents)),
            transport: deps.transport,
            sessions,
            retriever,
            settings: RwLock::new(settings),
            settings_path,
            generator_factory: deps.generator_factory,
            events,
            running: AtomicBool::new(true),
            config,
        }))
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Merge, persist, then reselect the generation provider. A provider
    /// that cannot be built keeps the previous one.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, StoreError> {
        let next = {
            let mut guard = self.settings.write().await;
            let mut next = guard.clone();
            next.merge(patch);
            write_json_atomic(&self.settings_path, &next).await?;
            *guard = next.clone();
            next
        };

        match (self.generator_factory)(&next) {
            Ok(generator) => self.responder.set_generator(generator).await,
            Err(e) => tracing::warn!(error = %e, "Keeping previous text generator"),
        }
        Ok(next)
    }

    /// Fan out to subscribed consoles. No subscribers is not an error.
    pub fn emit(&self, event: OperatorEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperatorEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn splitter(&self) -> RecursiveSplitter {
        RecursiveSplitter::new(self.config.rag.chunk_size, self.config.rag.chunk_overlap)
    }

    pub fn operator_timeout(&self) -> Duration {
        Duration::from_secs(self.config.operator.command_timeout_seconds)
    }
}
