use std::sync::Arc;

use clap::Parser;
use ppid_core::config::expand_path;
use ppid_core::models::Settings;
use ppid_core::store::read_json_file;
use ppid_core::{select_provider, PpidConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use ppid_server::http::{start_http_server, HttpState};
use ppid_server::subsystems::dispatch::Dispatcher;
use ppid_server::subsystems::{escalation, retriever};
use ppid_server::{server, App};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "ppid.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

async fn health_check(config: &PpidConfig) -> bool {
    let mut healthy = true;

    let data_dir = config.data_dir();
    let marker = data_dir.join(".write-check");
    let writable = async {
        tokio::fs::create_dir_all(&data_dir).await?;
        tokio::fs::write(&marker, b"ok").await?;
        tokio::fs::remove_file(&marker).await
    };
    match writable.await {
        Ok(()) => println!("✅ Data dir writable: {}", data_dir.display()),
        Err(e) => {
            println!("❌ Data dir {} not writable: {}", data_dir.display(), e);
            healthy = false;
        }
    }

    let index = config.index_path();
    if index.exists() {
        println!("✅ Vector index present: {}", index.display());
    } else {
        println!("❌ Vector index missing: {} (run ppid-ingest)", index.display());
        healthy = false;
    }

    let settings = read_json_file::<Settings>(&data_dir.join("settings.json"))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let groq = settings
        .groq_api_key
        .clone()
        .or_else(|| std::env::var("GROQ_API_KEY").ok());
    let gemini = settings
        .gemini_api_key
        .clone()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok());
    let preference = settings
        .provider
        .as_deref()
        .unwrap_or(&config.generation.provider);
    match select_provider(preference, groq.as_deref(), gemini.as_deref()) {
        Ok(kind) => println!("✅ Generation provider: {}", kind.as_str()),
        Err(e) => {
            println!("❌ Generation provider unresolved: {}", e);
            healthy = false;
        }
    }

    healthy
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match PpidConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    if args.health {
        if health_check(&config).await {
            println!("✅ PPID health check passed");
            return Ok(());
        }
        std::process::exit(1);
    }

    let app = match App::bootstrap(config).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to start assistant: {:#}", e);
            std::process::exit(1);
        }
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tokio::spawn(escalation::run_sweep_loop(app.clone(), tx.subscribe()));

    tokio::spawn(retriever::run_refresh_loop(
        app.retriever.clone(),
        std::time::Duration::from_secs(app.config.rag.refresh_interval_seconds.max(1)),
        tx.subscribe(),
    ));

    if app.config.http.enabled {
        let state = Arc::new(HttpState {
            app: app.clone(),
            dispatcher: Arc::new(Dispatcher::new(app.clone(), tx.clone())),
        });
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    } else {
        tracing::warn!("HTTP API disabled, no inbound messages will arrive");
    }

    let socket_path = expand_path(&app.config.service.socket_path);
    let result = server::run_unix_server(&socket_path, app.clone(), tx.subscribe()).await;

    // A failed socket bind still has to stop the background tasks
    let _ = tx.send(());
    match app.sessions.snapshot().await {
        Ok(n) => tracing::info!(sessions = n, "Session snapshot flushed"),
        Err(e) => tracing::error!(error = %e, "Failed to flush session snapshot"),
    }

    result
}
