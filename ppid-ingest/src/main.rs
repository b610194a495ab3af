use std::time::Instant;

use clap::Parser;
use ppid_core::PpidConfig;
use tracing_subscriber::{fmt, EnvFilter};

use ppid_ingest::{build_index, RecursiveSplitter};

/// Rebuild the vector index from the documents folder.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "ppid.toml")]
    config: String,

    /// Override `rag.docs_folder`
    #[arg(long)]
    docs: Option<String>,

    /// Load and split only; skip embedding and saving
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match PpidConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let docs_folder = args
        .docs
        .as_deref()
        .map(ppid_core::config::expand_path)
        .unwrap_or_else(|| config.docs_folder());
    let splitter = RecursiveSplitter::new(config.rag.chunk_size, config.rag.chunk_overlap);

    if args.dry_run {
        let docs = ppid_ingest::load_folder(&docs_folder).await?;
        let chunks = splitter.split_documents(docs);
        println!("{} chunks from {}", chunks.len(), docs_folder.display());
        return Ok(());
    }

    let backend = ppid_core::create_backend(&config.embedding, None)?;

    let started = Instant::now();
    let (index, report) = build_index(&docs_folder, &splitter, &*backend).await?;

    if report.chunks == 0 {
        println!("No documents found to index in {}", docs_folder.display());
        return Ok(());
    }

    let index_path = config.index_path();
    index.save(&index_path).await?;

    println!("✅ Ingestion complete");
    println!("   Documents: {}", report.documents);
    println!("   Chunks:    {}", report.chunks);
    println!("   Time:      {:.1}s", started.elapsed().as_secs_f64());
    println!("   Index:     {}", index_path.display());
    Ok(())
}
