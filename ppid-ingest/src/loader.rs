//! Source folder loading.
//!
//! `.md` files load verbatim, `.pdf` files page by page, `.txt` files are
//! treated as exported chat transcripts. A file that fails to load is
//! logged and skipped so one bad upload never blocks a rebuild.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use ppid_core::models::{RawDocument, SourceType};

use crate::chat_parser;
use crate::error::IngestError;

#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

pub fn classify(path: &Path) -> Option<SourceType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "md" => Some(SourceType::Markdown),
        "pdf" => Some(SourceType::Pdf),
        "txt" => Some(SourceType::ChatHistory),
        _ => None,
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> IngestError + '_ {
    move |source| IngestError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Supported files in `folder`, sorted by name. Missing folder is empty.
async fn source_paths(folder: &Path) -> Result<Vec<(PathBuf, SourceType)>, IngestError> {
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(folder)(e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err(folder))? {
        let path = entry.path();
        if let Some(kind) = classify(&path) {
            paths.push((path, kind));
        }
    }
    paths.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Listing for the operator's ingested-documents view.
pub async fn list_source_files(folder: &Path) -> Result<Vec<SourceFile>, IngestError> {
    let mut files = Vec::new();
    for (path, source_type) in source_paths(folder).await? {
        let meta = tokio::fs::metadata(&path).await.map_err(io_err(&path))?;
        files.push(SourceFile {
            name: file_name(&path),
            source_type,
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    Ok(files)
}

/// Load every supported document under `folder`. Creates the folder when
/// it does not exist yet.
pub async fn load_folder(folder: &Path) -> Result<Vec<RawDocument>, IngestError> {
    if tokio::fs::metadata(folder).await.is_err() {
        tracing::warn!(folder = %folder.display(), "Documents folder not found, creating it");
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(io_err(folder))?;
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for (path, source_type) in source_paths(folder).await? {
        let name = file_name(&path);
        let loaded = match source_type {
            SourceType::Markdown => load_markdown(&path, &name).await.map(|d| vec![d]),
            SourceType::Pdf => load_pdf(&path, &name).await,
            SourceType::ChatHistory => load_chat(&path, &name).await,
            SourceType::Faq => continue,
        };

        match loaded {
            Ok(docs) => {
                tracing::info!(file = %name, units = docs.len(), "Loaded");
                documents.extend(docs);
            }
            Err(e) => tracing::error!(file = %name, error = %e, "Failed to load, skipping"),
        }
    }
    Ok(documents)
}

pub async fn load_markdown(path: &Path, name: &str) -> Result<RawDocument, IngestError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(io_err(path))?;
    Ok(RawDocument {
        content,
        source_id: name.to_string(),
        source_type: SourceType::Markdown,
    })
}

/// One document per page; blank pages are dropped.
pub async fn load_pdf(path: &Path, name: &str) -> Result<Vec<RawDocument>, IngestError> {
    let bytes = tokio::fs::read(path).await.map_err(io_err(path))?;
    let display = path.display().to_string();

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| IngestError::Pdf {
        path: display.clone(),
        message: e.to_string(),
    })?
    .map_err(|message| IngestError::Pdf {
        path: display,
        message,
    })?;

    Ok(pages
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .map(|content| RawDocument {
            content,
            source_id: name.to_string(),
            source_type: SourceType::Pdf,
        })
        .collect())
}

pub async fn load_chat(path: &Path, name: &str) -> Result<Vec<RawDocument>, IngestError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(io_err(path))?;
    Ok(chat_parser::parse_chat(&content, name))
}
