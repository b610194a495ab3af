//! Flat JSON file persistence.
//!
//! Every collection lives in one human-readable JSON file under the data
//! directory. Writes go to a sibling `.tmp` file which is then renamed over
//! the target, so a crash mid-write leaves the previous version intact.
//! A missing file is an empty collection; malformed content is logged and
//! reads fail closed.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let data = match tokio::fs::read(path).await {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| StoreError::Malformed {
            path: path.display().to_string(),
            source: e,
        })
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Repository over a JSON array file. Read-modify-write cycles through
/// [`JsonRepository::update`] are serialised within the process.
pub struct JsonRepository<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonRepository<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict load: missing file is empty, malformed content is an error.
    pub async fn try_load(&self) -> Result<Vec<T>, StoreError> {
        Ok(read_json_file(&self.path).await?.unwrap_or_default())
    }

    /// Lenient load for read paths: any failure is logged and yields empty.
    pub async fn load(&self) -> Vec<T> {
        match self.try_load().await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load collection, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.path, items).await
    }

    /// Load, mutate and persist under the write lock. Malformed content is
    /// never overwritten: the error is returned and the file left alone.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.try_load().await?;
        let result = f(&mut items);
        write_json_atomic(&self.path, &items).await?;
        Ok(result)
    }
}
