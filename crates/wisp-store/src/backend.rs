//! Series storage backends.
//!
//! [`FileBackend`] stores one file per metric under a Graphite-style
//! layout: key `a.b.c` maps to `{base_dir}/a/b/c.wsp`.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use wisp_types::MetricStat;

use crate::error::StoreError;

/// File extension for metric series files.
const SERIES_EXT: &str = "wsp";

/// Trait for storing and retrieving whole metric series files.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Payloads are [`Bytes`] so handlers can pass file contents around without
/// copying.
#[async_trait::async_trait]
pub trait SeriesBackend: Send + Sync {
    /// Stat a metric's backing file. `NotFound` if absent.
    async fn stat(&self, key: &str) -> Result<MetricStat, StoreError>;

    /// Read a metric's raw backing bytes. `NotFound` if absent.
    async fn read(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Write (full overwrite) a metric's backing bytes, creating any
    /// missing directory structure.
    async fn write(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Remove a metric's backing file.
    ///
    /// Deleting an absent metric is `NotFound`, not a no-op: a caller
    /// deleting something already gone is an error state worth surfacing.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Scan the backend and return every stored metric key.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// File-based series backend with a Graphite-style directory layout.
///
/// Writes are atomic: data goes to a temporary file in the target
/// directory, then is renamed into place, so a crash never leaves a
/// half-written series visible.
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Map a metric key to its file path.
    ///
    /// Rejects keys with empty components or path-meaningful characters,
    /// which also guards against traversal out of `base_dir`.
    fn metric_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::validation("empty metric key"));
        }

        let mut path = self.base_dir.clone();
        for part in key.split('.') {
            if part.is_empty() {
                return Err(StoreError::validation(format!(
                    "metric key {key:?} has an empty component"
                )));
            }
            if part.contains(['/', '\\']) || part == ".." {
                return Err(StoreError::validation(format!(
                    "metric key {key:?} has a path-like component"
                )));
            }
            path.push(part);
        }
        path.set_extension(SERIES_EXT);
        Ok(path)
    }
}

#[async_trait::async_trait]
impl SeriesBackend for FileBackend {
    async fn stat(&self, key: &str) -> Result<MetricStat, StoreError> {
        let path = self.metric_path(key)?;
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mod_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(MetricStat {
            name: key.to_string(),
            size: meta.len(),
            mode: file_mode(&meta),
            mod_time,
        })
    }

    async fn read(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.metric_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = self.metric_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: temp file in the same directory, then rename.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(metric = %key, size = data.len(), "wrote series file");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.metric_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(metric = %key, "deleted series file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.base_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(SERIES_EXT)
                {
                    if let Some(key) = self.path_to_key(&path) {
                        keys.push(key);
                    }
                }
            }
        }

        Ok(keys)
    }
}

impl FileBackend {
    /// Map a file path back to its metric key; `None` for paths that do
    /// not belong to this backend's layout.
    fn path_to_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_dir).ok()?;
        let rel = rel.with_extension("");
        let parts: Vec<&str> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("."))
    }
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> u32 {
    0
}
