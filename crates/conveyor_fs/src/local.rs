//! Local filesystem store.

use crate::error::{FsError, FsResult};
use crate::store::{BoxReader, BoxWriter, Store};
use async_trait::async_trait;
use std::path::Path;

/// Storage client over the local filesystem.
///
/// Serves plain paths and `file://` URLs. Write-open of a path whose
/// parent directory does not exist is retried exactly once after
/// creating the missing parents; a second failure is fatal.
#[derive(Debug, Default)]
pub struct LocalStore;

impl LocalStore {
    /// Create a new local store
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Strip a `file://` prefix if present
    fn local_path(path: &str) -> &str {
        path.strip_prefix("file://").unwrap_or(path)
    }
}

#[async_trait]
impl Store for LocalStore {
    fn schemes(&self) -> &[&str] {
        &["", "file"]
    }

    async fn open(&self, path: &str) -> FsResult<BoxReader> {
        let local = Self::local_path(path);
        let file = tokio::fs::File::open(local)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(Box::pin(file))
    }

    async fn create(&self, path: &str) -> FsResult<BoxWriter> {
        let local = Self::local_path(path);
        let file = match tokio::fs::File::create(local).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = Path::new(local).parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| FsError::from_io(path, e))?;
                }
                tokio::fs::File::create(local)
                    .await
                    .map_err(|e| FsError::from_io(path, e))?
            }
            Err(e) => return Err(FsError::from_io(path, e)),
        };
        Ok(Box::pin(file))
    }

    async fn is_file(&self, path: &str) -> FsResult<bool> {
        let local = Self::local_path(path).trim_end_matches('/');
        match tokio::fs::metadata(local).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    async fn is_dir(&self, path: &str) -> FsResult<bool> {
        let local = Self::local_path(path).trim_end_matches('/');
        match tokio::fs::metadata(local).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    async fn size(&self, path: &str) -> FsResult<u64> {
        let local = Self::local_path(path);
        let meta = tokio::fs::metadata(local)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        if meta.is_dir() {
            // Directories have no file size; the facade's stat fallback
            // decides whether directory-ness is acceptable.
            return Err(FsError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(meta.len())
    }

    async fn list(&self, path: &str) -> FsResult<Vec<String>> {
        let local = Self::local_path(path);
        let mut dir = tokio::fs::read_dir(local)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(path, e))?
        {
            entries.push(entry.path().to_string_lossy().into_owned());
        }
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        tokio::fs::create_dir(Self::local_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        tokio::fs::remove_file(Self::local_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn remove_tree(&self, path: &str) -> FsResult<()> {
        tokio::fs::remove_dir_all(Self::local_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))
    }
}
