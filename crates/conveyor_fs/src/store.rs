//! The asynchronous storage client contract.
//!
//! A `Store` is the narrow interface the facade needs from any storage
//! transport: byte streams in and out, existence and typing probes, and
//! directory manipulation. Implementations are cooperative async; the
//! blocking semantics live entirely in [`crate::sync::SyncFs`].

use crate::error::FsResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed asynchronous readable stream
pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed asynchronous writable stream
pub type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Entry type reported by [`FileStat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// A regular object/file
    File,
    /// A directory (or directory-like prefix)
    Directory,
}

/// Size and type of one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// The path this stat describes
    pub path: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// File or directory
    pub typ: FileType,
}

impl FileStat {
    /// Stat for a regular file
    #[must_use]
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            typ: FileType::File,
        }
    }

    /// Stat for a directory
    #[must_use]
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            typ: FileType::Directory,
        }
    }

    /// Whether this entry is a directory
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.typ == FileType::Directory
    }
}

/// Asynchronous storage client.
///
/// Errors carry the facade taxonomy ([`crate::FsError`]); not-found and
/// permission failures must be reported as such, never flattened into a
/// generic I/O variant.
#[async_trait]
pub trait Store: Send + Sync {
    /// URL schemes this store serves. The empty string means plain
    /// filesystem paths.
    fn schemes(&self) -> &[&str];

    /// Open `path` for reading
    async fn open(&self, path: &str) -> FsResult<BoxReader>;

    /// Open `path` for writing, truncating any existing object
    async fn create(&self, path: &str) -> FsResult<BoxWriter>;

    /// Whether `path` resolves as a regular file
    async fn is_file(&self, path: &str) -> FsResult<bool>;

    /// Whether `path` resolves as a directory
    async fn is_dir(&self, path: &str) -> FsResult<bool>;

    /// Size in bytes of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if `path` is absent or is a directory;
    /// the caller decides whether directory-ness is an acceptable
    /// fallback.
    async fn size(&self, path: &str) -> FsResult<u64>;

    /// List the entry paths directly under `path`
    async fn list(&self, path: &str) -> FsResult<Vec<String>>;

    /// Create the directory at `path` (parents must exist)
    async fn mkdir(&self, path: &str) -> FsResult<()>;

    /// Remove the file at `path`
    async fn remove(&self, path: &str) -> FsResult<()>;

    /// Remove the directory tree rooted at `path`
    async fn remove_tree(&self, path: &str) -> FsResult<()>;
}
