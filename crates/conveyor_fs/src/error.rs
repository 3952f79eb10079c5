//! Storage error types.
//!
//! Underlying not-found and permission errors propagate unchanged
//! through the facade; the only recovery anywhere in this crate is the
//! one-shot parent-directory retry on local write-open.

/// Storage result type
pub type FsResult<T> = Result<T, FsError>;

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Object or directory not found
    #[error("Not found: {path}")]
    NotFound {
        /// The path that failed to resolve
        path: String,
    },

    /// Permission denied by the underlying store
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// The path access was denied to
        path: String,
    },

    /// A URL scheme no registered store serves
    #[error("Unsupported scheme '{scheme}' for path: {path}")]
    UnsupportedScheme {
        /// The offending scheme
        scheme: String,
        /// The full path as supplied
        path: String,
    },

    /// Stream ended before the requested byte count was available
    #[error("Short read: wanted {wanted} bytes, stream ended after {got}")]
    ShortRead {
        /// Bytes the caller required
        wanted: usize,
        /// Bytes actually delivered
        got: usize,
    },

    /// Seeking on storage streams is not supported
    #[error("Seek is not supported on storage streams")]
    SeekUnsupported,

    /// Stream was already closed
    #[error("Stream already closed: {path}")]
    Closed {
        /// The stream's path
        path: String,
    },

    /// Text-mode stream carried bytes that are not valid UTF-8
    #[error("Invalid UTF-8 in text stream {path} at byte {offset}")]
    InvalidUtf8 {
        /// The stream's path
        path: String,
        /// Byte offset of the first invalid sequence
        offset: usize,
    },

    /// Event-loop construction failed
    #[error("Failed to start storage event loop: {reason}")]
    Runtime {
        /// Why the runtime could not be built
        reason: String,
    },

    /// Any other I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being operated on
        path: String,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Classify an [`std::io::Error`] for `path` into the facade taxonomy.
    #[must_use]
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_string(),
            },
            _ => Self::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

impl From<FsError> for std::io::Error {
    fn from(err: FsError) -> Self {
        let kind = match &err {
            FsError::NotFound { .. } => std::io::ErrorKind::NotFound,
            FsError::PermissionDenied { .. } => std::io::ErrorKind::PermissionDenied,
            FsError::ShortRead { .. } => std::io::ErrorKind::UnexpectedEof,
            FsError::SeekUnsupported => std::io::ErrorKind::Unsupported,
            FsError::Io { source, .. } => source.kind(),
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = FsError::from_io("/tmp/x", io);
        assert!(matches!(err, FsError::NotFound { .. }));
    }

    #[test]
    fn test_from_io_permission() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        let err = FsError::from_io("/tmp/x", io);
        assert!(matches!(err, FsError::PermissionDenied { .. }));
    }

    #[test]
    fn test_short_read_distinct_from_not_found() {
        let err = FsError::ShortRead { wanted: 10, got: 4 };
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_seek_unsupported_display() {
        let err = FsError::SeekUnsupported;
        assert!(err.to_string().contains("not supported"));
    }
}
