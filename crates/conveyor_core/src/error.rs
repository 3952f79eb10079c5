//! Core error types for Conveyor.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A URL scheme the active backend cannot serve
    #[error("Unsupported scheme '{scheme}' for path: {path}")]
    UnsupportedScheme {
        /// The offending scheme
        scheme: String,
        /// The full path as supplied
        path: String,
    },
}
