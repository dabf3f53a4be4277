//! Source error types.

use thiserror::Error;

/// Errors reported by a [`Source`](crate::Source) or a source factory.
///
/// The `Display` text is what a connected client sees as a diagnostic frame,
/// so two errors with the same text are treated as the same error.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the underlying data failed.
    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
    /// The source reached its permanent end and will never yield more bytes.
    #[error("source exhausted")]
    Exhausted,
    /// A source factory could not produce a replacement source.
    #[error("source factory failed: {0}")]
    Factory(String),
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
