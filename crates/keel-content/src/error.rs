//! Error types for content-store operations.

use keel_types::ContentId;

/// Errors that can occur during content-store operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// The requested content was not found.
    #[error("content not found: {0}")]
    NotFound(ContentId),

    /// The store was opened in read-only mode.
    #[error("content store is read-only")]
    ReadOnly,

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContentError {
    /// Whether this error is a missing-content error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::NotFound(_))
    }
}
