//! Error types for the manifest store.

use keel_content::ContentError;
use keel_types::{ContentId, EntryId};

/// Errors that can occur in the committed manifest store.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Failed to read a manifest blob from the content store.
    #[error("error loading manifest content: {0}")]
    LoadContent(#[source] ContentError),

    /// Failed to write a manifest blob to the content store.
    #[error("unable to write content: {0}")]
    WriteContent(#[source] ContentError),

    /// Failed to write an entry's indirect payload blob (format V1).
    #[error("writing manifest content for manifest {id}: {source}")]
    WriteIndirectContent {
        /// Entry whose payload failed to write.
        id: EntryId,
        #[source]
        source: ContentError,
    },

    /// Failed to delete a superseded manifest blob during compaction.
    #[error("unable to delete content {content_id}: {source}")]
    DeleteContent {
        /// Blob that could not be deleted.
        content_id: ContentId,
        #[source]
        source: ContentError,
    },

    /// Failed to flush the content store after auto-compaction.
    #[error("unable to flush contents after auto-compaction: {0}")]
    Flush(#[source] ContentError),

    /// Auto-compaction after a load failed.
    #[error("error auto-compacting contents: {0}")]
    AutoCompact(#[source] Box<ManifestError>),

    /// Writing a batch in the configured format failed.
    #[error("writing manifests in v{version} format: {source}")]
    WriteFormat {
        /// Format version being written.
        version: u8,
        #[source]
        source: Box<ManifestError>,
    },

    /// A specific manifest blob failed to decode.
    #[error("unable to parse manifest {content_id}: {source}")]
    Parse {
        /// Blob that failed to decode.
        content_id: ContentId,
        #[source]
        source: Box<ManifestError>,
    },

    /// A manifest could not be serialized.
    #[error("unable to encode manifest: {0}")]
    Encode(String),

    /// A manifest byte stream deviated from the expected structure.
    #[error("malformed manifest: {0}")]
    Malformed(String),

    /// The manager was configured with a format version it cannot write.
    #[error("unsupported format version: {0}")]
    UnsupportedFormatVersion(u8),
}

impl ManifestError {
    /// Whether the root cause is a missing blob in the content store.
    ///
    /// A reload that hits this lost a race with a concurrent compactor and
    /// retries the whole iteration; a compaction delete that hits it treats
    /// the blob as already gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::LoadContent(source) | Self::WriteContent(source) | Self::Flush(source) => {
                source.is_not_found()
            }
            Self::WriteIndirectContent { source, .. } | Self::DeleteContent { source, .. } => {
                source.is_not_found()
            }
            Self::AutoCompact(source)
            | Self::WriteFormat { source, .. }
            | Self::Parse { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
