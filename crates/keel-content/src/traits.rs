//! Core trait for content-addressed blob storage.

use bytes::Bytes;
use keel_types::{Compression, ContentId};

use crate::error::ContentError;

/// Trait for a content-addressed, prefixed, immutable blob store.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Blobs are passed as [`Bytes`] to enable zero-copy transfers.
///
/// Identifiers are deterministic: writing the same bytes under the same
/// prefix always yields the same [`ContentId`], so rewrites deduplicate.
/// The store also exposes a monotonic revision counter that advances on
/// every successful mutation; callers use it to decide whether a cached
/// view of the store is still current.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Read a blob by id. Fails with [`ContentError::NotFound`] if absent.
    async fn get_content(&self, id: ContentId) -> Result<Bytes, ContentError>;

    /// Store a blob under the given prefix byte, returning its
    /// content-addressed identifier.
    async fn write_content(
        &self,
        data: Bytes,
        prefix: u8,
        compression: Compression,
    ) -> Result<ContentId, ContentError>;

    /// Delete a blob by id. Fails with [`ContentError::NotFound`] if absent.
    async fn delete_content(&self, id: ContentId) -> Result<(), ContentError>;

    /// Enumerate all blob ids stored under the given prefix byte.
    ///
    /// The listing is a snapshot: a blob listed here may have been deleted
    /// by the time it is fetched, in which case [`get_content`] reports
    /// [`ContentError::NotFound`] and the caller decides whether to retry.
    ///
    /// [`get_content`]: ContentStore::get_content
    async fn list_contents(&self, prefix: u8) -> Result<Vec<ContentId>, ContentError>;

    /// Persist any buffered index state.
    async fn flush(&self) -> Result<(), ContentError>;

    /// Suspend index flushes. Calls nest; each must be paired with
    /// [`enable_index_flush`](ContentStore::enable_index_flush).
    fn disable_index_flush(&self);

    /// Re-enable index flushes after a matching
    /// [`disable_index_flush`](ContentStore::disable_index_flush).
    fn enable_index_flush(&self);

    /// Monotonic revision counter, advanced on every successful mutation.
    fn revision(&self) -> i64;

    /// Whether the store rejects mutations.
    fn is_read_only(&self) -> bool;
}
