//! In-memory content-store backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use keel_types::{Compression, ContentId};
use tracing::debug;

use crate::error::ContentError;
use crate::traits::ContentStore;

/// In-memory content store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for repositories configured to run in
/// memory-only mode. The revision counter advances on every successful
/// write or delete. Blobs are stored verbatim; at-rest compression is a
/// concern of durable backends, so the [`Compression`] hint is ignored.
pub struct MemoryContentStore {
    contents: RwLock<HashMap<ContentId, Bytes>>,
    revision: AtomicI64,
    read_only: AtomicBool,
    index_flush_depth: AtomicU64,
    flush_count: AtomicU64,
}

impl MemoryContentStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self {
            contents: RwLock::new(HashMap::new()),
            revision: AtomicI64::new(0),
            read_only: AtomicBool::new(false),
            index_flush_depth: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        }
    }

    /// Switch the store between writable and read-only modes.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    /// Number of blobs currently stored (all prefixes).
    pub fn content_count(&self) -> usize {
        self.contents.read().expect("lock poisoned").len()
    }

    /// Current index-flush suspension depth; zero means flushes are enabled.
    pub fn index_flush_depth(&self) -> u64 {
        self.index_flush_depth.load(Ordering::Relaxed)
    }

    /// Number of [`flush`](ContentStore::flush) calls observed.
    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    fn check_writable(&self) -> Result<(), ContentError> {
        if self.read_only.load(Ordering::Relaxed) {
            return Err(ContentError::ReadOnly);
        }
        Ok(())
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_content(&self, id: ContentId) -> Result<Bytes, ContentError> {
        let map = self.contents.read().expect("lock poisoned");
        map.get(&id).cloned().ok_or(ContentError::NotFound(id))
    }

    async fn write_content(
        &self,
        data: Bytes,
        prefix: u8,
        _compression: Compression,
    ) -> Result<ContentId, ContentError> {
        self.check_writable()?;

        let id = ContentId::from_data(prefix, &data);
        debug!(%id, size = data.len(), "storing content in memory");

        let mut map = self.contents.write().expect("lock poisoned");
        map.insert(id, data);
        self.revision.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    async fn delete_content(&self, id: ContentId) -> Result<(), ContentError> {
        self.check_writable()?;

        let mut map = self.contents.write().expect("lock poisoned");
        if map.remove(&id).is_none() {
            return Err(ContentError::NotFound(id));
        }

        debug!(%id, "deleted content from memory");
        self.revision.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn list_contents(&self, prefix: u8) -> Result<Vec<ContentId>, ContentError> {
        let map = self.contents.read().expect("lock poisoned");
        Ok(map.keys().filter(|id| id.prefix() == prefix).copied().collect())
    }

    async fn flush(&self) -> Result<(), ContentError> {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn disable_index_flush(&self) {
        self.index_flush_depth.fetch_add(1, Ordering::Relaxed);
        debug!("index flush disabled");
    }

    fn enable_index_flush(&self) {
        self.index_flush_depth.fetch_sub(1, Ordering::Relaxed);
        debug!("index flush enabled");
    }

    fn revision(&self) -> i64 {
        self.revision.load(Ordering::Relaxed)
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }
}
