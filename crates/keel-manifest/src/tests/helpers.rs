//! Shared test utilities for keel-manifest tests.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use keel_content::{ContentError, ContentStore, MemoryContentStore};
use keel_types::{Compression, ContentId, EntryId};

use crate::{CommittedManifestManager, ManagerOptions, ManifestEntry};

pub fn ts(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// A live entry labeled `type=<typ>` carrying the given raw JSON payload.
pub fn entry(id: &str, typ: &str, time: &str, data: &str) -> ManifestEntry {
    ManifestEntry::new(id, labels(&[("type", typ)]), ts(time), data.as_bytes().to_vec())
}

pub fn tombstone(id: &str, time: &str) -> ManifestEntry {
    ManifestEntry::tombstone(id, ts(time))
}

pub fn batch(entries: impl IntoIterator<Item = ManifestEntry>) -> HashMap<EntryId, ManifestEntry> {
    entries
        .into_iter()
        .map(|entry| (entry.id.clone(), entry))
        .collect()
}

pub fn options(format_version: u8) -> ManagerOptions {
    ManagerOptions {
        format_version,
        ..ManagerOptions::default()
    }
}

/// Create a manager over a fresh in-memory store.
pub fn new_manager(
    format_version: u8,
) -> (Arc<CommittedManifestManager>, Arc<MemoryContentStore>) {
    let store = Arc::new(MemoryContentStore::new());
    let manager = new_manager_with(store.clone(), options(format_version));
    (manager, store)
}

pub fn new_manager_with(
    store: Arc<dyn ContentStore>,
    options: ManagerOptions,
) -> Arc<CommittedManifestManager> {
    Arc::new(CommittedManifestManager::new(store, options))
}

/// Fault-injecting wrapper around [`MemoryContentStore`].
///
/// Write and delete failures simulate content-store I/O errors; the
/// phantom blob simulates a concurrent compactor deleting a listed blob
/// before it could be fetched.
pub struct FlakyContentStore {
    inner: MemoryContentStore,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    phantom: Mutex<Option<ContentId>>,
    list_calls: AtomicU64,
}

impl FlakyContentStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryContentStore::new(),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            phantom: Mutex::new(None),
            list_calls: AtomicU64::new(0),
        }
    }

    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::Relaxed);
    }

    pub fn set_fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::Relaxed);
    }

    /// Report `id` in the next listing even though it is not stored.
    pub fn set_phantom(&self, id: ContentId) {
        *self.phantom.lock().unwrap() = Some(id);
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &MemoryContentStore {
        &self.inner
    }

    fn injected(kind: &str) -> ContentError {
        ContentError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("injected {kind} failure"),
        ))
    }
}

#[async_trait::async_trait]
impl ContentStore for FlakyContentStore {
    async fn get_content(&self, id: ContentId) -> Result<Bytes, ContentError> {
        self.inner.get_content(id).await
    }

    async fn write_content(
        &self,
        data: Bytes,
        prefix: u8,
        compression: Compression,
    ) -> Result<ContentId, ContentError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Self::injected("write"));
        }
        self.inner.write_content(data, prefix, compression).await
    }

    async fn delete_content(&self, id: ContentId) -> Result<(), ContentError> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete_content(id).await
    }

    async fn list_contents(&self, prefix: u8) -> Result<Vec<ContentId>, ContentError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        let mut ids = self.inner.list_contents(prefix).await?;
        if let Some(phantom) = self.phantom.lock().unwrap().take() {
            if phantom.prefix() == prefix {
                ids.push(phantom);
            }
        }
        Ok(ids)
    }

    async fn flush(&self) -> Result<(), ContentError> {
        self.inner.flush().await
    }

    fn disable_index_flush(&self) {
        self.inner.disable_index_flush();
    }

    fn enable_index_flush(&self) {
        self.inner.enable_index_flush();
    }

    fn revision(&self) -> i64 {
        self.inner.revision()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }
}
