//! The committed manifest manager and its compactor.
//!
//! One manager instance may be called concurrently from many tasks; a
//! single mutex protects the whole in-memory view and is held across
//! content-store calls during writes and compaction. Those operations are
//! infrequent and serialized by design, so simplicity wins over
//! throughput here.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use keel_content::{ContentError, ContentStore};
use keel_types::{ContentId, EntryId};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::codec::decode_manifest;
use crate::config::ManagerOptions;
use crate::entry::{Manifest, ManifestEntry};
use crate::error::ManifestError;
use crate::format::{write_entries_v0, write_entries_v1};
use crate::MANIFEST_CONTENT_PREFIX;

/// Manages committed manifest entries stored in manifest blobs.
///
/// The manager lazily loads all current manifest blobs on first use and
/// whenever the content store's revision counter has advanced, merging
/// them into a committed view keyed by entry id. Lookups never see a view
/// older than one operation; commits on the same manager are visible to
/// every subsequent lookup on it.
pub struct CommittedManifestManager {
    store: Arc<dyn ContentStore>,
    format_version: u8,
    auto_compaction_threshold: usize,
    load_parallelism: usize,
    ignore_malformed: bool,
    debug_tag: Option<String>,
    state: Mutex<CommittedState>,
}

/// The in-memory committed view. Only touched under the manager mutex.
pub(crate) struct CommittedState {
    /// Content-store revision the view was loaded at.
    last_revision: Option<i64>,
    /// Latest non-tombstoned entry per id.
    pub(crate) entries: HashMap<EntryId, Arc<ManifestEntry>>,
    /// Manifest blobs contributing to the committed view.
    pub(crate) content_ids: HashSet<ContentId>,
}

impl CommittedManifestManager {
    /// Create a manager over the given content store.
    pub fn new(store: Arc<dyn ContentStore>, options: ManagerOptions) -> Self {
        Self {
            store,
            format_version: options.format_version,
            auto_compaction_threshold: options.auto_compaction_threshold,
            load_parallelism: options.load_parallelism.max(1),
            ignore_malformed: options.ignore_malformed,
            debug_tag: options.debug_tag,
            state: Mutex::new(CommittedState {
                last_revision: None,
                entries: HashMap::new(),
                content_ids: HashSet::new(),
            }),
        }
    }

    /// Look up the committed entry with the given id, if any.
    ///
    /// Tombstoned entries are reported as absent.
    pub async fn get(&self, id: &EntryId) -> Result<Option<Arc<ManifestEntry>>, ManifestError> {
        let mut state = self.state.lock().await;
        self.ensure_initialized_locked(&mut state).await?;

        Ok(state.entries.get(id).cloned())
    }

    /// Return all committed entries whose labels are a superset of the
    /// given predicate. An empty predicate matches everything.
    pub async fn find(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<HashMap<EntryId, Arc<ManifestEntry>>, ManifestError> {
        let mut state = self.state.lock().await;
        self.ensure_initialized_locked(&mut state).await?;

        Ok(state
            .entries
            .iter()
            .filter(|(_, entry)| entry.matches_labels(labels))
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect())
    }

    /// Write a batch of entries as manifest blobs.
    ///
    /// On success the batch is drained, the entries are visible to every
    /// subsequent [`get`](Self::get)/[`find`](Self::find) on this manager,
    /// and the ids of the newly written blobs (typically one) are
    /// returned. On failure the batch is left untouched so the caller may
    /// retry.
    pub async fn commit(
        &self,
        entries: &mut HashMap<EntryId, ManifestEntry>,
    ) -> Result<HashSet<ContentId>, ManifestError> {
        if entries.is_empty() {
            return Ok(HashSet::new());
        }

        let mut state = self.state.lock().await;
        self.write_entries_locked(&mut state, entries).await
    }

    /// Rewrite the whole committed set into a single manifest blob and
    /// delete the now-redundant originals.
    pub async fn compact(&self) -> Result<(), ManifestError> {
        let mut state = self.state.lock().await;
        self.compact_locked(&mut state).await
    }

    /// Number of manifest blobs backing the current committed view.
    #[cfg(test)]
    pub(crate) async fn committed_content_count(&self) -> usize {
        self.state.lock().await.content_ids.len()
    }

    /// Snapshot of the blob ids backing the current committed view.
    #[cfg(test)]
    pub(crate) async fn committed_content_ids(&self) -> HashSet<ContentId> {
        self.state.lock().await.content_ids.clone()
    }

    async fn ensure_initialized_locked(
        &self,
        state: &mut CommittedState,
    ) -> Result<(), ManifestError> {
        let revision = self.store.revision();
        if state.last_revision == Some(revision) {
            if let Some(tag) = &self.debug_tag {
                debug!(tag = %tag, revision, "committed manifests up to date");
            }
            return Ok(());
        }

        self.load_committed_locked(state).await?;

        // The store may have advanced again while we were reading; keeping
        // the pre-load revision means the next call reloads once more
        // rather than ever serving a view older than one operation.
        state.last_revision = Some(revision);

        self.dump_locked(state, "after initialization");
        Ok(())
    }

    async fn load_committed_locked(
        &self,
        state: &mut CommittedState,
    ) -> Result<(), ManifestError> {
        loop {
            match self.fetch_manifests().await {
                Ok(manifests) => {
                    self.merge_loaded_locked(state, manifests);
                    break;
                }
                // Lost a race with a concurrent compactor that deleted a
                // listed blob before we fetched it. The rewritten blob
                // holds a complete copy, so a fresh iteration succeeds
                // once the racer is quiescent.
                Err(err) if err.is_not_found() => {
                    debug!("manifest content vanished during load, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        self.maybe_compact_locked(state).await
    }

    /// Fetch and decode all manifest blobs, up to `load_parallelism` at a
    /// time. Tasks only produce into the returned collection; no manager
    /// state is touched until the whole fetch has succeeded.
    async fn fetch_manifests(&self) -> Result<Vec<(ContentId, Manifest)>, ManifestError> {
        let ids = self
            .store
            .list_contents(MANIFEST_CONTENT_PREFIX)
            .await
            .map_err(ManifestError::LoadContent)?;

        let mut manifests = Vec::with_capacity(ids.len());
        let mut pending = ids.into_iter();
        let mut tasks = JoinSet::new();

        for content_id in pending.by_ref().take(self.load_parallelism) {
            tasks.spawn(self.load_task(content_id));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Some(pair) = joined.expect("manifest load task panicked")? {
                manifests.push(pair);
            }
            if let Some(content_id) = pending.next() {
                tasks.spawn(self.load_task(content_id));
            }
        }

        Ok(manifests)
    }

    fn load_task(
        &self,
        content_id: ContentId,
    ) -> impl Future<Output = Result<Option<(ContentId, Manifest)>, ManifestError>> + Send + 'static
    {
        let store = Arc::clone(&self.store);
        let ignore_malformed = self.ignore_malformed;

        async move {
            match load_manifest_content(store.as_ref(), content_id).await {
                Ok(man) => Ok(Some((content_id, man))),
                // Lets corrupted repositories still open and expose the
                // (incomplete) set of manifests.
                Err(err) if ignore_malformed => {
                    warn!(%content_id, %err, "ignoring malformed manifest content");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        }
    }

    /// Rebuild the committed view from freshly fetched blobs.
    fn merge_loaded_locked(
        &self,
        state: &mut CommittedState,
        mut manifests: Vec<(ContentId, Manifest)>,
    ) {
        state.entries.clear();
        state.content_ids.clear();

        // Merge in sorted blob order so ties between equal mod times
        // resolve the same way on every reload.
        manifests.sort_by_key(|(content_id, _)| *content_id);

        for (content_id, _) in &manifests {
            state.content_ids.insert(*content_id);
        }

        for (_, man) in manifests {
            for entry in man.entries {
                merge_entry(&mut state.entries, entry);
            }
        }

        // Drop entries whose winning record is a tombstone.
        state.entries.retain(|_, entry| !entry.deleted);
    }

    async fn write_entries_locked(
        &self,
        state: &mut CommittedState,
        entries: &mut HashMap<EntryId, ManifestEntry>,
    ) -> Result<HashSet<ContentId>, ManifestError> {
        if entries.is_empty() {
            return Ok(HashSet::new());
        }

        let written = match self.format_version {
            0 => write_entries_v0(self.store.as_ref(), state, entries).await,
            1 => write_entries_v1(self.store.as_ref(), state, entries).await,
            version => return Err(ManifestError::UnsupportedFormatVersion(version)),
        };

        written.map_err(|source| ManifestError::WriteFormat {
            version: self.format_version,
            source: Box::new(source),
        })
    }

    async fn maybe_compact_locked(
        &self,
        state: &mut CommittedState,
    ) -> Result<(), ManifestError> {
        // A read-only store would just fail the rewrite; skip quietly.
        if self.store.is_read_only() || state.content_ids.len() < self.auto_compaction_threshold {
            return Ok(());
        }

        debug!(
            contents = state.content_ids.len(),
            "performing automatic compaction"
        );

        self.compact_locked(state)
            .await
            .map_err(|err| ManifestError::AutoCompact(Box::new(err)))?;

        self.store.flush().await.map_err(ManifestError::Flush)
    }

    async fn compact_locked(&self, state: &mut CommittedState) -> Result<(), ManifestError> {
        debug!(
            contents = state.content_ids.len(),
            "compacting manifest contents"
        );

        if state.content_ids.len() <= 1 {
            return Ok(());
        }

        // Compaction must be atomic: the rewrite and the deletions have to
        // land in one index blob or not at all, so index flushes stay
        // suspended until we are done on any exit path.
        let _guard = IndexFlushGuard::disable(Arc::clone(&self.store));

        let mut batch: HashMap<EntryId, ManifestEntry> = state
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), ManifestEntry::clone(entry)))
            .collect();

        let written = self.write_entries_locked(state, &mut batch).await?;

        let stale: Vec<ContentId> = state
            .content_ids
            .iter()
            .filter(|content_id| !written.contains(content_id))
            .copied()
            .collect();

        for content_id in stale {
            match self.store.delete_content(content_id).await {
                // A racing compactor got there first; either way it's gone.
                Ok(()) | Err(ContentError::NotFound(_)) => {
                    state.content_ids.remove(&content_id);
                }
                Err(source) => return Err(ManifestError::DeleteContent { content_id, source }),
            }
        }

        Ok(())
    }

    fn dump_locked(&self, state: &CommittedState, prefix: &str) {
        let Some(tag) = &self.debug_tag else { return };

        let mut keys: Vec<&str> = state.entries.keys().map(EntryId::as_str).collect();
        keys.sort_unstable();

        debug!(
            tag = %tag,
            revision = ?state.last_revision,
            count = keys.len(),
            ?keys,
            "{prefix}: committed entries"
        );
    }
}

/// Insert an entry unless a strictly newer one for the same id is already
/// present. Equal mod times keep the existing entry, which together with
/// the sorted merge order makes reloads deterministic.
fn merge_entry(entries: &mut HashMap<EntryId, Arc<ManifestEntry>>, entry: ManifestEntry) {
    match entries.get(&entry.id) {
        Some(prev) if entry.mod_time <= prev.mod_time => {}
        _ => {
            entries.insert(entry.id.clone(), Arc::new(entry));
        }
    }
}

async fn load_manifest_content(
    store: &dyn ContentStore,
    content_id: ContentId,
) -> Result<Manifest, ManifestError> {
    let data = store
        .get_content(content_id)
        .await
        .map_err(ManifestError::LoadContent)?;

    decode_manifest(&data).map_err(|err| ManifestError::Parse {
        content_id,
        source: Box::new(err),
    })
}

/// Suspends content-store index flushes while alive.
///
/// Re-enables on drop, so the pairing holds on every exit path, including
/// panics.
struct IndexFlushGuard {
    store: Arc<dyn ContentStore>,
}

impl IndexFlushGuard {
    fn disable(store: Arc<dyn ContentStore>) -> Self {
        store.disable_index_flush();
        Self { store }
    }
}

impl Drop for IndexFlushGuard {
    fn drop(&mut self) {
        self.store.enable_index_flush();
    }
}
