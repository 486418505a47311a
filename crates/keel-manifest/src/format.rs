//! Blob writers for the two manifest serialization formats.
//!
//! Both formats produce a single manifest blob per batch and update the
//! committed state only after the blob write succeeds, so a failed write
//! leaves both the batch and the in-memory view untouched. Format V1
//! additionally spills each entry's payload into its own indirect blob,
//! decoupling index size from payload size: recompacting the index never
//! rewrites payloads.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use keel_content::ContentStore;
use keel_types::{Compression, ContentId, EntryId};

use crate::codec::encode_manifest;
use crate::committed::CommittedState;
use crate::entry::{Manifest, ManifestEntry};
use crate::error::ManifestError;
use crate::{INDIRECT_CONTENT_PREFIX, MANIFEST_CONTENT_PREFIX};

/// Encode and write one manifest blob, returning its id.
pub(crate) async fn write_manifest(
    store: &dyn ContentStore,
    man: &Manifest,
) -> Result<ContentId, ManifestError> {
    let encoded = encode_manifest(man)?;
    store
        .write_content(encoded, MANIFEST_CONTENT_PREFIX, Compression::None)
        .await
        .map_err(ManifestError::WriteContent)
}

/// Write a batch in format V0: payloads stay inline in the manifest blob.
pub(crate) async fn write_entries_v0(
    store: &dyn ContentStore,
    state: &mut CommittedState,
    entries: &mut HashMap<EntryId, ManifestEntry>,
) -> Result<HashSet<ContentId>, ManifestError> {
    let mut man = Manifest::default();
    for entry in entries.values() {
        let mut entry = entry.clone();
        entry.version = 0;
        man.entries.push(entry);
    }

    let content_id = write_manifest(store, &man).await?;

    commit_written(state, man, content_id);
    entries.clear();
    Ok(HashSet::from([content_id]))
}

/// Write a batch in format V1: each payload becomes one indirect blob and
/// only its id stays in the manifest blob.
pub(crate) async fn write_entries_v1(
    store: &dyn ContentStore,
    state: &mut CommittedState,
    entries: &mut HashMap<EntryId, ManifestEntry>,
) -> Result<HashSet<ContentId>, ManifestError> {
    let mut man = Manifest::default();
    for entry in entries.values() {
        let mut entry = entry.clone();

        // Tombstones and payload-less entries get no indirect blob; they
        // exist only to shadow older versions until the next compaction.
        if !entry.deleted && !entry.content.is_empty() {
            let content_id = store
                .write_content(
                    entry.content.clone(),
                    INDIRECT_CONTENT_PREFIX,
                    Compression::None,
                )
                .await
                .map_err(|source| ManifestError::WriteIndirectContent {
                    id: entry.id.clone(),
                    source,
                })?;
            entry.content_id = Some(content_id);
        }

        entry.version = 1;
        // The index blob never carries payloads in this format.
        entry.content = Bytes::new();
        man.entries.push(entry);
    }

    let content_id = write_manifest(store, &man).await?;

    commit_written(state, man, content_id);
    entries.clear();
    Ok(HashSet::from([content_id]))
}

/// Fold a successfully written manifest into the committed state.
///
/// Tombstones drop their target from the committed map; the tombstone
/// itself lives on in the blob to shadow older versions during reloads.
fn commit_written(state: &mut CommittedState, man: Manifest, content_id: ContentId) {
    for entry in man.entries {
        if entry.deleted {
            state.entries.remove(&entry.id);
        } else {
            state.entries.insert(entry.id.clone(), Arc::new(entry));
        }
    }
    state.content_ids.insert(content_id);
}
