//! Committed manifest store for a content-addressed backup repository.
//!
//! Manifest entries are small labeled JSON payloads (snapshot descriptors,
//! policies, retention records) keyed by an opaque [`EntryId`]. Entries are
//! grouped into *manifest blobs* written through the content-addressed
//! [`ContentStore`](keel_content::ContentStore); the
//! [`CommittedManifestManager`] reads those blobs on demand, merges them
//! into an in-memory index, serves label-filtered lookups, writes newly
//! committed batches, and periodically compacts many small blobs into one.
//!
//! [`EntryId`]: keel_types::EntryId

pub mod codec;
mod committed;
mod config;
mod entry;
mod error;
mod format;

pub use codec::{decode_manifest, decode_manifest_scanned, encode_manifest};
pub use committed::CommittedManifestManager;
pub use config::{
    ManagerOptions, DEBUG_MANIFEST_MANAGER_ENV, DEFAULT_AUTO_COMPACTION_THRESHOLD,
    IGNORE_MALFORMED_MANIFEST_CONTENTS_ENV,
};
pub use entry::{Manifest, ManifestEntry};
pub use error::ManifestError;

/// Prefix byte reserved for manifest index blobs in the content store.
pub const MANIFEST_CONTENT_PREFIX: u8 = b'm';

/// Prefix byte reserved for indirect payload blobs (format V1).
pub const INDIRECT_CONTENT_PREFIX: u8 = b'x';

#[cfg(test)]
mod tests;
