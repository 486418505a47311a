//! Shared types and identifiers for Keel.
//!
//! This crate defines the core types used across the Keel workspace:
//! identifiers ([`ContentId`], [`EntryId`]) and the [`Compression`]
//! selector passed to content-store writes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// ContentId
// ---------------------------------------------------------------------------

/// Content-addressed identifier for a blob in the content store.
///
/// A `ContentId` is a single prefix byte followed by `blake3(blob_bytes)`.
/// The prefix partitions the content-store key space: different subsystems
/// reserve different prefix bytes so their blobs can be enumerated
/// independently. The textual form is the prefix character followed by
/// 64 hex digits, e.g. `m3f2a…`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId {
    prefix: u8,
    hash: [u8; 32],
}

impl ContentId {
    /// Derive the identifier for a blob stored under the given prefix.
    pub fn from_data(prefix: u8, data: &[u8]) -> Self {
        Self {
            prefix,
            hash: blake3::hash(data).into(),
        }
    }

    /// The prefix byte this blob was stored under.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The raw 32-byte content hash.
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix as char)?;
        for byte in &self.hash {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({self})")
    }
}

/// Error parsing the textual form of a [`ContentId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content id {0:?}")]
pub struct ParseContentIdError(pub String);

impl FromStr for ContentId {
    type Err = ParseContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        // One ASCII prefix byte plus 64 hex digits.
        if bytes.len() != 65 || !bytes[0].is_ascii_graphic() {
            return Err(ParseContentIdError(s.to_string()));
        }

        let mut hash = [0u8; 32];
        for (i, pair) in bytes[1..].chunks_exact(2).enumerate() {
            let hex = std::str::from_utf8(pair).map_err(|_| ParseContentIdError(s.to_string()))?;
            hash[i] =
                u8::from_str_radix(hex, 16).map_err(|_| ParseContentIdError(s.to_string()))?;
        }

        Ok(Self {
            prefix: bytes[0],
            hash,
        })
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// EntryId
// ---------------------------------------------------------------------------

/// Opaque identifier for a manifest entry.
///
/// Entry identifiers are printable strings chosen by the layer that creates
/// entries; the manifest store treats them as opaque keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Wrap a string as an entry identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Compression applied by a content-store backend when persisting a blob.
///
/// Callers that manage their own framing (such as the manifest layer, whose
/// blobs are already gzip-wrapped) pass [`Compression::None`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Store the blob as-is.
    #[default]
    None,
    /// Zstandard compression at rest.
    Zstd,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_deterministic() {
        let a = ContentId::from_data(b'm', b"hello");
        let b = ContentId::from_data(b'm', b"hello");
        assert_eq!(a, b, "same prefix and data must produce the same id");
    }

    #[test]
    fn test_content_id_prefix_distinguishes() {
        let a = ContentId::from_data(b'm', b"hello");
        let b = ContentId::from_data(b'x', b"hello");
        assert_ne!(a, b);
        assert_eq!(a.prefix(), b'm');
        assert_eq!(b.prefix(), b'x');
    }

    #[test]
    fn test_content_id_display_roundtrip() {
        let id = ContentId::from_data(b'm', b"some blob");
        let text = id.to_string();
        assert_eq!(text.len(), 65);
        assert!(text.starts_with('m'));

        let parsed: ContentId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_content_id_parse_rejects_garbage() {
        assert!("".parse::<ContentId>().is_err());
        assert!("m1234".parse::<ContentId>().is_err());
        assert!(format!("m{}", "zz".repeat(32)).parse::<ContentId>().is_err());
    }

    #[test]
    fn test_content_id_serde_as_string() {
        let id = ContentId::from_data(b'x', b"payload");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));

        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_content_id_ordering_by_prefix_then_hash() {
        let m = ContentId::from_data(b'm', b"a");
        let x = ContentId::from_data(b'x', b"a");
        assert!(m < x, "prefix byte dominates the ordering");
    }

    #[test]
    fn test_entry_id_transparent_serde() {
        let id = EntryId::from("snapshot-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"snapshot-1\"");

        let back: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_entry_id_display_and_debug() {
        let id = EntryId::from("abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(format!("{id:?}"), "EntryId(abc)");
    }

    #[test]
    fn test_compression_default_is_none() {
        assert_eq!(Compression::default(), Compression::None);
    }
}
