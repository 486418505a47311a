//! Manifest entry data model and its JSON wire contract.
//!
//! Entries serialize as JSON objects with the fields `id`, `labels`,
//! `modified` (RFC3339), `deleted` (omitted when false), `data` (the raw
//! payload JSON, spliced verbatim; `""` when there is no payload),
//! `contentID` (omitted when absent) and `version` (omitted when zero).
//! Decoding tolerates arbitrary field order and ignores unknown fields;
//! missing fields fall back to their empty values.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use keel_types::{ContentId, EntryId};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A single committed metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Opaque identifier, unique per entry.
    pub id: EntryId,
    /// Label name → value pairs used by query predicates.
    pub labels: BTreeMap<String, String>,
    /// Instant of last modification; merges keep the latest.
    pub mod_time: DateTime<Utc>,
    /// Tombstone flag. Tombstones are retained in blobs to shadow older
    /// versions during merges but are suppressed from query results.
    pub deleted: bool,
    /// Raw JSON payload. Empty for tombstones and after a V1 write, where
    /// the payload lives in an indirect blob instead.
    pub content: Bytes,
    /// Identifier of the indirect payload blob (V1 only).
    pub content_id: Option<ContentId>,
    /// Serialization format this entry was committed with.
    pub version: u8,
}

impl ManifestEntry {
    /// Create a live entry carrying an inline payload.
    pub fn new(
        id: impl Into<EntryId>,
        labels: BTreeMap<String, String>,
        mod_time: DateTime<Utc>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            labels,
            mod_time,
            deleted: false,
            content: content.into(),
            content_id: None,
            version: 0,
        }
    }

    /// Create a tombstone shadowing any older version of the entry.
    pub fn tombstone(id: impl Into<EntryId>, mod_time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            labels: BTreeMap::new(),
            mod_time,
            deleted: true,
            content: Bytes::new(),
            content_id: None,
            version: 0,
        }
    }

    /// Whether this entry's labels are a superset of the given predicate.
    pub fn matches_labels(&self, labels: &BTreeMap<String, String>) -> bool {
        labels
            .iter()
            .all(|(name, value)| self.labels.get(name) == Some(value))
    }
}

/// The unit of serialization: an ordered list of entries.
///
/// Order within a blob carries no meaning; merges rely on
/// [`ManifestEntry::mod_time`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Entries stored in this blob.
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

/// Copy a raw JSON payload into an owned buffer.
///
/// The values `""` and `null` both mean "no payload"; anything else is
/// kept verbatim. The returned buffer never aliases the input.
pub(crate) fn owned_payload(raw: &str) -> Bytes {
    if raw == "\"\"" || raw == "null" {
        Bytes::new()
    } else {
        Bytes::copy_from_slice(raw.as_bytes())
    }
}

impl Serialize for ManifestEntry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;

        let data = if self.content.is_empty() {
            RawValue::from_string("\"\"".to_string())
        } else {
            let text = std::str::from_utf8(&self.content)
                .map_err(|_| S::Error::custom("manifest entry payload is not valid UTF-8"))?;
            RawValue::from_string(text.to_string())
        }
        .map_err(S::Error::custom)?;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("labels", &self.labels)?;
        map.serialize_entry(
            "modified",
            &self.mod_time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )?;
        if self.deleted {
            map.serialize_entry("deleted", &true)?;
        }
        map.serialize_entry("data", &*data)?;
        if let Some(content_id) = &self.content_id {
            map.serialize_entry("contentID", content_id)?;
        }
        if self.version != 0 {
            map.serialize_entry("version", &self.version)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ManifestEntry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = ManifestEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a manifest entry object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut id = None;
                let mut labels = None;
                let mut mod_time = None;
                let mut deleted = false;
                let mut content = Bytes::new();
                let mut content_id = None;
                let mut version = 0u8;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "id" => id = map.next_value::<Option<EntryId>>()?,
                        "labels" => {
                            labels = map.next_value::<Option<BTreeMap<String, String>>>()?;
                        }
                        "modified" => {
                            if let Some(text) = map.next_value::<Option<String>>()? {
                                let parsed =
                                    DateTime::parse_from_rfc3339(&text).map_err(|err| {
                                        de::Error::custom(format!(
                                            "invalid modified time {text:?}: {err}"
                                        ))
                                    })?;
                                mod_time = Some(parsed.with_timezone(&Utc));
                            }
                        }
                        "deleted" => deleted = map.next_value()?,
                        "data" => {
                            let raw = map.next_value::<Box<RawValue>>()?;
                            content = owned_payload(raw.get());
                        }
                        "contentID" => {
                            if let Some(text) = map.next_value::<Option<String>>()? {
                                if !text.is_empty() {
                                    content_id =
                                        Some(text.parse().map_err(de::Error::custom)?);
                                }
                            }
                        }
                        "version" => version = map.next_value()?,
                        _ => {
                            map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }

                Ok(ManifestEntry {
                    id: id.unwrap_or_else(|| EntryId::new("")),
                    labels: labels.unwrap_or_default(),
                    mod_time: mod_time.unwrap_or(DateTime::UNIX_EPOCH),
                    deleted,
                    content,
                    content_id,
                    version,
                })
            }
        }

        deserializer.deserialize_map(EntryVisitor)
    }
}
