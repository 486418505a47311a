//! Manifest blob encoding and the two decoder strategies.
//!
//! A manifest blob is gzip-compressed UTF-8 JSON of the shape
//! `{"entries":[…]}`. Decoding is available in two flavors that must agree
//! on every well-formed input:
//!
//! - [`decode_manifest`] — the reference reader. Drives serde's token
//!   stream directly over the decompressed bytes, rejecting any top-level
//!   field other than `entries` and any non-array value for it; array
//!   elements are decoded one at a time.
//! - [`decode_manifest_scanned`] — the key-extraction reader. Borrows each
//!   entry as a raw slice of the decompressed buffer and pulls the named
//!   fields out without building an intermediate value tree; payload bytes
//!   are copied into freshly owned buffers, never aliased to the input.
//!
//! Both fail with [`ManifestError::Malformed`] on structural deviation.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Read;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use keel_types::EntryId;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::entry::{owned_payload, Manifest, ManifestEntry};
use crate::error::ManifestError;

/// Serialize a manifest to a gzip-compressed JSON blob.
pub fn encode_manifest(man: &Manifest) -> Result<Bytes, ManifestError> {
    let mut gz = GzEncoder::new(Vec::new(), flate2::Compression::default());
    serde_json::to_writer(&mut gz, man).map_err(|err| ManifestError::Encode(err.to_string()))?;

    let encoded = gz
        .finish()
        .map_err(|err| ManifestError::Encode(err.to_string()))?;
    Ok(Bytes::from(encoded))
}

/// Decode a manifest blob with the streaming reference reader.
pub fn decode_manifest(data: &[u8]) -> Result<Manifest, ManifestError> {
    let raw = gunzip(data)?;
    serde_json::from_slice(&raw).map_err(|err| ManifestError::Malformed(err.to_string()))
}

/// Decode a manifest blob with the zero-copy key-extraction reader.
pub fn decode_manifest_scanned(data: &[u8]) -> Result<Manifest, ManifestError> {
    let raw = gunzip(data)?;
    let scanned: ScannedManifest<'_> =
        serde_json::from_slice(&raw).map_err(|err| ManifestError::Malformed(err.to_string()))?;

    let mut entries = Vec::with_capacity(scanned.entries.len());
    for raw_entry in scanned.entries {
        entries.push(scan_entry(raw_entry)?);
    }

    Ok(Manifest { entries })
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, ManifestError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|err| ManifestError::Malformed(format!("unpacking manifest data: {err}")))?;
    Ok(out)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScannedManifest<'a> {
    #[serde(borrow, default)]
    entries: Vec<&'a RawValue>,
}

/// The named entry fields, borrowed from the decompressed buffer.
///
/// Unknown fields are skipped without being decoded; `labels` and `data`
/// stay raw slices until (and unless) they are needed.
#[derive(Deserialize)]
struct ScannedFields<'a> {
    #[serde(borrow, default)]
    id: Option<Cow<'a, str>>,
    #[serde(borrow, default)]
    labels: Option<&'a RawValue>,
    #[serde(borrow, default)]
    modified: Option<Cow<'a, str>>,
    #[serde(default)]
    deleted: bool,
    #[serde(borrow, default)]
    data: Option<&'a RawValue>,
    #[serde(borrow, default, rename = "contentID")]
    content_id: Option<Cow<'a, str>>,
    #[serde(default)]
    version: u8,
}

fn scan_entry(raw: &RawValue) -> Result<ManifestEntry, ManifestError> {
    let fields: ScannedFields<'_> = serde_json::from_str(raw.get())
        .map_err(|err| ManifestError::Malformed(format!("decoding manifest entry: {err}")))?;

    let labels: BTreeMap<String, String> = match fields.labels.map(RawValue::get) {
        Some(text) if text != "null" => serde_json::from_str(text)
            .map_err(|err| ManifestError::Malformed(format!("decoding entry labels: {err}")))?,
        _ => BTreeMap::new(),
    };

    let mod_time = match fields.modified.as_deref() {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map_err(|err| {
                ManifestError::Malformed(format!("invalid modified time {text:?}: {err}"))
            })?
            .with_timezone(&Utc),
        None => DateTime::UNIX_EPOCH,
    };

    let content_id: Option<keel_types::ContentId> = match fields.content_id.as_deref() {
        None | Some("") => None,
        Some(text) => Some(
            text.parse()
                .map_err(|err| ManifestError::Malformed(format!("{err}")))?,
        ),
    };

    Ok(ManifestEntry {
        id: EntryId::new(fields.id.unwrap_or_default().into_owned()),
        labels,
        mod_time,
        deleted: fields.deleted,
        content: fields
            .data
            .map(|raw| owned_payload(raw.get()))
            .unwrap_or_default(),
        content_id,
        version: fields.version,
    })
}
