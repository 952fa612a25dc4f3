//! Tag introspector trait, the core abstraction for format backends
//!
//! All format backends (in-memory JSON, native ID3, ExifTool, etc.)
//! implement `TagIntrospector` to provide a uniform API for reading every
//! embedded tag and merging new tag values back into a payload. The
//! `MetadataService` picks the first introspector that supports a payload.

use crate::error::Result;
use crate::types::{Blob, MergeOutcome, PayloadDescriptor, TagMap};

pub mod exiftool;
pub mod id3v2;
pub mod memory;

/// Core trait for format backends
///
/// Implementations own the format-specific parsing and serialization.
/// The engine never inspects payload bytes itself.
pub trait TagIntrospector: Send + Sync {
    /// Introspector name (e.g., "memory", "id3", "exiftool")
    fn name(&self) -> &str;

    /// Whether this introspector can handle the described payload
    fn supports(&self, descriptor: &PayloadDescriptor) -> bool;

    /// Extract every embedded tag
    ///
    /// Fails with `MetadataError::Extraction` when the payload is
    /// unsupported or corrupt.
    fn extract_all(&self, payload: &Blob) -> Result<TagMap>;

    /// Merge tag values into the payload, keeping tags absent from `tags`
    ///
    /// Fails with `MetadataError::Write` when a key cannot be written for
    /// this format or the payload is not writable at all. Returns
    /// `MergeOutcome::Unchanged` when the write ran but persisted nothing.
    fn merge(&self, payload: &Blob, tags: &TagMap) -> Result<MergeOutcome>;
}

/// Whether `mime_type` matches `pattern` (`type/subtype`, `type/*` or `*/*`)
pub(crate) fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" || pattern == "*/*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(major) => mime_type
            .split_once('/')
            .map(|(m, _)| m.eq_ignore_ascii_case(major))
            .unwrap_or(false),
        None => pattern.eq_ignore_ascii_case(mime_type),
    }
}
