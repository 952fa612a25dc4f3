//! In-memory introspector for development and testing
//!
//! Payload bodies are plain JSON objects of `"Namespace:Field": value`
//! pairs. Useful as a fixture format and for hosts that keep sidecar tag
//! documents next to their binaries.

use super::{mime_matches, TagIntrospector};
use crate::error::{MetadataError, Result};
use crate::types::{Blob, MergeOutcome, PayloadDescriptor, TagMap};
use bytes::Bytes;
use std::collections::HashSet;

/// Default MIME type handled by [`MemoryIntrospector`]
pub const MEMORY_TAGS_MIME: &str = "application/x-a3s-tags+json";

/// JSON-backed introspector
///
/// Keys listed as read-only are silently kept at their stored value on
/// merge; a merge that only touches read-only keys reports
/// `MergeOutcome::Unchanged`.
#[derive(Debug, Clone)]
pub struct MemoryIntrospector {
    mime_patterns: Vec<String>,
    read_only: HashSet<String>,
}

impl MemoryIntrospector {
    /// Create an introspector for [`MEMORY_TAGS_MIME`] payloads
    pub fn new() -> Self {
        Self {
            mime_patterns: vec![MEMORY_TAGS_MIME.to_string()],
            read_only: HashSet::new(),
        }
    }

    /// Also accept payloads matching this MIME pattern
    pub fn with_mime_type(mut self, pattern: impl Into<String>) -> Self {
        self.mime_patterns.push(pattern.into());
        self
    }

    /// Mark keys whose values cannot be changed by `merge`
    pub fn with_read_only_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.read_only.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Build a payload whose body holds `tags`
    pub fn payload(mime_type: impl Into<String>, tags: &TagMap) -> Result<Blob> {
        let body = serde_json::to_vec(tags)?;
        Ok(Blob::new(mime_type, body))
    }

    fn decode(&self, payload: &Blob) -> Result<TagMap> {
        serde_json::from_slice::<TagMap>(&payload.data).map_err(|e| {
            MetadataError::extraction(
                payload.descriptor().mime_type,
                format!("Payload is not a JSON tag object: {}", e),
            )
        })
    }
}

impl Default for MemoryIntrospector {
    fn default() -> Self {
        Self::new()
    }
}

impl TagIntrospector for MemoryIntrospector {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, descriptor: &PayloadDescriptor) -> bool {
        self.mime_patterns
            .iter()
            .any(|p| mime_matches(p, &descriptor.mime_type))
    }

    fn extract_all(&self, payload: &Blob) -> Result<TagMap> {
        self.decode(payload)
    }

    fn merge(&self, payload: &Blob, tags: &TagMap) -> Result<MergeOutcome> {
        let mut stored = self.decode(payload).map_err(|e| {
            MetadataError::write(payload.descriptor().mime_type, e.to_string())
        })?;

        let mut changed = 0usize;
        for (key, value) in tags {
            if self.read_only.contains(key.as_str()) {
                tracing::debug!(key = %key, "Skipping read-only tag");
                continue;
            }
            stored.insert(key.clone(), value.clone());
            changed += 1;
        }

        if changed == 0 {
            return Ok(MergeOutcome::Unchanged {
                reason: "No writable tags requested".to_string(),
            });
        }

        let body = serde_json::to_vec(&stored)?;
        Ok(MergeOutcome::Rewritten(Bytes::from(body)))
    }
}
