//! Target records populated by mapping passes
//!
//! The engine only needs to read and write named fields; `TargetRecord`
//! is the seam where callers plug in their own document model.

use crate::error::{MetadataError, Result};
use crate::types::TagValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record whose fields are addressed by path (e.g. `dc:title`)
pub trait TargetRecord {
    /// Current value of a field, if set
    fn property(&self, field: &str) -> Option<TagValue>;

    /// Set a field, overwriting any previous value
    ///
    /// Fails with `MetadataError::Record` when the record rejects the field.
    fn set_property(&mut self, field: &str, value: TagValue) -> Result<()>;

    /// Type name used to select rule contributions (e.g. `File`, `Picture`)
    fn record_type(&self) -> Option<&str> {
        None
    }
}

/// Record backed by an ordered property map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, TagValue>,

    /// Fields that reject writes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_only: Vec<String>,
}

impl MemoryRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the record type used for contribution selection
    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Set a field while building
    pub fn with_property(mut self, field: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.properties.insert(field.into(), value.into());
        self
    }

    /// Mark a field as read-only
    pub fn with_read_only(mut self, field: impl Into<String>) -> Self {
        self.read_only.push(field.into());
        self
    }

    /// Borrow a field value
    pub fn get(&self, field: &str) -> Option<&TagValue> {
        self.properties.get(field)
    }
}

impl TargetRecord for MemoryRecord {
    fn property(&self, field: &str) -> Option<TagValue> {
        self.properties.get(field).cloned()
    }

    fn set_property(&mut self, field: &str, value: TagValue) -> Result<()> {
        if self.read_only.iter().any(|f| f == field) {
            return Err(MetadataError::Record {
                field: field.to_string(),
                reason: format!("Field is read-only on record '{}'", self.id),
            });
        }
        self.properties.insert(field.to_string(), value);
        Ok(())
    }

    fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }
}
