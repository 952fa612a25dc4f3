//! Declarative mapping rules between tags and record fields
//!
//! A `MappingRule` selects payloads with a `PayloadMatcher` and lists the
//! `FieldBinding`s that copy tag values into record fields (or back).
//! A `RuleContribution` binds records to an ordered set of mapping ids.

use crate::error::{MetadataError, Result};
use crate::introspector::mime_matches;
use crate::types::{PayloadDescriptor, TagKey};
use serde::{Deserialize, Serialize};

/// Direction in which a binding copies values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Tag → record field
    #[default]
    Read,
    /// Record field → tag
    Write,
    /// Both directions
    Both,
}

impl Direction {
    /// Whether values flow from the payload into the record
    pub fn reads(self) -> bool {
        matches!(self, Direction::Read | Direction::Both)
    }

    /// Whether values flow from the record into the payload
    pub fn writes(self) -> bool {
        matches!(self, Direction::Write | Direction::Both)
    }
}

/// One tag ↔ field projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBinding {
    /// Tag key, e.g. `PDF:Producer`
    pub tag: TagKey,

    /// Record field path, e.g. `dc:source`
    pub field: String,

    #[serde(default)]
    pub direction: Direction,
}

impl FieldBinding {
    /// Read-only binding (tag → field)
    pub fn read(tag: impl Into<TagKey>, field: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            field: field.into(),
            direction: Direction::Read,
        }
    }

    /// Binding with an explicit direction
    pub fn new(tag: impl Into<TagKey>, field: impl Into<String>, direction: Direction) -> Self {
        Self {
            tag: tag.into(),
            field: field.into(),
            direction,
        }
    }
}

/// Predicate over a payload's MIME type and format kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PayloadMatcher {
    /// Every payload
    #[default]
    Any,
    /// MIME type, exact or `type/*`
    MimeType { pattern: String },
    /// Format kind (filename extension), case-insensitive
    Format { name: String },
    /// At least one inner matcher
    AnyOf { matchers: Vec<PayloadMatcher> },
    /// Every inner matcher
    AllOf { matchers: Vec<PayloadMatcher> },
}

impl PayloadMatcher {
    /// Whether the described payload is selected
    pub fn matches(&self, descriptor: &PayloadDescriptor) -> bool {
        match self {
            PayloadMatcher::Any => true,
            PayloadMatcher::MimeType { pattern } => mime_matches(pattern, &descriptor.mime_type),
            PayloadMatcher::Format { name } => descriptor
                .format
                .as_deref()
                .map(|f| f.eq_ignore_ascii_case(name.trim_start_matches('.')))
                .unwrap_or(false),
            PayloadMatcher::AnyOf { matchers } => matchers.iter().any(|m| m.matches(descriptor)),
            PayloadMatcher::AllOf { matchers } => matchers.iter().all(|m| m.matches(descriptor)),
        }
    }

    /// Shorthand for [`PayloadMatcher::MimeType`]
    pub fn mime_type(pattern: impl Into<String>) -> Self {
        PayloadMatcher::MimeType {
            pattern: pattern.into(),
        }
    }

    /// Shorthand for [`PayloadMatcher::Format`]
    pub fn format(name: impl Into<String>) -> Self {
        PayloadMatcher::Format { name: name.into() }
    }
}

/// A registered mapping between tags and record fields
///
/// Immutable once built: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    id: String,

    #[serde(default)]
    matcher: PayloadMatcher,

    #[serde(default)]
    bindings: Vec<FieldBinding>,

    /// Match bindings against keys stripped of their namespace
    #[serde(default)]
    ignore_prefix: bool,
}

impl MappingRule {
    /// Create a rule that applies to every payload
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            matcher: PayloadMatcher::Any,
            bindings: Vec::new(),
            ignore_prefix: false,
        }
    }

    /// Restrict the payloads this rule applies to
    pub fn with_matcher(mut self, matcher: PayloadMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Append a binding
    pub fn with_binding(mut self, binding: FieldBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Match against un-namespaced keys (`Producer` instead of `PDF:Producer`)
    pub fn with_ignore_prefix(mut self, ignore_prefix: bool) -> Self {
        self.ignore_prefix = ignore_prefix;
        self
    }

    /// Rule identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Payload selector
    pub fn matcher(&self) -> &PayloadMatcher {
        &self.matcher
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }

    /// Whether keys are matched without their namespace
    pub fn ignore_prefix(&self) -> bool {
        self.ignore_prefix
    }

    /// Whether this rule applies to the described payload
    pub fn applies_to(&self, descriptor: &PayloadDescriptor) -> bool {
        self.matcher.matches(descriptor)
    }

    /// Bindings that copy tags into the record
    pub fn read_bindings(&self) -> impl Iterator<Item = &FieldBinding> {
        self.bindings.iter().filter(|b| b.direction.reads())
    }

    /// Bindings that copy record fields into the payload
    pub fn write_bindings(&self) -> impl Iterator<Item = &FieldBinding> {
        self.bindings.iter().filter(|b| b.direction.writes())
    }

    /// Reject empty identifiers, tags, and field paths
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(MetadataError::Config(
                "Mapping rule id cannot be empty".to_string(),
            ));
        }
        for binding in &self.bindings {
            if binding.tag.as_str().trim().is_empty() || binding.field.trim().is_empty() {
                return Err(MetadataError::Config(format!(
                    "Mapping rule '{}' has a binding with an empty tag or field",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Configured binding between a payload's context and a set of mapping rule ids
///
/// A contribution applies when its `matcher` accepts the payload and,
/// if `recordTypes` is non-empty, the record reports one of those types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleContribution {
    pub id: String,

    /// Lower runs first
    #[serde(default)]
    pub order: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Payloads this contribution applies to
    #[serde(default)]
    pub matcher: PayloadMatcher,

    /// Record types this contribution applies to; empty means any record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record_types: Vec<String>,

    /// Mapping rule ids, applied in this order
    #[serde(default)]
    pub mappings: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl RuleContribution {
    /// Create an enabled contribution with order 0
    pub fn new<I, S>(id: impl Into<String>, mappings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            order: 0,
            enabled: true,
            matcher: PayloadMatcher::Any,
            record_types: Vec::new(),
            mappings: mappings.into_iter().map(Into::into).collect(),
        }
    }

    /// Restrict the payloads this contribution applies to
    pub fn with_matcher(mut self, matcher: PayloadMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Restrict the contribution to records of this type
    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_types.push(record_type.into());
        self
    }

    /// Whether this contribution applies to the payload and record type
    pub fn applies_to(&self, descriptor: &PayloadDescriptor, record_type: Option<&str>) -> bool {
        if !self.enabled || !self.matcher.matches(descriptor) {
            return false;
        }
        self.record_types.is_empty()
            || record_type
                .map(|t| self.record_types.iter().any(|r| r == t))
                .unwrap_or(false)
    }

    /// Set the ordering key
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Enable or disable the contribution
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
