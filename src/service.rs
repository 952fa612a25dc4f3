//! Metadata engine for extraction, write-back, and rule-driven record mapping
//!
//! `MetadataService` ties the pieces together: it picks a
//! `TagIntrospector` for each payload, resolves mapping rules from the
//! current `SharedRegistry` snapshot, and reports unresolved rule ids to a
//! `DiagnosticSink`.

use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{MetadataError, Result};
use crate::introspector::exiftool::ExifToolIntrospector;
use crate::introspector::id3v2::Id3Introspector;
use crate::introspector::TagIntrospector;
use crate::loader::MappingLoader;
use crate::record::TargetRecord;
use crate::registry::{MappingRegistry, SharedRegistry};
use crate::rule::MappingRule;
use crate::types::{Blob, MergeOutcome, PayloadDescriptor, TagMap};
use std::sync::Arc;

/// Outcome of a mapping pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingReport {
    /// Record fields written, in application order (repeats possible)
    pub applied_fields: Vec<String>,

    /// Rule ids with no registered rule
    pub missing_rules: Vec<String>,

    /// Rule ids whose matcher rejected the payload
    pub skipped_rules: Vec<String>,
}

impl MappingReport {
    /// Whether every requested rule id resolved
    pub fn is_complete(&self) -> bool {
        self.missing_rules.is_empty()
    }
}

/// Binary metadata service
///
/// Introspectors are consulted in registration order; the first one
/// whose `supports` accepts a payload handles it.
pub struct MetadataService {
    introspectors: Vec<Box<dyn TagIntrospector>>,
    registry: Arc<SharedRegistry>,
    sink: Arc<dyn DiagnosticSink>,
}

impl MetadataService {
    /// Create a service with no introspectors, logging diagnostics via `tracing`
    pub fn new(registry: MappingRegistry) -> Self {
        Self::with_shared_registry(Arc::new(SharedRegistry::new(registry)))
    }

    /// Create a service reading rules from an existing shared registry
    pub fn with_shared_registry(registry: Arc<SharedRegistry>) -> Self {
        Self {
            introspectors: Vec::new(),
            registry,
            sink: Arc::new(TracingSink),
        }
    }

    /// Create a service with the native ID3 and ExifTool introspectors
    pub fn with_defaults(registry: MappingRegistry) -> Self {
        Self::new(registry)
            .with_introspector(Id3Introspector::new())
            .with_introspector(ExifToolIntrospector::default())
    }

    /// Append an introspector (lower priority than those already added)
    pub fn with_introspector(mut self, introspector: impl TagIntrospector + 'static) -> Self {
        self.introspectors.push(Box::new(introspector));
        self
    }

    /// Route diagnostics to a custom sink
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Names of registered introspectors, in priority order
    pub fn introspector_names(&self) -> Vec<&str> {
        self.introspectors.iter().map(|i| i.name()).collect()
    }

    /// First introspector supporting the described payload
    pub fn introspector_for(&self, descriptor: &PayloadDescriptor) -> Option<&dyn TagIntrospector> {
        self.introspectors
            .iter()
            .find(|i| i.supports(descriptor))
            .map(|i| &**i)
    }

    /// Current rule snapshot
    pub fn registry(&self) -> Arc<MappingRegistry> {
        self.registry.snapshot()
    }

    /// Atomically replace the rule snapshot, returning the previous one
    pub fn reload(&self, registry: MappingRegistry) -> Arc<MappingRegistry> {
        self.registry.replace(registry)
    }

    /// Load a fresh snapshot and publish it; the old one stays on failure
    pub fn reload_from(&self, loader: &dyn MappingLoader) -> Result<()> {
        let registry = loader.load()?;
        self.reload(registry);
        Ok(())
    }

    /// Read every tag embedded in the payload
    pub fn read_metadata(&self, payload: &Blob) -> Result<TagMap> {
        let descriptor = payload.descriptor();
        let introspector = self.introspector_for(&descriptor).ok_or_else(|| {
            MetadataError::extraction(
                descriptor.mime_type.clone(),
                "No introspector supports this payload",
            )
        })?;

        let tags = introspector.extract_all(payload)?;
        tracing::debug!(
            introspector = introspector.name(),
            mime_type = %descriptor.mime_type,
            size = payload.len(),
            tags = tags.len(),
            "Metadata extracted"
        );
        Ok(tags)
    }

    /// Read only the requested tags; keys absent from the payload are omitted
    pub fn read_metadata_keys<K: AsRef<str>>(&self, payload: &Blob, keys: &[K]) -> Result<TagMap> {
        Ok(self.read_metadata(payload)?.retain_keys(keys))
    }

    /// Merge tag values into the payload
    ///
    /// Returns `true` when the payload bytes were replaced and `false`
    /// when the write ran but persisted nothing; the payload is then left
    /// untouched.
    pub fn write_metadata(&self, payload: &mut Blob, values: &TagMap) -> Result<bool> {
        let descriptor = payload.descriptor();
        let introspector = self.introspector_for(&descriptor).ok_or_else(|| {
            MetadataError::write(
                descriptor.mime_type.clone(),
                "No introspector supports this payload",
            )
        })?;

        match introspector.merge(payload, values)? {
            MergeOutcome::Rewritten(data) => {
                tracing::debug!(
                    introspector = introspector.name(),
                    mime_type = %descriptor.mime_type,
                    tags = values.len(),
                    size = data.len(),
                    "Metadata written"
                );
                payload.data = data;
                Ok(true)
            }
            MergeOutcome::Unchanged { reason } => {
                tracing::debug!(
                    introspector = introspector.name(),
                    mime_type = %descriptor.mime_type,
                    reason = %reason,
                    "Payload left unchanged"
                );
                Ok(false)
            }
        }
    }

    /// Copy tag values into record fields for each listed rule id
    ///
    /// Unregistered ids produce one diagnostic each and are skipped;
    /// rules whose matcher rejects the payload are skipped silently. The
    /// payload is extracted at most once per call.
    pub fn apply_mappings<R, S>(
        &self,
        record: &mut R,
        payload: &Blob,
        rule_ids: &[S],
    ) -> Result<MappingReport>
    where
        R: TargetRecord + ?Sized,
        S: AsRef<str>,
    {
        let registry = self.registry.snapshot();
        self.apply_with(&registry, record, payload, rule_ids)
    }

    /// Run the rule contributions selected for this payload and record
    ///
    /// A contribution is selected when its matcher accepts the payload and
    /// its record types (if any) include `record.record_type()`. Selected
    /// contributions apply in `(order, id)` order, each contributing its
    /// mapping ids in declaration order. Ids of unselected contributions
    /// are never resolved.
    pub fn write_document<R>(&self, record: &mut R, payload: &Blob) -> Result<MappingReport>
    where
        R: TargetRecord + ?Sized,
    {
        let registry = self.registry.snapshot();
        let rule_ids = registry.contributed_rule_ids(&payload.descriptor(), record.record_type());
        self.apply_with(&registry, record, payload, rule_ids.as_slice())
    }

    /// Project record fields back into the payload through `Write` bindings
    ///
    /// Returns `false` without touching the payload when no bound field
    /// has a value. Bindings of `ignore_prefix` rules write to the
    /// namespaced tag the read side would pick for that field; a field with
    /// no such tag in the payload is skipped.
    pub fn write_record_to_payload<R, S>(
        &self,
        record: &R,
        payload: &mut Blob,
        rule_ids: &[S],
    ) -> Result<bool>
    where
        R: TargetRecord + ?Sized,
        S: AsRef<str>,
    {
        let registry = self.registry.snapshot();
        let descriptor = payload.descriptor();

        let values = {
            let mut tags = PassTags::new(self, &*payload);
            let mut values = TagMap::new();

            for rule_id in rule_ids {
                let rule_id = rule_id.as_ref();
                let Some(rule) = self.resolve(&registry, rule_id) else {
                    continue;
                };
                if !rule.applies_to(&descriptor) {
                    tracing::debug!(rule = %rule_id, mime_type = %descriptor.mime_type, "Rule does not match payload");
                    continue;
                }
                for binding in rule.write_bindings() {
                    let Some(value) = record.property(&binding.field) else {
                        continue;
                    };
                    let key = if rule.ignore_prefix() {
                        match tags.get(false)?.resolve_field(binding.tag.field()) {
                            Some(key) => key.clone(),
                            None => {
                                tracing::debug!(
                                    rule = %rule_id,
                                    tag = %binding.tag,
                                    "No namespaced tag for bare binding"
                                );
                                continue;
                            }
                        }
                    } else {
                        binding.tag.clone()
                    };
                    values.insert(key, value);
                }
            }
            values
        };

        if values.is_empty() {
            tracing::debug!(mime_type = %descriptor.mime_type, "No record values to write");
            return Ok(false);
        }

        self.write_metadata(payload, &values)
    }

    fn apply_with<R, S>(
        &self,
        registry: &MappingRegistry,
        record: &mut R,
        payload: &Blob,
        rule_ids: &[S],
    ) -> Result<MappingReport>
    where
        R: TargetRecord + ?Sized,
        S: AsRef<str>,
    {
        let descriptor = payload.descriptor();
        let mut tags = PassTags::new(self, payload);
        let mut report = MappingReport::default();

        for rule_id in rule_ids {
            let rule_id = rule_id.as_ref();
            let Some(rule) = self.resolve(registry, rule_id) else {
                report.missing_rules.push(rule_id.to_string());
                continue;
            };

            if !rule.applies_to(&descriptor) {
                tracing::debug!(rule = %rule_id, mime_type = %descriptor.mime_type, "Rule does not match payload");
                report.skipped_rules.push(rule_id.to_string());
                continue;
            }

            let available = tags.get(rule.ignore_prefix())?;
            for binding in rule.read_bindings() {
                let key = if rule.ignore_prefix() {
                    binding.tag.field()
                } else {
                    binding.tag.as_str()
                };
                if let Some(value) = available.get(key) {
                    record.set_property(&binding.field, value.clone())?;
                    report.applied_fields.push(binding.field.clone());
                }
            }
        }

        tracing::debug!(
            mime_type = %descriptor.mime_type,
            applied = report.applied_fields.len(),
            missing = report.missing_rules.len(),
            skipped = report.skipped_rules.len(),
            "Mappings applied"
        );
        Ok(report)
    }

    /// Look up a rule, reporting the id to the sink when it is unregistered
    fn resolve<'r>(
        &self,
        registry: &'r MappingRegistry,
        rule_id: &str,
    ) -> Option<&'r MappingRule> {
        let rule = registry.lookup(rule_id);
        if rule.is_none() {
            self.sink.warn(&Diagnostic::MissingDescriptor {
                id: rule_id.to_string(),
            });
        }
        rule
    }
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService")
            .field("introspectors", &self.introspector_names())
            .field("registry", &self.registry)
            .finish()
    }
}

/// Tags extracted lazily, once per mapping pass
struct PassTags<'a> {
    service: &'a MetadataService,
    payload: &'a Blob,
    full: Option<TagMap>,
    bare: Option<TagMap>,
}

impl<'a> PassTags<'a> {
    fn new(service: &'a MetadataService, payload: &'a Blob) -> Self {
        Self {
            service,
            payload,
            full: None,
            bare: None,
        }
    }

    /// Namespaced tags, or tags keyed by field name when `ignore_prefix`
    fn get(&mut self, ignore_prefix: bool) -> Result<&TagMap> {
        let full = match self.full.take() {
            Some(full) => full,
            None => self.service.read_metadata(self.payload)?,
        };
        let full = self.full.insert(full);
        if !ignore_prefix {
            return Ok(full);
        }

        let bare = match self.bare.take() {
            Some(bare) => bare,
            None => full.without_namespaces(),
        };
        Ok(self.bare.insert(bare))
    }
}
