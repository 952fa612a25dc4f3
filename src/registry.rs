//! Mapping rule registry with immutable snapshots and atomic reload
//!
//! A `MappingRegistry` is built once (usually by a `MappingLoader`) and
//! never mutated afterwards. `SharedRegistry` publishes the current
//! snapshot to all readers and swaps in a replacement atomically.

use crate::error::{MetadataError, Result};
use crate::rule::{MappingRule, RuleContribution};
use crate::types::PayloadDescriptor;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only table of mapping rules and rule contributions
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    /// Rules in registration order
    rules: Vec<MappingRule>,

    /// rule id → position in `rules`
    index: HashMap<String, usize>,

    contributions: Vec<RuleContribution>,
}

impl MappingRegistry {
    /// Start building a registry
    pub fn builder() -> MappingRegistryBuilder {
        MappingRegistryBuilder::default()
    }

    /// Registry with no rules
    pub fn empty() -> Self {
        Self::default()
    }

    /// Find a rule by id; absence is an expected outcome
    pub fn lookup(&self, rule_id: &str) -> Option<&MappingRule> {
        self.index.get(rule_id).map(|&i| &self.rules[i])
    }

    /// Rules whose matcher accepts the payload, in registration order
    pub fn rules_applicable_to(&self, descriptor: &PayloadDescriptor) -> Vec<&MappingRule> {
        self.rules
            .iter()
            .filter(|rule| rule.applies_to(descriptor))
            .collect()
    }

    /// All rules in registration order
    pub fn rules(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter()
    }

    /// Enabled contributions, sorted by `(order, id)`
    pub fn contributions(&self) -> Vec<&RuleContribution> {
        let mut enabled: Vec<&RuleContribution> =
            self.contributions.iter().filter(|c| c.enabled).collect();
        enabled.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        enabled
    }

    /// Enabled contributions selected by the payload and record type, sorted by `(order, id)`
    pub fn contributions_for(
        &self,
        descriptor: &PayloadDescriptor,
        record_type: Option<&str>,
    ) -> Vec<&RuleContribution> {
        self.contributions()
            .into_iter()
            .filter(|c| c.applies_to(descriptor, record_type))
            .collect()
    }

    /// Mapping ids referenced by the selected contributions, in application order
    pub fn contributed_rule_ids(
        &self,
        descriptor: &PayloadDescriptor,
        record_type: Option<&str>,
    ) -> Vec<String> {
        self.contributions_for(descriptor, record_type)
            .into_iter()
            .flat_map(|c| c.mappings.iter().cloned())
            .collect()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Builder collecting rules before a registry is published
///
/// Registering an id twice replaces the earlier rule in place, so later
/// contributions override earlier ones without changing rule order.
#[derive(Debug, Default)]
pub struct MappingRegistryBuilder {
    registry: MappingRegistry,
}

impl MappingRegistryBuilder {
    /// Register (or override) a mapping rule
    pub fn register_rule(&mut self, rule: MappingRule) -> Result<()> {
        rule.validate()?;

        let registry = &mut self.registry;
        match registry.index.get(rule.id()) {
            Some(&i) => {
                tracing::debug!(rule = %rule.id(), "Overriding mapping rule");
                registry.rules[i] = rule;
            }
            None => {
                registry.index.insert(rule.id().to_string(), registry.rules.len());
                registry.rules.push(rule);
            }
        }
        Ok(())
    }

    /// Register (or override) a rule contribution
    pub fn register_contribution(&mut self, contribution: RuleContribution) -> Result<()> {
        if contribution.id.trim().is_empty() {
            return Err(MetadataError::Config(
                "Rule contribution id cannot be empty".to_string(),
            ));
        }

        let contributions = &mut self.registry.contributions;
        match contributions.iter_mut().find(|c| c.id == contribution.id) {
            Some(existing) => *existing = contribution,
            None => contributions.push(contribution),
        }
        Ok(())
    }

    /// Chainable form of [`register_rule`](Self::register_rule)
    pub fn rule(mut self, rule: MappingRule) -> Result<Self> {
        self.register_rule(rule)?;
        Ok(self)
    }

    /// Chainable form of [`register_contribution`](Self::register_contribution)
    pub fn contribution(mut self, contribution: RuleContribution) -> Result<Self> {
        self.register_contribution(contribution)?;
        Ok(self)
    }

    /// Publish the registry
    pub fn build(self) -> MappingRegistry {
        self.registry
    }
}

/// Process-wide handle to the current registry snapshot
///
/// Readers take an `Arc` snapshot that stays valid for as long as they
/// hold it; `replace` swaps the whole table without blocking readers.
pub struct SharedRegistry {
    current: ArcSwap<MappingRegistry>,
}

impl SharedRegistry {
    /// Publish an initial registry
    pub fn new(registry: MappingRegistry) -> Self {
        Self {
            current: ArcSwap::from_pointee(registry),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<MappingRegistry> {
        self.current.load_full()
    }

    /// Atomically replace the registry, returning the previous snapshot
    pub fn replace(&self, registry: MappingRegistry) -> Arc<MappingRegistry> {
        let rules = registry.len();
        let previous = self.current.swap(Arc::new(registry));
        tracing::debug!(
            rules,
            previous_rules = previous.len(),
            "Mapping registry replaced"
        );
        previous
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(MappingRegistry::empty())
    }
}

impl std::fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegistry")
            .field("rules", &self.current.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{FieldBinding, PayloadMatcher};

    fn sample_registry() -> MappingRegistry {
        MappingRegistry::builder()
            .rule(
                MappingRule::new("pdf")
                    .with_matcher(PayloadMatcher::mime_type("application/pdf"))
                    .with_binding(FieldBinding::read("PDF:Producer", "dc:source")),
            )
            .unwrap()
            .rule(
                MappingRule::new("images")
                    .with_matcher(PayloadMatcher::mime_type("image/*"))
                    .with_binding(FieldBinding::read("EXIF:Software", "dc:source")),
            )
            .unwrap()
            .rule(MappingRule::new("everything"))
            .unwrap()
            .build()
    }

    #[test]
    fn test_lookup() {
        let reg = sample_registry();
        assert_eq!(reg.lookup("pdf").unwrap().id(), "pdf");
        assert!(reg.lookup("hello").is_none());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_rules_applicable_to_keeps_registration_order() {
        let reg = sample_registry();
        let desc = PayloadDescriptor::new("application/pdf", Some("pdf"));
        let ids: Vec<&str> = reg.rules_applicable_to(&desc).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["pdf", "everything"]);

        let desc = PayloadDescriptor::new("image/png", Some("png"));
        let ids: Vec<&str> = reg.rules_applicable_to(&desc).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["images", "everything"]);
    }

    #[test]
    fn test_override_keeps_position() {
        let mut builder = MappingRegistry::builder();
        builder.register_rule(MappingRule::new("a")).unwrap();
        builder.register_rule(MappingRule::new("b")).unwrap();
        builder
            .register_rule(
                MappingRule::new("a").with_binding(FieldBinding::read("ID3:Title", "dc:title")),
            )
            .unwrap();
        let reg = builder.build();

        let ids: Vec<&str> = reg.rules().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(reg.lookup("a").unwrap().bindings().len(), 1);
    }

    #[test]
    fn test_register_invalid_rule_fails() {
        let mut builder = MappingRegistry::builder();
        assert!(builder.register_rule(MappingRule::new("")).is_err());
        assert!(builder
            .register_contribution(RuleContribution::new("", ["a"]))
            .is_err());
    }

    #[test]
    fn test_contributions_sorted_and_filtered() {
        let reg = MappingRegistry::builder()
            .contribution(RuleContribution::new("late", ["c"]).with_order(10))
            .unwrap()
            .contribution(RuleContribution::new("b-early", ["b"]))
            .unwrap()
            .contribution(RuleContribution::new("a-early", ["a"]))
            .unwrap()
            .contribution(RuleContribution::new("off", ["x"]).with_enabled(false))
            .unwrap()
            .build();

        let ids: Vec<&str> = reg.contributions().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a-early", "b-early", "late"]);
        let desc = PayloadDescriptor::new("application/pdf", Some("pdf"));
        assert_eq!(reg.contributed_rule_ids(&desc, None), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_contributions_selected_by_context() {
        let reg = MappingRegistry::builder()
            .contribution(RuleContribution::new("common", ["dublin"]))
            .unwrap()
            .contribution(
                RuleContribution::new("pictures", ["exif"])
                    .with_matcher(PayloadMatcher::mime_type("image/*")),
            )
            .unwrap()
            .contribution(
                RuleContribution::new("songs", ["id3"])
                    .with_matcher(PayloadMatcher::mime_type("audio/*"))
                    .with_record_type("Audio"),
            )
            .unwrap()
            .build();

        let png = PayloadDescriptor::new("image/png", Some("png"));
        let mp3 = PayloadDescriptor::new("audio/mpeg", Some("mp3"));
        assert_eq!(reg.contributed_rule_ids(&png, None), vec!["dublin", "exif"]);
        assert_eq!(reg.contributed_rule_ids(&mp3, None), vec!["dublin"]);
        assert_eq!(reg.contributed_rule_ids(&mp3, Some("Audio")), vec!["dublin", "id3"]);

        let ids: Vec<&str> = reg
            .contributions_for(&mp3, Some("File"))
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["common"]);
    }

    #[test]
    fn test_shared_registry_replace() {
        let shared = SharedRegistry::default();
        let before = shared.snapshot();
        assert!(before.is_empty());

        let previous = shared.replace(sample_registry());
        assert!(previous.is_empty());
        assert_eq!(shared.snapshot().len(), 3);

        // Old snapshots stay valid after a swap
        assert!(before.lookup("pdf").is_none());
    }
}
