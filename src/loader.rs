//! Mapping rule loading
//!
//! A `MappingLoader` turns a contribution source into an immutable
//! `MappingRegistry` snapshot. The engine only ever sees the snapshot.

use crate::error::{MetadataError, Result};
use crate::registry::MappingRegistry;
use crate::rule::{MappingRule, RuleContribution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Declarative rule configuration
///
/// JSON shape:
/// `{"mappings": [{"id", "matcher", "bindings", "ignorePrefix"}], "rules": [{"id", "order", "enabled", "matcher", "recordTypes", "mappings"}]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    #[serde(default)]
    pub mappings: Vec<MappingRule>,

    #[serde(default)]
    pub rules: Vec<RuleContribution>,
}

impl MappingConfig {
    /// Validate and publish as a registry
    pub fn into_registry(self) -> Result<MappingRegistry> {
        let mut builder = MappingRegistry::builder();
        for rule in self.mappings {
            builder.register_rule(rule)?;
        }
        for contribution in self.rules {
            builder.register_contribution(contribution)?;
        }
        Ok(builder.build())
    }
}

/// Source of mapping registry snapshots
pub trait MappingLoader: Send + Sync {
    /// Build a fresh registry snapshot
    fn load(&self) -> Result<MappingRegistry>;
}

/// Loader over an in-memory configuration
#[derive(Debug, Clone, Default)]
pub struct StaticMappingLoader {
    config: MappingConfig,
}

impl StaticMappingLoader {
    pub fn new(config: MappingConfig) -> Self {
        Self { config }
    }
}

impl MappingLoader for StaticMappingLoader {
    fn load(&self) -> Result<MappingRegistry> {
        self.config.clone().into_registry()
    }
}

/// JSON file-based loader
///
/// A missing file loads as an empty registry. `save` replaces the file
/// atomically.
pub struct FileMappingLoader {
    path: PathBuf,
}

impl FileMappingLoader {
    /// Create a loader for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the configuration file
    pub fn read_config(&self) -> Result<MappingConfig> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No mapping file, using empty config");
            return Ok(MappingConfig::default());
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| self.error("read", e))?;
        serde_json::from_str(&json).map_err(|e| self.error("parse", e))
    }

    /// Write a configuration file
    ///
    /// The document is staged in a temp file beside the target and
    /// persisted over it, so readers never see a partial file.
    pub fn save(&self, config: &MappingConfig) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.error("create directory for", e))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| self.error("stage", e))?;
        serde_json::to_writer_pretty(&mut staged, config)?;
        staged
            .persist(&self.path)
            .map_err(|e| self.error("persist", e.error))?;

        tracing::debug!(path = %self.path.display(), "Mapping file saved");
        Ok(())
    }

    fn error(&self, action: &str, cause: impl std::fmt::Display) -> MetadataError {
        MetadataError::Config(format!(
            "Failed to {} mapping file {}: {}",
            action,
            self.path.display(),
            cause
        ))
    }
}

impl MappingLoader for FileMappingLoader {
    fn load(&self) -> Result<MappingRegistry> {
        let registry = self.read_config()?.into_registry()?;
        tracing::debug!(
            path = %self.path.display(),
            rules = registry.len(),
            contributions = registry.contributions().len(),
            "Mapping registry loaded"
        );
        Ok(registry)
    }
}
