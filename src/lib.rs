//! # a3s-metadata
//!
//! Binary metadata extraction, write-back, and rule-driven record mapping
//! for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-metadata` reads the tags embedded in binary payloads (audio, image,
//! and document files), writes new tag values back, and projects tags onto
//! the fields of a target record through declarative mapping rules. Swap
//! format backends (native ID3, ExifTool, in-memory JSON) without changing
//! application code.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_metadata::{
//!     FieldBinding, MappingRegistry, MappingRule, MemoryIntrospector, MemoryRecord,
//!     MetadataService, PayloadMatcher, TagMap,
//! };
//!
//! # fn example() -> a3s_metadata::Result<()> {
//! let registry = MappingRegistry::builder()
//!     .rule(
//!         MappingRule::new("pdf")
//!             .with_matcher(PayloadMatcher::mime_type("application/pdf"))
//!             .with_binding(FieldBinding::read("PDF:Producer", "dc:source")),
//!     )?
//!     .build();
//!
//! let service = MetadataService::new(registry)
//!     .with_introspector(MemoryIntrospector::new().with_mime_type("application/pdf"));
//!
//! let mut tags = TagMap::new();
//! tags.insert("PDF:Producer", "OpenOffice.org 3.2");
//! let payload = MemoryIntrospector::payload("application/pdf", &tags)?;
//!
//! let mut record = MemoryRecord::new("doc-1");
//! service.apply_mappings(&mut record, &payload, &["pdf"])?;
//! assert_eq!(record.get("dc:source").unwrap().to_string(), "OpenOffice.org 3.2");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Introspectors
//!
//! - **memory** — JSON tag documents, for testing and sidecar metadata
//! - **id3** — native ID3v2 reading and writing
//! - **exiftool** — out-of-process `exiftool` for images, audio, and PDF
//!
//! ## Architecture
//!
//! - **TagIntrospector** trait — core abstraction all format backends implement
//! - **MetadataService** — extraction, write-back, and mapping passes
//! - **MappingRegistry** / **SharedRegistry** — immutable rule snapshots with atomic reload
//! - **MappingLoader** — builds registries from JSON or in-code configuration
//! - **DiagnosticSink** — receives warnings for unresolved rule ids

pub mod diagnostics;
pub mod error;
pub mod introspector;
pub mod loader;
pub mod record;
pub mod registry;
pub mod rule;
pub mod service;
pub mod types;

// Re-export core types
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, TracingSink};
pub use error::{MetadataError, Result};
pub use introspector::TagIntrospector;
pub use loader::{FileMappingLoader, MappingConfig, MappingLoader, StaticMappingLoader};
pub use record::{MemoryRecord, TargetRecord};
pub use registry::{MappingRegistry, MappingRegistryBuilder, SharedRegistry};
pub use rule::{Direction, FieldBinding, MappingRule, PayloadMatcher, RuleContribution};
pub use service::{MappingReport, MetadataService};
pub use types::{Blob, MergeOutcome, PayloadDescriptor, TagKey, TagMap, TagValue};

// Re-export introspectors for convenience
pub use introspector::exiftool::{ExifToolConfig, ExifToolIntrospector};
pub use introspector::id3v2::Id3Introspector;
pub use introspector::memory::{MemoryIntrospector, MEMORY_TAGS_MIME};
