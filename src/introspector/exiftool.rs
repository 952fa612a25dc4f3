//! ExifTool introspector for out-of-process extraction and write-back
//!
//! Stages the payload in a temporary file and runs the `exiftool` binary
//! on it. Keys are ExifTool `Group:Tag` names (`EXIF:Software`,
//! `PDF:Producer`, `XMP:Language`), which covers image, audio and
//! document formats in one adapter.

use super::{mime_matches, TagIntrospector};
use crate::error::{MetadataError, Result};
use crate::types::{Blob, MergeOutcome, PayloadDescriptor, TagMap, TagValue};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

/// Tags describing the staged temporary file rather than the payload
const STAGING_TAGS: &[&str] = &[
    "SourceFile",
    "File:FileName",
    "File:Directory",
    "File:FileModifyDate",
    "File:FileAccessDate",
    "File:FileInodeChangeDate",
    "File:FilePermissions",
];

/// ExifTool adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifToolConfig {
    /// Path or name of the `exiftool` executable
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Extra arguments passed on every invocation (e.g. `-charset utf8`)
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// MIME patterns this adapter accepts
    #[serde(default = "default_mime_types")]
    pub mime_types: Vec<String>,
}

fn default_program() -> PathBuf {
    PathBuf::from("exiftool")
}

fn default_mime_types() -> Vec<String> {
    ["image/*", "audio/*", "video/*", "application/pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ExifToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            extra_args: Vec::new(),
            mime_types: default_mime_types(),
        }
    }
}

/// Introspector driving an external `exiftool` process
#[derive(Debug, Clone, Default)]
pub struct ExifToolIntrospector {
    config: ExifToolConfig,
}

impl ExifToolIntrospector {
    /// Create an introspector from configuration
    pub fn new(config: ExifToolConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ExifToolConfig {
        &self.config
    }

    /// Whether the configured executable can be run
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.program)
            .arg("-ver")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn stage(&self, payload: &Blob, descriptor: &PayloadDescriptor) -> std::io::Result<NamedTempFile> {
        let suffix = descriptor
            .format
            .as_deref()
            .map(|f| format!(".{}", f))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("a3s-metadata-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&payload.data)?;
        file.flush()?;
        Ok(file)
    }

    fn run(&self, args: &[String], path: &Path) -> std::io::Result<Output> {
        Command::new(&self.config.program)
            .args(&self.config.extra_args)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
    }
}

impl TagIntrospector for ExifToolIntrospector {
    fn name(&self) -> &str {
        "exiftool"
    }

    fn supports(&self, descriptor: &PayloadDescriptor) -> bool {
        self.config
            .mime_types
            .iter()
            .any(|p| mime_matches(p, &descriptor.mime_type))
    }

    fn extract_all(&self, payload: &Blob) -> Result<TagMap> {
        let descriptor = payload.descriptor();
        let fail = |reason: String| MetadataError::extraction(descriptor.mime_type.clone(), reason);

        let staged = self
            .stage(payload, &descriptor)
            .map_err(|e| fail(format!("Failed to stage payload: {}", e)))?;
        let output = self
            .run(&["-json".to_string(), "-G".to_string()], staged.path())
            .map_err(|e| fail(format!("Failed to run exiftool: {}", e)))?;

        if !output.status.success() && output.stdout.is_empty() {
            return Err(fail(stderr_text(&output)));
        }

        let tags = parse_json_output(&output.stdout).map_err(fail)?;
        tracing::debug!(
            mime_type = %descriptor.mime_type,
            tags = tags.len(),
            "Extracted tags with exiftool"
        );
        Ok(tags)
    }

    fn merge(&self, payload: &Blob, tags: &TagMap) -> Result<MergeOutcome> {
        let descriptor = payload.descriptor();
        let fail = |reason: String| MetadataError::write(descriptor.mime_type.clone(), reason);

        if tags.is_empty() {
            return Ok(MergeOutcome::Unchanged {
                reason: "No tags to write".to_string(),
            });
        }

        let staged = self
            .stage(payload, &descriptor)
            .map_err(|e| fail(format!("Failed to stage payload: {}", e)))?;

        let mut args = vec!["-overwrite_original".to_string()];
        args.extend(assignment_args(tags));

        let output = self
            .run(&args, staged.path())
            .map_err(|e| fail(format!("Failed to run exiftool: {}", e)))?;

        if !output.status.success() {
            return Err(fail(stderr_text(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("Nothing to do") {
            return Err(fail(format!(
                "No writable tags in request: {}",
                stderr_text(&output)
            )));
        }

        match updated_count(&stdout) {
            Some(n) if n > 0 => {
                let data = std::fs::read(staged.path())
                    .map_err(|e| fail(format!("Failed to read rewritten payload: {}", e)))?;
                tracing::debug!(
                    mime_type = %descriptor.mime_type,
                    tags = tags.len(),
                    size = data.len(),
                    "Rewrote payload with exiftool"
                );
                Ok(MergeOutcome::Rewritten(Bytes::from(data)))
            }
            _ => Ok(MergeOutcome::Unchanged {
                reason: stdout.trim().to_string(),
            }),
        }
    }
}

/// `-Group:Tag=value` arguments; list values become repeated assignments
fn assignment_args(tags: &TagMap) -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in tags {
        match value {
            TagValue::List(items) => {
                for item in items {
                    args.push(format!("-{}={}", key, item));
                }
            }
            other => args.push(format!("-{}={}", key, other)),
        }
    }
    args
}

/// Parse `exiftool -json -G` output for a single file
fn parse_json_output(stdout: &[u8]) -> std::result::Result<TagMap, String> {
    let mut entries: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_slice(stdout).map_err(|e| format!("Malformed exiftool output: {}", e))?;

    let entry = match entries.pop() {
        Some(entry) => entry,
        None => return Err("exiftool returned no entries".to_string()),
    };

    if let Some(error) = entry.get("ExifTool:Error").and_then(|v| v.as_str()) {
        return Err(error.to_string());
    }

    Ok(entry
        .iter()
        .filter(|(k, _)| !STAGING_TAGS.contains(&k.as_str()))
        .filter_map(|(k, v)| TagValue::from_json(v).map(|value| (k.clone(), value)))
        .collect())
}

/// Count from an `N image files updated` summary line
fn updated_count(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.ends_with("files updated"))
        .and_then(|line| line.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

fn stderr_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exiftool exited with {}", output.status)
    } else {
        stderr
    }
}
