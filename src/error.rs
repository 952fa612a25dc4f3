//! Error types for a3s-metadata

use thiserror::Error;

/// Errors that can occur while extracting, writing, or mapping metadata
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Payload format is unsupported or the payload is corrupt
    #[error("Failed to extract metadata from '{mime_type}' payload: {reason}")]
    Extraction {
        mime_type: String,
        reason: String,
    },

    /// Payload is not writable, or a key cannot be written for its format
    #[error("Failed to write metadata into '{mime_type}' payload: {reason}")]
    Write {
        mime_type: String,
        reason: String,
    },

    /// Target record rejected a field write
    #[error("Failed to set record field '{field}': {reason}")]
    Record {
        field: String,
        reason: String,
    },

    /// Invalid mapping rule or loader input
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure (temporary files, rule files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    /// Build an extraction error for a payload of the given MIME type
    pub fn extraction(mime_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            mime_type: mime_type.into(),
            reason: reason.into(),
        }
    }

    /// Build a write error for a payload of the given MIME type
    pub fn write(mime_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            mime_type: mime_type.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for metadata operations
pub type Result<T> = std::result::Result<T, MetadataError>;
