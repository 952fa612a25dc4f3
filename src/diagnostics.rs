//! Diagnostic channel for recoverable mapping problems
//!
//! Unresolved rule ids are not errors: a mapping pass reports them here
//! and carries on with the remaining rules.

use std::fmt;
use std::sync::Mutex;

/// A recoverable problem found during a mapping pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A rule contribution references a mapping id with no registered rule
    MissingDescriptor { id: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingDescriptor { id } => write!(
                f,
                "Missing binary metadata descriptor with id '{}'. Or check your rule contribution with proper metadataMapping-id.",
                id
            ),
        }
    }
}

/// Receiver of diagnostics
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, diagnostic: &Diagnostic);
}

/// Sink forwarding diagnostics to `tracing` at WARN level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::MissingDescriptor { id } => {
                tracing::warn!(descriptor_id = %id, "{}", diagnostic);
            }
        }
    }
}

/// Sink collecting diagnostics in memory, for tests and callers that
/// surface problems themselves
#[derive(Debug, Default)]
pub struct MemorySink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostics received so far, oldest first
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Rendered messages, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics().iter().map(ToString::to_string).collect()
    }

    /// Drop everything received so far
    pub fn clear(&self) {
        if let Ok(mut d) = self.diagnostics.lock() {
            d.clear();
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn warn(&self, diagnostic: &Diagnostic) {
        if let Ok(mut d) = self.diagnostics.lock() {
            d.push(diagnostic.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_descriptor_message() {
        let d = Diagnostic::MissingDescriptor {
            id: "hello".to_string(),
        };
        assert_eq!(
            d.to_string(),
            "Missing binary metadata descriptor with id 'hello'. Or check your rule contribution with proper metadataMapping-id."
        );
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.warn(&Diagnostic::MissingDescriptor { id: "a".to_string() });
        sink.warn(&Diagnostic::MissingDescriptor { id: "b".to_string() });

        assert_eq!(sink.diagnostics().len(), 2);
        assert!(sink.messages()[1].contains("'b'"));

        sink.clear();
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        TracingSink.warn(&Diagnostic::MissingDescriptor { id: "x".to_string() });
    }
}
