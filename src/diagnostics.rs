//! Diagnostics
//!
//! Collects degraded-resolution and post-build findings. None of these abort
//! a run; they are summarised after the artifact is written.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Resolution (degraded) ===
    /// Inlining stopped at the depth bound; the reference was left as-is
    DepthExceeded,
    /// A cross-file reference points at a file that does not exist
    MissingReferenceTarget,
    /// A `file#/pointer` reference whose pointer does not resolve
    MissingPointer,
    /// An external reference had no alias and was inlined verbatim
    AliasMiss,

    // === Post-build self-check ===
    /// A `#/$defs/...` reference has no matching definition
    DanglingReference,
    /// A cross-file reference survived into the artifact
    ExternalReference,
    /// The artifact does not compile as a JSON Schema
    SchemaCompile,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DepthExceeded => "R001",
            Self::MissingReferenceTarget => "R002",
            Self::MissingPointer => "R003",
            Self::AliasMiss => "R004",
            Self::DanglingReference => "C001",
            Self::ExternalReference => "C002",
            Self::SchemaCompile => "C003",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::AliasMiss => Severity::Info,
            Self::DepthExceeded
            | Self::MissingReferenceTarget
            | Self::MissingPointer
            | Self::DanglingReference
            | Self::ExternalReference
            | Self::SchemaCompile => Severity::Warning,
        }
    }

    /// Codes that mean a reference in the artifact points nowhere
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(self, Self::DanglingReference | Self::ExternalReference)
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Type definition (or fragment) that was being processed
    pub subject: String,
    /// Diagnostic code
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Additional context (e.g., the offending reference, a file path)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(subject: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.subject
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic item, logging it at the matching level
    pub fn push(&mut self, item: DiagnosticItem) {
        match item.severity() {
            Severity::Info => tracing::debug!(code = %item.code, subject = %item.subject, "{}", item.message),
            Severity::Warning => tracing::warn!(code = %item.code, subject = %item.subject, "{}", item.message),
        }
        self.items.push(item);
    }

    /// Record a reference left unresolved at the depth bound
    pub fn depth_exceeded(&mut self, subject: &str, reference: &str, max_depth: usize) {
        self.push(
            DiagnosticItem::new(
                subject,
                DiagnosticCode::DepthExceeded,
                format!("inlining stopped after {} nested fragments", max_depth),
            )
            .with_context(format!("$ref: {}", reference)),
        );
    }

    /// Record a cross-file reference whose target file is missing
    pub fn missing_target(&mut self, subject: &str, reference: &str, path: &std::path::Path) {
        self.push(
            DiagnosticItem::new(
                subject,
                DiagnosticCode::MissingReferenceTarget,
                format!("referenced fragment '{}' does not exist", reference),
            )
            .with_context(format!("looked for {}", path.display())),
        );
    }

    /// Record a dangling reference found by the post-build self-check
    pub fn dangling(&mut self, subject: &str, reference: &str) {
        self.push(DiagnosticItem::new(
            subject,
            DiagnosticCode::DanglingReference,
            format!("$ref target '{}' not found in $defs", reference),
        ));
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Warning)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items carrying a specific code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    /// Number of post-build references that point nowhere
    pub fn unresolved_reference_count(&self) -> usize {
        self.items.iter().filter(|i| i.code.is_unresolved_reference()).count()
    }

    /// Get all items
    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    /// Get total count
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Count warnings
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Format all warnings for the end-of-run summary. Info items alone
    /// count as a clean run.
    pub fn format_summary(&self) -> String {
        if !self.has_warnings() {
            return format!("✅ No warnings ({} info)\n", self.len());
        }

        let mut output = String::new();

        for item in self.warnings() {
            output.push_str(&format!("{}\n", item));
        }

        output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_summary())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::AliasMiss.severity(), Severity::Info);
        assert_eq!(DiagnosticCode::DepthExceeded.severity(), Severity::Warning);
        assert!(DiagnosticCode::ExternalReference.is_unresolved_reference());
        assert!(!DiagnosticCode::SchemaCompile.is_unresolved_reference());
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.dangling("type-Action", "#/$defs/missing");
        diags.push(DiagnosticItem::new("type-Person", DiagnosticCode::AliasMiss, "inlined"));

        assert_eq!(diags.len(), 2);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.unresolved_reference_count(), 1);
        assert!(diags.format_summary().contains("#/$defs/missing"));
        assert!(!diags.format_summary().contains("inlined"));
    }

    #[test]
    fn test_info_only_summary_is_clean() {
        let mut diags = Diagnostics::new();
        diags.push(DiagnosticItem::new("type-Person", DiagnosticCode::AliasMiss, "inlined"));

        assert!(!diags.is_empty());
        assert!(!diags.has_warnings());
        assert_eq!(diags.format_summary(), "✅ No warnings (1 info)\n");
        assert_eq!(Diagnostics::new().format_summary(), "✅ No warnings (0 info)\n");
    }
}
