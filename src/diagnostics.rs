//! Diagnostics
//!
//! Collects the findings of a validation run. Every finding carries the
//! document it was found in and, for record-level findings, the record label
//! (package or dependency name, optionally with a release index).

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Structural ===
    /// Document could not be read, fetched, decoded or parsed
    LoadFailed,
    /// An include or repository reference could not be resolved
    InvalidReference,

    // === Schema ===
    /// Key is not declared for the record kind
    UnexpectedKey,
    /// Value has the wrong JSON type
    WrongType,
    /// Required key is absent
    MissingKey,
    /// `schema_version` is missing or not recognised
    UnsupportedSchemaVersion,
    /// Key present alongside the keys that make it meaningless
    RedundantKey,
    /// Mutually exclusive keys present together
    ConflictingKeys,

    // === Format ===
    /// URL does not match the required shape
    InvalidUrl,
    /// Timestamp is malformed or not a real time
    InvalidDate,
    /// `sublime_text` selector does not match the range grammar
    InvalidSelector,
    /// Platform tag not recognised
    InvalidPlatform,
    /// Release version is not semver-like
    InvalidVersion,
    /// Name is not usable as a directory name
    InvalidName,
    /// Label is malformed
    InvalidLabel,
    /// `load_order` is not two digits
    InvalidLoadOrder,
    /// `sha256` is not 64 lowercase hex digits
    InvalidChecksum,
    /// Line is not tab-indented
    InvalidIndentation,

    // === Invariants ===
    /// Name already used by a record of the same kind
    DuplicateName,
    /// Previous name already claimed (case-insensitive)
    DuplicatePreviousName,
    /// Name collides with a record of another kind or with a previous name
    NameCollision,
    /// Entries are not in case-insensitive order
    SortOrder,
    /// Record sits in the wrong letter file
    WrongBucket,
    /// Include file name is not a recognised bucket
    InvalidIncludeFilename,

    // === Warnings ===
    /// Previous name identical to the current name
    RedundantPreviousName,

    // === Info ===
    /// Document skipped because its schema version is not the supported one
    SkippedSchemaVersion,
    /// External repositories were not fetched in this run
    ExternalNotChecked,
}

/// Broad family a code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Structural,
    Schema,
    Format,
    Invariant,
    Notice,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadFailed => "E100",
            Self::InvalidReference => "E101",
            Self::UnexpectedKey => "E200",
            Self::WrongType => "E201",
            Self::MissingKey => "E202",
            Self::UnsupportedSchemaVersion => "E203",
            Self::RedundantKey => "E204",
            Self::ConflictingKeys => "E205",
            Self::InvalidUrl => "E300",
            Self::InvalidDate => "E301",
            Self::InvalidSelector => "E302",
            Self::InvalidPlatform => "E303",
            Self::InvalidVersion => "E304",
            Self::InvalidName => "E305",
            Self::InvalidLabel => "E306",
            Self::InvalidLoadOrder => "E307",
            Self::InvalidChecksum => "E308",
            Self::InvalidIndentation => "E309",
            Self::DuplicateName => "E400",
            Self::DuplicatePreviousName => "E401",
            Self::NameCollision => "E402",
            Self::SortOrder => "E403",
            Self::WrongBucket => "E404",
            Self::InvalidIncludeFilename => "E405",
            Self::RedundantPreviousName => "W001",
            Self::SkippedSchemaVersion => "I001",
            Self::ExternalNotChecked => "I002",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::LoadFailed | Self::InvalidReference => Category::Structural,

            Self::UnexpectedKey
            | Self::WrongType
            | Self::MissingKey
            | Self::UnsupportedSchemaVersion
            | Self::RedundantKey
            | Self::ConflictingKeys => Category::Schema,

            Self::InvalidUrl
            | Self::InvalidDate
            | Self::InvalidSelector
            | Self::InvalidPlatform
            | Self::InvalidVersion
            | Self::InvalidName
            | Self::InvalidLabel
            | Self::InvalidLoadOrder
            | Self::InvalidChecksum
            | Self::InvalidIndentation => Category::Format,

            Self::DuplicateName
            | Self::DuplicatePreviousName
            | Self::NameCollision
            | Self::SortOrder
            | Self::WrongBucket
            | Self::InvalidIncludeFilename => Category::Invariant,

            Self::RedundantPreviousName
            | Self::SkippedSchemaVersion
            | Self::ExternalNotChecked => Category::Notice,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::RedundantPreviousName => Severity::Warning,
            Self::SkippedSchemaVersion | Self::ExternalNotChecked => Severity::Info,
            _ => Severity::Error,
        }
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
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic
// =============================================================================

/// A single finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Path or URL of the document
    pub location: String,
    /// Record label, e.g. `"GitGutter"` or `"GitGutter release #2"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// Diagnostic code
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Additional context (e.g. earlier occurrences, order diffs)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl Diagnostic {
    pub fn new(location: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            record: None,
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {} ({}", self.code, self.severity(), self.message, self.location)?;
        if let Some(record) = &self.record {
            write!(f, " > {}", record)?;
        }
        write!(f, ")")?;

        for ctx in &self.context {
            for line in ctx.lines() {
                write!(f, "\n    {}", line)?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// Scope
// =============================================================================

/// Where a record lives: the document location plus an optional record label.
///
/// Validators report through a scope so each diagnostic is attributed
/// without threading the location through every call.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    pub location: &'a str,
    pub record: Option<String>,
}

impl<'a> Scope<'a> {
    pub fn document(location: &'a str) -> Self {
        Self { location, record: None }
    }

    pub fn record(location: &'a str, record: impl Into<String>) -> Self {
        Self {
            location,
            record: Some(record.into()),
        }
    }

    /// Scope for a nested record, e.g. a release inside a package
    pub fn child(&self, label: impl fmt::Display) -> Self {
        let record = match &self.record {
            Some(parent) => format!("{} {}", parent, label),
            None => label.to_string(),
        };
        Self {
            location: self.location,
            record: Some(record),
        }
    }

    pub fn diagnostic(&self, code: DiagnosticCode, message: impl Into<String>) -> Diagnostic {
        let diag = Diagnostic::new(self.location, code, message);
        match &self.record {
            Some(record) => diag.with_record(record.clone()),
            None => diag,
        }
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of findings from a validation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic
    pub fn push(&mut self, item: Diagnostic) {
        self.items.push(item);
    }

    /// Add a diagnostic attributed to `scope`
    pub fn report(&mut self, scope: &Scope<'_>, code: DiagnosticCode, message: impl Into<String>) {
        self.push(scope.diagnostic(code, message));
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Get all errors
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Diagnostics attributed to one document
    pub fn for_location<'a>(&'a self, location: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.items.iter().filter(move |i| i.location == location)
    }

    /// Whether any diagnostic carries `code`
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|i| i.code == code)
    }

    /// Get all items
    pub fn all(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::RedundantKey.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::RedundantPreviousName.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::SkippedSchemaVersion.severity(), Severity::Info);
        assert_eq!(DiagnosticCode::SortOrder.category(), Category::Invariant);
        assert_eq!(DiagnosticCode::InvalidSelector.category(), Category::Format);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        let scope = Scope::record("repository/a.json", "Alignment");
        diags.report(&scope, DiagnosticCode::MissingKey, "\"releases\" is required");
        diags.report(&scope, DiagnosticCode::RedundantPreviousName, "same as name");
        diags.push(Diagnostic::new("channel.json", DiagnosticCode::SkippedSchemaVersion, "2.0"));

        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.for_location("repository/a.json").count(), 2);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_child_scope_label() {
        let scope = Scope::record("repository/g.json", "GitGutter");
        let release = scope.child("release #2");
        let diag = release.diagnostic(DiagnosticCode::InvalidDate, "bad date");
        assert_eq!(diag.record.as_deref(), Some("GitGutter release #2"));
        assert_eq!(
            diag.to_string(),
            "[E301] error: bad date (repository/g.json > GitGutter release #2)"
        );
    }
}
