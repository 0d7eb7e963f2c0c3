//! Validation Report
//!
//! Aggregated result of one validation run, renderable as text for humans
//! or JSON for tooling.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics, Severity};
use crate::error::Result;

/// Counters for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Channel plus every repository document that loaded
    pub documents: usize,
    pub packages: usize,
    pub dependencies: usize,
    pub releases: usize,
    pub skipped: usize,
    /// Documents that could not be loaded or resolved
    pub failed: usize,
}

/// Per-document outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub location: String,
    /// The channel document itself
    pub channel: bool,
    pub main: bool,
    pub included: bool,
    pub packages: usize,
    pub dependencies: usize,
    pub errors: usize,
}

/// A document skipped for its schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub location: String,
    pub schema_version: String,
}

/// Result of [`ChannelValidator::validate`](crate::ChannelValidator::validate)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub channel: String,
    pub generated_at: DateTime<Utc>,
    pub test_repositories: bool,
    pub documents: Vec<DocumentSummary>,
    pub skipped: Vec<SkippedDocument>,
    pub stats: RunStats,
    pub diagnostics: Diagnostics,
}

impl Report {
    /// No error-severity diagnostics
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.warning_count()
    }

    /// Diagnostics for one document
    pub fn for_location<'a>(&'a self, location: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.for_location(location)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable rendering, grouped by document
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "🔍 Validating {}", self.channel);
        if !self.test_repositories {
            let _ = writeln!(out, "   (external repositories not fetched)");
        }
        let _ = writeln!(out);

        for doc in &self.documents {
            let marker = if doc.errors == 0 { "✅" } else { "❌" };
            let mut line = format!("{} {}", marker, doc.location);
            if !doc.channel {
                let _ = write!(line, " - {} packages, {} dependencies", doc.packages, doc.dependencies);
            }
            if doc.errors > 0 {
                let _ = write!(line, ", {} errors", doc.errors);
            }
            let _ = writeln!(out, "{}", line);

            for diag in self.for_location(&doc.location) {
                render_diagnostic(&mut out, diag);
            }
        }

        // failures and skips for documents that never loaded
        let orphans = self
            .diagnostics
            .all()
            .iter()
            .filter(|d| !self.documents.iter().any(|doc| doc.location == d.location))
            .collect::<Vec<_>>();
        if !orphans.is_empty() {
            let _ = writeln!(out);
            for diag in orphans {
                render_diagnostic(&mut out, diag);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "📊 {} documents, {} packages, {} dependencies, {} releases ({} skipped, {} failed)",
            self.stats.documents,
            self.stats.packages,
            self.stats.dependencies,
            self.stats.releases,
            self.stats.skipped,
            self.stats.failed
        );
        if self.is_success() {
            let _ = writeln!(out, "✅ Channel is valid ({} warnings)", self.warning_count());
        } else {
            let _ = writeln!(
                out,
                "❌ {} errors, {} warnings",
                self.error_count(),
                self.warning_count()
            );
        }
        out
    }
}

fn render_diagnostic(out: &mut String, diag: &Diagnostic) {
    let branch = match diag.severity() {
        Severity::Error => "└─",
        Severity::Warning => "⚠️ ",
        Severity::Info => "ℹ️ ",
    };
    let _ = writeln!(out, "   {} {}", branch, diag);
}
