//! Package Channel Validator
//!
//! Validates a plugin package channel: the top-level `channel.json`, the
//! repository documents it lists, and every package, dependency and release
//! record they contain.
//!
//! ## Features
//!
//! - **Schema checks**: allowed keys and value types per record kind
//! - **Format checks**: URLs, timestamps, version selectors, platform tags
//! - **Invariants**: global name uniqueness, sort order, letter buckets
//! - **Structured results**: coded diagnostics in a text or JSON report
//! - **Tooling**: revision diffs for CI and canonical re-sorting
//!
//! ## Layout
//!
//! ```text
//! channel.json
//! repository.json          includes ./repository/*.json
//! repository/
//! ├── 0-9.json
//! ├── a.json
//! ├── ...
//! ├── z.json
//! └── dependencies.json
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use package_channel::{ChannelValidator, ValidateOptions, ValidatorConfig};
//!
//! let validator = ChannelValidator::new(ValidatorConfig::default())?;
//! let report = validator.validate("channel.json".as_ref(), &ValidateOptions::default())?;
//! println!("{}", report.render_text());
//! # Ok::<(), package_channel::ChannelError>(())
//! ```

pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod format;
pub mod loader;
pub mod maintain;
pub mod registry;
pub mod report;
pub mod schema;
pub mod validate;
pub mod version;
pub mod walker;

#[cfg(test)]
mod testing;

pub use config::ValidatorConfig;
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Severity};
pub use diff::{review_package, ChannelDiff, PackageChange, RevisionDiff};
pub use error::{ChannelError, Result};
pub use fingerprint::Fingerprint;
pub use format::{FormatRules, SelectorRange};
pub use loader::{canonical_json, Document, Loader, Location};
pub use maintain::Maintainer;
pub use registry::UniquenessRegistry;
pub use report::Report;
pub use schema::RecordKind;
pub use validate::{ChannelValidator, RepositoryCheck, ValidateOptions};
pub use version::{SchemaVersion, VersionPolicy};
pub use walker::{IncludeWalker, WalkEntry};
