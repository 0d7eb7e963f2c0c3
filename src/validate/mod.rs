//! Channel Validation
//!
//! Loads the channel, walks its repositories and runs every check against a
//! single run-scoped [`UniquenessRegistry`]. Checks are planned up front as
//! a flat list and then executed in order, so the set of checks performed
//! for a given tree is fixed before the first one runs.

pub mod channel;
pub mod package;
pub mod release;
pub mod repository;

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use serde_json::{Map, Value};
use similar::TextDiff;
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::diff::PackageChange;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Scope, Severity};
use crate::error::{ChannelError, Result};
use crate::format::FormatRules;
use crate::loader::{Document, Loader, Location};
use crate::registry::UniquenessRegistry;
use crate::report::{DocumentSummary, Report, RunStats, SkippedDocument};
use crate::schema::{KeyViolation, RecordKind};
use crate::version::{SchemaSupport, VersionPolicy};
use crate::walker::{IncludeWalker, RepositoryRole, WalkEntry};

use self::package::RecordContext;

/// Per-run switches
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Also fetch and validate repositories hosted outside the channel
    pub test_repositories: bool,
}

/// Outcome of validating one repository on its own
#[derive(Debug, Default)]
pub struct RepositoryCheck {
    pub diagnostics: Diagnostics,
    /// Packages of every document reached, for review
    pub packages: Vec<PackageChange>,
}

/// A repository document reached during the walk
struct Loaded {
    document: Document,
    role: RepositoryRole,
    /// Location as shown in diagnostics
    label: String,
}

/// Output of walking one or more repository roots
#[derive(Default)]
struct Walked {
    loaded: Vec<Loaded>,
    skipped: Vec<SkippedDocument>,
    failed: usize,
}

/// One planned unit of validation
enum Check<'a> {
    Indentation {
        label: &'a str,
        raw: &'a str,
    },
    Channel {
        label: &'a str,
        value: &'a Value,
    },
    RepositoryKeys {
        label: &'a str,
        value: &'a Value,
    },
    RepositoryLayout {
        label: &'a str,
        location: &'a Location,
        value: &'a Value,
    },
    Package {
        label: &'a str,
        index: usize,
        record: &'a Value,
        main: bool,
    },
    Dependency {
        label: &'a str,
        index: usize,
        record: &'a Value,
        main: bool,
    },
}

/// Validates a channel and every repository it references
pub struct ChannelValidator {
    config: ValidatorConfig,
    loader: Loader,
    policy: VersionPolicy,
    rules: FormatRules,
}

impl ChannelValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let loader = Loader::new(&config.http)?;
        let policy = VersionPolicy::new(&config.schema.version, &config.schema.legacy_versions)?;
        Ok(Self {
            config,
            loader,
            policy,
            rules: FormatRules::new(),
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Validate the channel at `channel_path`.
    ///
    /// Only a channel file that cannot be loaded is an `Err`; every other
    /// problem ends up as a diagnostic in the report.
    pub fn validate(&self, channel_path: &Path, options: &ValidateOptions) -> Result<Report> {
        let root = channel_path.parent().unwrap_or_else(|| Path::new(""));
        let channel = self.loader.load(&Location::Path(channel_path.to_path_buf()))?;
        let channel_label = display_location(root, &channel.location);
        info!(channel = %channel_label, "validating channel");

        let mut diags = Diagnostics::new();
        let mut walked = Walked::default();
        let mut external_unchecked = 0;
        let mut seen = HashSet::new();

        for reference in channel::repository_references(&channel.value) {
            let location = match channel.location.join(&reference) {
                Ok(location) => location,
                Err(error) => {
                    walked.failed += 1;
                    diags.push(failure_diagnostic(&channel_label, &error));
                    continue;
                }
            };
            if !seen.insert(location.clone()) {
                // duplicate entries are reported by the channel check
                continue;
            }
            if location.is_remote() && !options.test_repositories {
                debug!(repository = %location, "external repository not checked");
                external_unchecked += 1;
                continue;
            }
            let main = !location.is_remote();
            self.walk_into(root, location, main, &mut walked, &mut diags);
        }

        if external_unchecked > 0 {
            diags.push(Diagnostic::new(
                channel_label.clone(),
                DiagnosticCode::ExternalNotChecked,
                format!("{} external repositories were not fetched", external_unchecked),
            ));
        }

        let plan = self.plan(Some((&channel, channel_label.as_str())), &walked.loaded);
        debug!(checks = plan.len(), "check plan built");
        let mut stats = self.run(plan, &mut diags);
        stats.documents = walked.loaded.len() + 1;
        stats.skipped = walked.skipped.len();
        stats.failed = walked.failed;

        let mut documents = vec![summarize(&channel_label, true, None, &channel.value, &diags)];
        documents.extend(
            walked
                .loaded
                .iter()
                .map(|l| summarize(&l.label, false, Some(l.role), &l.document.value, &diags)),
        );

        info!(
            documents = stats.documents,
            packages = stats.packages,
            errors = diags.error_count(),
            "validation finished"
        );

        Ok(Report {
            channel: channel_label,
            generated_at: Utc::now(),
            test_repositories: options.test_repositories,
            documents,
            skipped: walked.skipped,
            stats,
            diagnostics: diags,
        })
    }

    /// Validate a single repository and its includes on its own, as an
    /// external repository. Used to vet repositories before they are
    /// added to a channel.
    pub fn validate_repository(&self, location: Location) -> Result<RepositoryCheck> {
        let mut diagnostics = Diagnostics::new();
        let mut walked = Walked::default();
        self.walk_into(Path::new(""), location, false, &mut walked, &mut diagnostics);
        let plan = self.plan(None, &walked.loaded);
        self.run(plan, &mut diagnostics);

        let mut packages = Vec::new();
        for repo in &walked.loaded {
            for record in records(&repo.document.value, "packages") {
                if let Some(change) = PackageChange::from_record(&repo.label, record.clone())? {
                    packages.push(change);
                }
            }
        }
        Ok(RepositoryCheck {
            diagnostics,
            packages,
        })
    }

    fn walk_into(
        &self,
        root: &Path,
        location: Location,
        main: bool,
        walked: &mut Walked,
        diags: &mut Diagnostics,
    ) {
        let walker = IncludeWalker::new(&self.loader, &self.policy, self.config.walk.max_include_depth);
        for entry in walker.walk(location, main) {
            match entry {
                WalkEntry::Document { document, role } => {
                    let label = display_location(root, &document.location);
                    walked.loaded.push(Loaded { document, role, label });
                }
                WalkEntry::Skipped {
                    location,
                    schema_version,
                } => {
                    let label = display_location(root, &location);
                    diags.push(Diagnostic::new(
                        label.clone(),
                        DiagnosticCode::SkippedSchemaVersion,
                        format!(
                            "Skipped document with schema version {:?}, expected {:?}",
                            schema_version,
                            self.policy.supported().raw
                        ),
                    ));
                    walked.skipped.push(SkippedDocument {
                        location: label,
                        schema_version,
                    });
                }
                WalkEntry::Failed { location, error } => {
                    warn!(location = %location, error = %error, "repository failed to load");
                    walked.failed += 1;
                    diags.push(failure_diagnostic(&display_location(root, &location), &error));
                }
            }
        }
    }

    fn plan<'a>(&self, channel: Option<(&'a Document, &'a str)>, loaded: &'a [Loaded]) -> Vec<Check<'a>> {
        let mut plan = Vec::new();
        if let Some((channel, label)) = channel {
            plan.push(Check::Indentation {
                label,
                raw: &channel.raw,
            });
            plan.push(Check::Channel {
                label,
                value: &channel.value,
            });
        }

        for repo in loaded {
            let label = repo.label.as_str();
            let value = &repo.document.value;
            if !repo.document.location.is_remote() {
                plan.push(Check::Indentation {
                    label,
                    raw: &repo.document.raw,
                });
            }
            plan.push(Check::RepositoryKeys { label, value });

            // missing or non-string versions get one diagnostic, not a cascade
            if self.policy.classify(repo.document.schema_version()) != SchemaSupport::Supported {
                continue;
            }
            if repo.role.main && repo.role.included {
                plan.push(Check::RepositoryLayout {
                    label,
                    location: &repo.document.location,
                    value,
                });
            }
            let main = repo.role.main;
            for (index, record) in records(value, "packages").iter().enumerate() {
                plan.push(Check::Package {
                    label,
                    index,
                    record,
                    main,
                });
            }
            for (index, record) in records(value, "dependencies").iter().enumerate() {
                plan.push(Check::Dependency {
                    label,
                    index,
                    record,
                    main,
                });
            }
        }

        plan
    }

    fn run(&self, plan: Vec<Check<'_>>, diags: &mut Diagnostics) -> RunStats {
        let mut registry = UniquenessRegistry::new();
        let mut stats = RunStats::default();

        for check in plan {
            match check {
                Check::Indentation { label, raw } => {
                    repository::check_indentation(&self.rules, label, raw, diags)
                }
                Check::Channel { label, value } => channel::check_channel(
                    &self.policy,
                    label,
                    value,
                    self.config.validation.unsorted_leading_repositories,
                    diags,
                ),
                Check::RepositoryKeys { label, value } => {
                    repository::check_repository(&self.policy, label, value, diags)
                }
                Check::RepositoryLayout { label, location, value } => {
                    repository::check_layout(&self.rules, label, location, value, diags)
                }
                Check::Package {
                    label,
                    index,
                    record,
                    main,
                } => {
                    let ctx = RecordContext {
                        rules: &self.rules,
                        location: label,
                        main,
                    };
                    stats.packages += 1;
                    stats.releases += package::check_package(&ctx, index, record, &mut registry, diags);
                }
                Check::Dependency {
                    label,
                    index,
                    record,
                    main,
                } => {
                    let ctx = RecordContext {
                        rules: &self.rules,
                        location: label,
                        main,
                    };
                    stats.dependencies += 1;
                    stats.releases +=
                        package::check_dependency(&ctx, index, record, &mut registry, diags);
                }
            }
        }

        stats
    }
}

/// Report every key violation of `record` under `scope`
pub(crate) fn report_key_violations(
    kind: RecordKind,
    record: &Map<String, Value>,
    scope: &Scope<'_>,
    diags: &mut Diagnostics,
) {
    for violation in kind.check_keys(record) {
        let code = match violation {
            KeyViolation::Unexpected { .. } => DiagnosticCode::UnexpectedKey,
            KeyViolation::WrongType { .. } => DiagnosticCode::WrongType,
        };
        diags.report(scope, code, violation.to_string());
    }
}

/// Check the `schema_version` of a channel or repository document
pub(crate) fn check_schema_version(
    policy: &VersionPolicy,
    scope: &Scope<'_>,
    value: &Value,
    diags: &mut Diagnostics,
) {
    match policy.classify(value.get("schema_version")) {
        SchemaSupport::Supported => {}
        SchemaSupport::Missing => diags.report(
            scope,
            DiagnosticCode::MissingKey,
            "The \"schema_version\" key is required",
        ),
        SchemaSupport::Legacy(version) => diags.report(
            scope,
            DiagnosticCode::UnsupportedSchemaVersion,
            format!(
                "Schema version {:?} is no longer supported, expected {:?}",
                version.raw,
                policy.supported().raw
            ),
        ),
        SchemaSupport::Unknown(raw) => diags.report(
            scope,
            DiagnosticCode::UnsupportedSchemaVersion,
            format!("Unrecognized schema version {}, expected {:?}", raw, policy.supported().raw),
        ),
    }
}

/// Report `names` unless they are in case-insensitive order. The
/// diagnostic carries a line diff of the actual against the sorted order.
pub(crate) fn check_sorted(scope: &Scope<'_>, what: &str, names: &[String], diags: &mut Diagnostics) {
    let mut expected = names.to_vec();
    expected.sort_by_key(|name| name.to_lowercase());
    if expected == names {
        return;
    }

    let actual_text = lines(names);
    let expected_text = lines(&expected);
    let diff = TextDiff::from_lines(&actual_text, &expected_text)
        .unified_diff()
        .header("actual", "sorted")
        .to_string();
    diags.push(
        scope
            .diagnostic(
                DiagnosticCode::SortOrder,
                format!("{} must be sorted case-insensitively by name", what),
            )
            .with_context(diff),
    );
}

fn lines(names: &[String]) -> String {
    names.iter().map(|name| format!("{}\n", name)).collect()
}

fn records<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn failure_diagnostic(label: &str, error: &ChannelError) -> Diagnostic {
    let code = match error {
        ChannelError::InvalidReference { .. } => DiagnosticCode::InvalidReference,
        _ => DiagnosticCode::LoadFailed,
    };
    Diagnostic::new(label, code, error.to_string())
}

/// Paths below the channel directory are shown relative to it
fn display_location(root: &Path, location: &Location) -> String {
    match location {
        Location::Path(path) => path.strip_prefix(root).unwrap_or(path).display().to_string(),
        Location::Url(url) => url.to_string(),
    }
}

fn summarize(
    label: &str,
    channel: bool,
    role: Option<RepositoryRole>,
    value: &Value,
    diags: &Diagnostics,
) -> DocumentSummary {
    DocumentSummary {
        location: label.to_string(),
        channel,
        main: role.map_or(true, |r| r.main),
        included: role.map_or(false, |r| r.included),
        packages: records(value, "packages").len(),
        dependencies: records(value, "dependencies").len(),
        errors: diags
            .for_location(label)
            .filter(|d| d.severity() == Severity::Error)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sorted_names_pass() {
        let mut diags = Diagnostics::new();
        let scope = Scope::document("repository/p.json");
        let names = vec!["Pyflakes".to_string(), "pytest-helper".to_string()];
        check_sorted(&scope, "Packages", &names, &mut diags);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unsorted_names_carry_diff() {
        let mut diags = Diagnostics::new();
        let scope = Scope::document("repository/p.json");
        let names = vec!["pytest-helper".to_string(), "Pyflakes".to_string()];
        check_sorted(&scope, "Packages", &names, &mut diags);

        assert_eq!(diags.len(), 1);
        let diag = &diags.all()[0];
        assert_eq!(diag.code, DiagnosticCode::SortOrder);
        assert!(diag.context[0].starts_with("--- actual\n+++ sorted\n"));
        assert!(diag.context[0].contains("Pyflakes"));
    }

    #[test]
    fn test_schema_version_classification() {
        let policy = VersionPolicy::new("3.0.0", &["2.0".to_string()]).unwrap();
        let scope = Scope::document("repository.json");

        let mut diags = Diagnostics::new();
        check_schema_version(&policy, &scope, &json!({ "schema_version": "3.0.0" }), &mut diags);
        assert!(diags.is_empty());

        check_schema_version(&policy, &scope, &json!({}), &mut diags);
        check_schema_version(&policy, &scope, &json!({ "schema_version": "4.0.0" }), &mut diags);
        check_schema_version(&policy, &scope, &json!({ "schema_version": 3 }), &mut diags);
        let codes: Vec<_> = diags.all().iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::MissingKey,
                DiagnosticCode::UnsupportedSchemaVersion,
                DiagnosticCode::UnsupportedSchemaVersion
            ]
        );
    }

    #[test]
    fn test_key_violations_mapped_to_codes() {
        let record = json!({ "name": 1, "bogus": true });
        let mut diags = Diagnostics::new();
        report_key_violations(
            RecordKind::Dependency,
            record.as_object().unwrap(),
            &Scope::record("dependencies.json", "dependency #1"),
            &mut diags,
        );
        assert!(diags.contains(DiagnosticCode::WrongType));
        assert!(diags.contains(DiagnosticCode::UnexpectedKey));
    }

    #[test]
    fn test_display_location_relative_to_root() {
        let root = Path::new("/data/channel");
        let location = Location::Path(root.join("repository/a.json"));
        assert_eq!(display_location(root, &location), "repository/a.json");

        let url = Location::parse("https://example.com/packages.json");
        assert_eq!(display_location(root, &url), "https://example.com/packages.json");
    }
}
