//! Release checks
//!
//! A release is sourced one of two ways: from upstream tags or a branch
//! (`tags` / `branch`), or from an explicit `url` + `version` + `date`
//! triple. Releases in the main channel must use the first form.

use serde_json::Value;

use super::report_key_violations;
use crate::diagnostics::{DiagnosticCode, Diagnostics, Scope};
use crate::format::{FormatRules, SelectorRange};
use crate::schema::RecordKind;

const EXPLICIT_KEYS: [&str; 3] = ["url", "version", "date"];

/// What the release belongs to
#[derive(Debug, Clone, Copy)]
pub struct ReleaseOwner {
    /// Owned by a dependency rather than a package
    pub dependency: bool,
    /// Owner has a `details` URL to resolve tags/branches against
    pub has_details: bool,
    /// Owner lives in the canonical channel
    pub main: bool,
}

/// Check one release record
pub fn check_release(
    rules: &FormatRules,
    scope: &Scope<'_>,
    release: &Value,
    owner: ReleaseOwner,
    diags: &mut Diagnostics,
) {
    let Some(record) = release.as_object() else {
        diags.report(scope, DiagnosticCode::WrongType, "A release must be an object");
        return;
    };

    let kind = if owner.dependency {
        RecordKind::DependencyRelease
    } else {
        RecordKind::PackageRelease
    };
    report_key_violations(kind, record, scope, diags);

    let has_tags = record.contains_key("tags");
    let has_branch = record.contains_key("branch");

    if has_tags && has_branch {
        diags.report(
            scope,
            DiagnosticCode::ConflictingKeys,
            "A release must have only one of the \"tags\" or \"branch\" keys",
        );
    }

    if has_tags || has_branch {
        for key in EXPLICIT_KEYS {
            if record.contains_key(key) {
                diags.report(
                    scope,
                    DiagnosticCode::RedundantKey,
                    format!("The key {:?} is redundant when \"tags\" or \"branch\" is specified", key),
                );
            }
        }
        if !owner.has_details && !record.contains_key("base") {
            diags.report(
                scope,
                DiagnosticCode::MissingKey,
                "A release must have a \"base\" key if the owner does not specify \"details\"",
            );
        }
    } else if owner.main {
        diags.report(
            scope,
            DiagnosticCode::MissingKey,
            "A release must have a \"tags\" key or \"branch\" key if it is in the main repository",
        );
    } else {
        let missing: Vec<&str> = EXPLICIT_KEYS
            .into_iter()
            .filter(|key| !record.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            diags.push(
                scope
                    .diagnostic(
                        DiagnosticCode::MissingKey,
                        "A release must provide \"url\", \"version\" and \"date\" keys if it does not specify \"tags\" or \"branch\"",
                    )
                    .with_context(format!("missing: {}", missing.join(", "))),
            );
        }
    }

    if !record.contains_key("sublime_text") {
        diags.report(
            scope,
            DiagnosticCode::MissingKey,
            "A \"sublime_text\" version selector is required",
        );
    }

    let has_sha256 = record.contains_key("sha256");

    for (key, value) in record {
        match (key.as_str(), value) {
            ("base", Value::String(base)) => {
                if !rules.is_base_url(base) {
                    diags.report(
                        scope,
                        DiagnosticCode::InvalidUrl,
                        format!("\"base\" must be a GitHub or Bitbucket repository URL, got {:?}", base),
                    );
                }
            }
            ("tags", Value::Bool(false)) => diags.report(
                scope,
                DiagnosticCode::WrongType,
                "\"tags\" must be true or a tag prefix string",
            ),
            ("tags", Value::String(prefix)) if prefix.is_empty() => diags.report(
                scope,
                DiagnosticCode::WrongType,
                "\"tags\" prefix must not be empty; use true instead",
            ),
            ("branch", Value::String(branch)) if branch.trim().is_empty() => diags.report(
                scope,
                DiagnosticCode::WrongType,
                "\"branch\" must name a branch",
            ),
            ("sublime_text", Value::String(selector)) => {
                if let Err(err) = SelectorRange::parse(selector) {
                    diags.report(
                        scope,
                        DiagnosticCode::InvalidSelector,
                        format!("\"sublime_text\" selector {:?} {}", selector, err),
                    );
                }
            }
            ("platforms", value) => check_platforms(rules, scope, value, diags),
            ("dependencies", Value::Array(items)) => {
                if items.iter().any(|item| !item.is_string()) {
                    diags.report(
                        scope,
                        DiagnosticCode::WrongType,
                        "\"dependencies\" must be a list of dependency names",
                    );
                }
            }
            ("version", Value::String(version)) => {
                if !rules.is_version(version) {
                    diags.report(
                        scope,
                        DiagnosticCode::InvalidVersion,
                        format!("\"version\" {:?} is not a semver-like version", version),
                    );
                }
            }
            ("date", Value::String(date)) => {
                if !rules.is_date(date) {
                    diags.report(
                        scope,
                        DiagnosticCode::InvalidDate,
                        format!("\"date\" {:?} must be formatted as YYYY-MM-DD HH:MM:SS", date),
                    );
                }
            }
            ("url", Value::String(url)) => {
                if owner.dependency && !has_sha256 && !url.starts_with("https://") {
                    diags.report(
                        scope,
                        DiagnosticCode::InvalidUrl,
                        "Dependency release URLs must use https:// unless \"sha256\" is provided",
                    );
                } else if !rules.is_web_url(url) {
                    diags.report(
                        scope,
                        DiagnosticCode::InvalidUrl,
                        format!("\"url\" {:?} is not an http(s) URL", url),
                    );
                }
            }
            ("sha256", Value::String(digest)) => {
                if !rules.is_sha256(digest) {
                    diags.report(
                        scope,
                        DiagnosticCode::InvalidChecksum,
                        "\"sha256\" must be 64 lowercase hexadecimal characters",
                    );
                }
            }
            _ => {}
        }
    }
}

fn check_platforms(rules: &FormatRules, scope: &Scope<'_>, value: &Value, diags: &mut Diagnostics) {
    let items: Vec<&Value> = match value {
        Value::String(_) => vec![value],
        Value::Array(items) => items.iter().collect(),
        // wrong type already reported by the key check
        _ => return,
    };
    for item in items {
        match item.as_str() {
            Some(platform) if rules.is_platform(platform) => {}
            Some(platform) => diags.report(
                scope,
                DiagnosticCode::InvalidPlatform,
                format!("Platform {:?} must be *, osx, linux or windows with an optional -x32, -x64 or -arm64 suffix", platform),
            ),
            None => diags.report(
                scope,
                DiagnosticCode::WrongType,
                "\"platforms\" entries must be strings",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PACKAGE_MAIN: ReleaseOwner = ReleaseOwner {
        dependency: false,
        has_details: true,
        main: true,
    };

    const PACKAGE_EXTERNAL: ReleaseOwner = ReleaseOwner {
        dependency: false,
        has_details: false,
        main: false,
    };

    fn run(release: Value, owner: ReleaseOwner) -> Diagnostics {
        let rules = FormatRules::new();
        let scope = Scope::record("repository/g.json", "GitGutter release #1");
        let mut diags = Diagnostics::new();
        check_release(&rules, &scope, &release, owner, &mut diags);
        diags
    }

    #[test]
    fn test_tags_release_in_main_channel_passes() {
        let diags = run(json!({ "tags": true, "sublime_text": "*" }), PACKAGE_MAIN);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_url_alongside_tags_is_redundant() {
        let diags = run(
            json!({ "tags": true, "sublime_text": "*", "url": "http://x" }),
            PACKAGE_MAIN,
        );
        assert_eq!(diags.error_count(), 1);
        let diag = &diags.all()[0];
        assert_eq!(diag.code, DiagnosticCode::RedundantKey);
        assert!(diag.message.contains("redundant"));
    }

    #[test]
    fn test_tags_and_branch_conflict() {
        let diags = run(
            json!({ "tags": true, "branch": "master", "sublime_text": "*" }),
            PACKAGE_MAIN,
        );
        assert!(diags.contains(DiagnosticCode::ConflictingKeys));
    }

    #[test]
    fn test_main_channel_requires_tags_or_branch() {
        let diags = run(
            json!({
                "sublime_text": "*",
                "url": "https://example.com/p.zip",
                "version": "1.0.0",
                "date": "2020-01-01 00:00:00"
            }),
            PACKAGE_MAIN,
        );
        assert!(diags.contains(DiagnosticCode::MissingKey));
        // the explicit triple is not "redundant" without tags/branch
        assert!(!diags.contains(DiagnosticCode::RedundantKey));
    }

    #[test]
    fn test_external_release_needs_full_triple() {
        let ok = run(
            json!({
                "sublime_text": ">=3000",
                "url": "https://example.com/p.zip",
                "version": "1.0.0",
                "date": "2020-01-01 00:00:00"
            }),
            PACKAGE_EXTERNAL,
        );
        assert!(ok.is_empty(), "{:?}", ok);

        let missing = run(
            json!({ "sublime_text": ">=3000", "url": "https://example.com/p.zip" }),
            PACKAGE_EXTERNAL,
        );
        assert_eq!(missing.error_count(), 1);
        assert_eq!(missing.all()[0].context, vec!["missing: version, date".to_string()]);
    }

    #[test]
    fn test_base_required_without_details() {
        let diags = run(json!({ "tags": true, "sublime_text": "*" }), PACKAGE_EXTERNAL);
        assert!(diags.contains(DiagnosticCode::MissingKey));

        let diags = run(
            json!({ "base": "https://github.com/foo/bar", "tags": true, "sublime_text": "*" }),
            PACKAGE_EXTERNAL,
        );
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_selector_and_platforms() {
        let diags = run(
            json!({ "tags": true, "sublime_text": "3000 - 4000", "platforms": ["osx", "linux-x64"] }),
            PACKAGE_MAIN,
        );
        assert!(diags.is_empty(), "{:?}", diags);

        let diags = run(
            json!({ "tags": true, "sublime_text": "abc", "platforms": "beos" }),
            PACKAGE_MAIN,
        );
        assert!(diags.contains(DiagnosticCode::InvalidSelector));
        assert!(diags.contains(DiagnosticCode::InvalidPlatform));
    }

    #[test]
    fn test_missing_selector() {
        let diags = run(json!({ "branch": "master" }), PACKAGE_MAIN);
        assert!(diags.all().iter().any(|d| d.message.contains("sublime_text")));
    }

    #[test]
    fn test_dependency_http_url_needs_sha256() {
        let owner = ReleaseOwner {
            dependency: true,
            has_details: false,
            main: false,
        };
        let base = json!({
            "sublime_text": "*",
            "url": "http://example.com/dep.zip",
            "version": "1.0.0",
            "date": "2020-01-01 00:00:00"
        });
        let diags = run(base.clone(), owner);
        assert!(diags.contains(DiagnosticCode::InvalidUrl));

        let mut with_hash = base;
        with_hash["sha256"] = json!("0".repeat(64));
        let diags = run(with_hash, owner);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_false_tags_rejected() {
        let diags = run(json!({ "tags": false, "sublime_text": "*" }), PACKAGE_MAIN);
        assert!(diags.contains(DiagnosticCode::WrongType));
    }
}
