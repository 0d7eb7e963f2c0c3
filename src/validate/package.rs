//! Package and dependency checks

use serde_json::{Map, Value};

use super::release::{check_release, ReleaseOwner};
use super::report_key_violations;
use crate::diagnostics::{DiagnosticCode, Diagnostics, Scope};
use crate::format::{name_from_details, FormatRules};
use crate::registry::{Collision, UniquenessRegistry};
use crate::schema::RecordKind;

/// Keys whose values must be plain web URLs
const WEB_URL_KEYS: [&str; 5] = ["homepage", "readme", "issues", "donate", "buy"];

/// Keys required when a package has no `details` URL
const REQUIRED_WITHOUT_DETAILS: [&str; 4] = ["name", "homepage", "author", "releases"];

/// Effective package name: explicit `name`, or derived from `details`
pub fn package_name(record: &Map<String, Value>) -> Option<String> {
    if let Some(name) = record.get("name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    record
        .get("details")
        .and_then(Value::as_str)
        .and_then(name_from_details)
}

/// Effective name of a package or dependency value, if it has one
pub fn record_name(record: &Value) -> Option<String> {
    record.as_object().and_then(package_name)
}

/// Shared inputs of record checks
pub struct RecordContext<'a> {
    pub rules: &'a FormatRules,
    pub location: &'a str,
    /// Record lives in the canonical channel
    pub main: bool,
}

/// Check one package entry. Returns the number of releases checked.
pub fn check_package(
    ctx: &RecordContext<'_>,
    index: usize,
    package: &Value,
    registry: &mut UniquenessRegistry,
    diags: &mut Diagnostics,
) -> usize {
    let Some(record) = package.as_object() else {
        let scope = Scope::record(ctx.location, format!("package #{}", index + 1));
        diags.report(&scope, DiagnosticCode::WrongType, "A package must be an object");
        return 0;
    };

    let name = package_name(record);
    let scope = match &name {
        Some(name) => Scope::record(ctx.location, name.clone()),
        None => Scope::record(ctx.location, format!("package #{}", index + 1)),
    };

    report_key_violations(RecordKind::Package, record, &scope, diags);

    let has_details = record.contains_key("details");
    if !has_details {
        for key in REQUIRED_WITHOUT_DETAILS {
            if !record.contains_key(key) {
                diags.report(
                    &scope,
                    DiagnosticCode::MissingKey,
                    format!("{:?} is required if no \"details\" URL is provided", key),
                );
            }
        }
    } else if name.is_none() {
        diags.report(
            &scope,
            DiagnosticCode::MissingKey,
            "A package name could not be derived from \"details\"; add a \"name\" key",
        );
    }

    if let Some(name) = &name {
        if let Some(problem) = ctx.rules.name_problem(name) {
            diags.report(
                &scope,
                DiagnosticCode::InvalidName,
                format!("Package name {:?} {}", name, problem),
            );
        }
    }

    for (key, value) in record {
        match (key.as_str(), value) {
            ("details", Value::String(details)) => {
                if !ctx.rules.is_details_url(details) {
                    diags.report(
                        &scope,
                        DiagnosticCode::InvalidUrl,
                        format!("\"details\" {:?} is not a supported repository URL", details),
                    );
                }
            }
            (key, Value::String(url)) if WEB_URL_KEYS.contains(&key) => {
                if !ctx.rules.is_web_url(url) {
                    diags.report(
                        &scope,
                        DiagnosticCode::InvalidUrl,
                        format!("{:?} must be an http(s) URL, got {:?}", key, url),
                    );
                }
            }
            ("author", Value::Array(authors)) => {
                if authors.iter().any(|a| !a.is_string()) {
                    diags.report(&scope, DiagnosticCode::WrongType, "\"author\" entries must be strings");
                }
            }
            ("labels", Value::Array(labels)) => check_labels(&scope, labels, diags),
            ("previous_names", Value::Array(names)) => {
                if names.iter().any(|n| n.as_str().map_or(true, str::is_empty)) {
                    diags.report(
                        &scope,
                        DiagnosticCode::WrongType,
                        "\"previous_names\" must be a list of non-empty strings",
                    );
                }
            }
            _ => {}
        }
    }

    if let Some(name) = &name {
        if let Err(collision) = registry.register_package(name, ctx.location) {
            report_collision(&scope, &collision, diags);
        }
        let previous = record
            .get("previous_names")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        for prev in previous {
            if prev == name {
                diags.report(
                    &scope,
                    DiagnosticCode::RedundantPreviousName,
                    format!("Previous name {:?} is the same as the current name", prev),
                );
            }
            if let Err(collision) = registry.register_previous_name(prev, name, ctx.location) {
                report_collision(&scope, &collision, diags);
            }
        }
    }

    let owner = ReleaseOwner {
        dependency: false,
        has_details,
        main: ctx.main,
    };
    check_releases(ctx, &scope, record, owner, diags)
}

/// Check one dependency entry. Returns the number of releases checked.
pub fn check_dependency(
    ctx: &RecordContext<'_>,
    index: usize,
    dependency: &Value,
    registry: &mut UniquenessRegistry,
    diags: &mut Diagnostics,
) -> usize {
    let Some(record) = dependency.as_object() else {
        let scope = Scope::record(ctx.location, format!("dependency #{}", index + 1));
        diags.report(&scope, DiagnosticCode::WrongType, "A dependency must be an object");
        return 0;
    };

    let name = record.get("name").and_then(Value::as_str);
    let scope = match name {
        Some(name) => Scope::record(ctx.location, name),
        None => Scope::record(ctx.location, format!("dependency #{}", index + 1)),
    };

    report_key_violations(RecordKind::Dependency, record, &scope, diags);

    for key in ["name", "releases"] {
        if !record.contains_key(key) {
            diags.report(
                &scope,
                DiagnosticCode::MissingKey,
                format!("A dependency must have a {:?} key", key),
            );
        }
    }

    if let Some(name) = name {
        if let Some(problem) = ctx.rules.name_problem(name) {
            diags.report(
                &scope,
                DiagnosticCode::InvalidName,
                format!("Dependency name {:?} {}", name, problem),
            );
        }
        if let Err(collision) = registry.register_dependency(name, ctx.location) {
            report_collision(&scope, &collision, diags);
        }
    }

    if let Some(order) = record.get("load_order").and_then(Value::as_str) {
        if !ctx.rules.is_load_order(order) {
            diags.report(
                &scope,
                DiagnosticCode::InvalidLoadOrder,
                format!("\"load_order\" {:?} must be two digits", order),
            );
        }
    }

    if let Some(issues) = record.get("issues").and_then(Value::as_str) {
        if !ctx.rules.is_web_url(issues) {
            diags.report(
                &scope,
                DiagnosticCode::InvalidUrl,
                format!("\"issues\" must be an http(s) URL, got {:?}", issues),
            );
        }
    }

    let owner = ReleaseOwner {
        dependency: true,
        has_details: false,
        main: ctx.main,
    };
    check_releases(ctx, &scope, record, owner, diags)
}

fn check_releases(
    ctx: &RecordContext<'_>,
    scope: &Scope<'_>,
    record: &Map<String, Value>,
    owner: ReleaseOwner,
    diags: &mut Diagnostics,
) -> usize {
    let Some(releases) = record.get("releases").and_then(Value::as_array) else {
        return 0;
    };
    for (i, release) in releases.iter().enumerate() {
        let release_scope = scope.child(format!("release #{}", i + 1));
        check_release(ctx.rules, &release_scope, release, owner, diags);
    }
    releases.len()
}

fn check_labels(scope: &Scope<'_>, labels: &[Value], diags: &mut Diagnostics) {
    for label in labels {
        match label.as_str() {
            Some(l) if l.trim().is_empty() => {
                diags.report(scope, DiagnosticCode::InvalidLabel, "Labels must not be empty")
            }
            Some(l) if l.contains(',') => diags.report(
                scope,
                DiagnosticCode::InvalidLabel,
                format!("Label {:?} must not contain commas", l),
            ),
            Some(_) => {}
            None => diags.report(scope, DiagnosticCode::WrongType, "Labels must be strings"),
        }
    }
}

fn report_collision(scope: &Scope<'_>, collision: &Collision, diags: &mut Diagnostics) {
    let code = match collision {
        Collision::Duplicate { .. } => DiagnosticCode::DuplicateName,
        Collision::DuplicatePreviousName { .. } => DiagnosticCode::DuplicatePreviousName,
        Collision::CrossKind { .. } | Collision::PreviousName { .. } => DiagnosticCode::NameCollision,
    };
    diags.report(scope, code, collision.to_string());
}
