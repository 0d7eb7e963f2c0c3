//! Repository document checks
//!
//! Key and version checks apply to every repository document. Layout checks
//! (file name, letter bucket, sort order) only apply to files included by
//! the main channel, which are sharded by first letter.

use serde_json::Value;

use super::package::record_name;
use super::{check_schema_version, check_sorted, report_key_violations};
use crate::diagnostics::{DiagnosticCode, Diagnostics, Scope};
use crate::format::{bucket_for, FormatRules};
use crate::loader::Location;
use crate::schema::RecordKind;
use crate::version::VersionPolicy;

/// File name of the shard holding dependencies
pub const DEPENDENCIES_FILE: &str = "dependencies.json";

/// Check keys, schema version and `includes` of a repository document
pub fn check_repository(policy: &VersionPolicy, location: &str, repository: &Value, diags: &mut Diagnostics) {
    let scope = Scope::document(location);
    let Some(record) = repository.as_object() else {
        diags.report(&scope, DiagnosticCode::WrongType, "A repository must be a JSON object");
        return;
    };

    report_key_violations(RecordKind::Repository, record, &scope, diags);
    check_schema_version(policy, &scope, repository, diags);

    if let Some(includes) = record.get("includes").and_then(Value::as_array) {
        for (i, include) in includes.iter().enumerate() {
            if !include.is_string() {
                diags.report(
                    &scope,
                    DiagnosticCode::WrongType,
                    format!("Include #{} must be a string", i + 1),
                );
            }
        }
    }
}

/// Check the file name, letter bucket and order of an included shard
pub fn check_layout(
    rules: &FormatRules,
    location: &str,
    document: &Location,
    repository: &Value,
    diags: &mut Diagnostics,
) {
    let scope = Scope::document(location);
    let file_name = document.file_name().unwrap_or_default();

    let Some(bucket) = rules.include_bucket(&file_name) else {
        diags.report(
            &scope,
            DiagnosticCode::InvalidIncludeFilename,
            format!(
                "Include file name {:?} must be a single letter, \"0-9\" or \"dependencies\" followed by .json",
                file_name
            ),
        );
        return;
    };

    for (key, label) in [("packages", "Packages"), ("dependencies", "Dependencies")] {
        let Some(records) = repository.get(key).and_then(Value::as_array) else {
            continue;
        };
        let names: Vec<String> = records.iter().filter_map(record_name).collect();

        if bucket != "dependencies" {
            for name in &names {
                if bucket_for(name).as_deref() != Some(bucket) {
                    diags.report(
                        &Scope::record(location, name.clone()),
                        DiagnosticCode::WrongBucket,
                        format!("{:?} must be in a file named after its first letter, not {}", name, file_name),
                    );
                }
            }
        }

        check_sorted(&scope, label, &names, diags);
    }
}

/// One diagnostic per line that is not tab-indented
pub fn check_indentation(rules: &FormatRules, location: &str, raw: &str, diags: &mut Diagnostics) {
    let scope = Scope::document(location);
    for (i, line) in raw.lines().enumerate() {
        if !rules.is_tab_indented(line) {
            diags.report(
                &scope,
                DiagnosticCode::InvalidIndentation,
                format!("Indent must be tabs in line {}", i + 1),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location(name: &str) -> Location {
        Location::parse(&format!("./repository/{}", name))
    }

    #[test]
    fn test_letter_shard_passes() {
        let repository = json!({
            "schema_version": "3.0.0",
            "packages": [
                { "name": "Pyflakes", "details": "https://github.com/a/Pyflakes" },
                { "details": "https://github.com/b/pytest-helper" }
            ]
        });
        let mut diags = Diagnostics::new();
        check_layout(&FormatRules::new(), "repository/p.json", &location("p.json"), &repository, &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_wrong_bucket_and_order() {
        let repository = json!({
            "packages": [
                { "name": "Quick" },
                { "name": "pep8" }
            ]
        });
        let mut diags = Diagnostics::new();
        check_layout(&FormatRules::new(), "repository/p.json", &location("p.json"), &repository, &mut diags);

        assert!(diags.contains(DiagnosticCode::WrongBucket));
        assert!(diags.contains(DiagnosticCode::SortOrder));
        let wrong = diags.all().iter().find(|d| d.code == DiagnosticCode::WrongBucket).unwrap();
        assert_eq!(wrong.record.as_deref(), Some("Quick"));
    }

    #[test]
    fn test_digit_bucket() {
        let repository = json!({ "packages": [{ "name": "1337 Theme" }, { "name": "7zip" }] });
        let mut diags = Diagnostics::new();
        check_layout(&FormatRules::new(), "repository/0-9.json", &location("0-9.json"), &repository, &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_dependencies_shard_skips_bucket() {
        let repository = json!({ "dependencies": [{ "name": "bz2" }, { "name": "ssl" }] });
        let mut diags = Diagnostics::new();
        check_layout(&FormatRules::new(), "repository/dependencies.json", &location(DEPENDENCIES_FILE), &repository, &mut diags);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_bad_include_file_name() {
        let mut diags = Diagnostics::new();
        check_layout(&FormatRules::new(), "repository/misc.json", &location("misc.json"), &json!({}), &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.all()[0].code, DiagnosticCode::InvalidIncludeFilename);
    }

    #[test]
    fn test_indentation_one_diagnostic_per_line() {
        let rules = FormatRules::new();
        let raw = "{\n\t\"schema_version\": \"3.0.0\",\n    \"packages\": [],\n  \"includes\": []\n}\n";
        let mut diags = Diagnostics::new();
        check_indentation(&rules, "repository.json", raw, &mut diags);

        let messages: Vec<_> = diags.all().iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["Indent must be tabs in line 3", "Indent must be tabs in line 4"]);
    }

    #[test]
    fn test_repository_keys() {
        let policy = VersionPolicy::new("3.0.0", &[]).unwrap();
        let repository = json!({
            "schema_version": "3.0.0",
            "packages": {},
            "includes": ["./a.json", 2]
        });
        let mut diags = Diagnostics::new();
        check_repository(&policy, "repository.json", &repository, &mut diags);
        assert_eq!(diags.len(), 2);
        assert!(diags.all().iter().all(|d| d.code == DiagnosticCode::WrongType));
    }
}
