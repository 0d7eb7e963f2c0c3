//! Channel document checks

use std::collections::HashSet;

use serde_json::Value;

use super::{check_schema_version, check_sorted, report_key_violations};
use crate::diagnostics::{DiagnosticCode, Diagnostics, Scope};
use crate::schema::RecordKind;
use crate::version::VersionPolicy;

/// Whether a channel entry has an accepted shape: a relative path or an
/// https URL
pub fn is_repository_reference(reference: &str) -> bool {
    reference.starts_with('.') || reference.starts_with("https://")
}

/// Well-formed repository references of a channel, in listed order
pub fn repository_references(channel: &Value) -> Vec<String> {
    channel
        .get("repositories")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|r| is_repository_reference(r))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Check the channel document. The first `unsorted_leading` repositories
/// are exempt from the sort check.
pub fn check_channel(
    policy: &VersionPolicy,
    location: &str,
    channel: &Value,
    unsorted_leading: usize,
    diags: &mut Diagnostics,
) {
    let scope = Scope::document(location);
    let Some(record) = channel.as_object() else {
        diags.report(&scope, DiagnosticCode::WrongType, "The channel must be a JSON object");
        return;
    };

    report_key_violations(RecordKind::Channel, record, &scope, diags);
    check_schema_version(policy, &scope, channel, diags);

    let Some(repositories) = record.get("repositories") else {
        diags.report(&scope, DiagnosticCode::MissingKey, "The \"repositories\" key is required");
        return;
    };
    let Some(repositories) = repositories.as_array() else {
        return;
    };

    let mut names = Vec::with_capacity(repositories.len());
    let mut seen = HashSet::new();
    for (i, entry) in repositories.iter().enumerate() {
        let Some(reference) = entry.as_str() else {
            diags.report(
                &scope,
                DiagnosticCode::WrongType,
                format!("Repository #{} must be a string", i + 1),
            );
            continue;
        };
        if !is_repository_reference(reference) {
            diags.report(
                &scope,
                DiagnosticCode::InvalidUrl,
                format!(
                    "Repository {:?} must be a relative path starting with \".\" or an https:// URL",
                    reference
                ),
            );
        }
        if !seen.insert(reference) {
            diags.report(
                &scope,
                DiagnosticCode::DuplicateName,
                format!("Repository {:?} is listed more than once", reference),
            );
        }
        names.push(reference.to_string());
    }

    let sortable = names.get(unsorted_leading..).unwrap_or(&[]);
    check_sorted(&scope, "Repositories", sortable, diags);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> VersionPolicy {
        VersionPolicy::new("3.0.0", &["2.0".to_string()]).unwrap()
    }

    #[test]
    fn test_valid_channel() {
        let channel = json!({
            "schema_version": "3.0.0",
            "repositories": [
                "./repository.json",
                "https://bitbucket.org/a/b/raw/packages.json",
                "https://example.com/packages.json"
            ]
        });
        let mut diags = Diagnostics::new();
        check_channel(&policy(), "channel.json", &channel, 1, &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(repository_references(&channel).len(), 3);
    }

    #[test]
    fn test_leading_exception_and_sort_order() {
        let channel = json!({
            "schema_version": "3.0.0",
            "repositories": [
                "./repository.json",
                "https://z.example.com/packages.json",
                "https://a.example.com/packages.json"
            ]
        });
        let mut diags = Diagnostics::new();
        check_channel(&policy(), "channel.json", &channel, 1, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.all()[0].code, DiagnosticCode::SortOrder);

        // the whole list is exempt
        let mut diags = Diagnostics::new();
        check_channel(&policy(), "channel.json", &channel, 5, &mut diags);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_bad_references() {
        let channel = json!({
            "schema_version": "3.0.0",
            "repositories": ["./a.json", "http://insecure.example.com/p.json", 7, "./a.json"],
            "extra": 1
        });
        let mut diags = Diagnostics::new();
        check_channel(&policy(), "channel.json", &channel, 1, &mut diags);

        assert!(diags.contains(DiagnosticCode::InvalidUrl));
        assert!(diags.contains(DiagnosticCode::WrongType));
        assert!(diags.contains(DiagnosticCode::DuplicateName));
        assert!(diags.contains(DiagnosticCode::UnexpectedKey));
        assert_eq!(repository_references(&channel), vec!["./a.json", "./a.json"]);
    }

    #[test]
    fn test_missing_repositories_and_version() {
        let mut diags = Diagnostics::new();
        check_channel(&policy(), "channel.json", &json!({}), 1, &mut diags);
        assert_eq!(diags.len(), 2);
        assert!(diags.all().iter().all(|d| d.code == DiagnosticCode::MissingKey));
    }
}
