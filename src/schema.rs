//! Schema Registry
//!
//! Declares, per record kind, the allowed keys and the JSON types their
//! values may take. Unions (e.g. `donate` may be a string or null) are
//! expressed as several allowed types.

use serde_json::{Map, Value};
use std::fmt;

/// Runtime JSON type of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Bool,
    Number,
    Array,
    Object,
    Null,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueType::String,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
            Value::Null => ValueType::Null,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Number => "number",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Null => "null",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared key and its allowed value types
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub key: &'static str,
    pub types: &'static [ValueType],
}

impl KeySpec {
    const fn new(key: &'static str, types: &'static [ValueType]) -> Self {
        Self { key, types }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        self.types.contains(&ValueType::of(value))
    }

    /// Human readable list of accepted types, e.g. `string or null`
    pub fn expected(&self) -> String {
        self.types
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

use ValueType::{Array, Bool, Null, String as Str};

const CHANNEL_KEYS: &[KeySpec] = &[
    KeySpec::new("schema_version", &[Str]),
    KeySpec::new("repositories", &[Array]),
];

const REPOSITORY_KEYS: &[KeySpec] = &[
    KeySpec::new("schema_version", &[Str]),
    KeySpec::new("packages", &[Array]),
    KeySpec::new("dependencies", &[Array]),
    KeySpec::new("includes", &[Array]),
];

const PACKAGE_KEYS: &[KeySpec] = &[
    KeySpec::new("name", &[Str]),
    KeySpec::new("details", &[Str]),
    KeySpec::new("description", &[Str]),
    KeySpec::new("releases", &[Array]),
    KeySpec::new("homepage", &[Str]),
    KeySpec::new("author", &[Str, Array]),
    KeySpec::new("readme", &[Str]),
    KeySpec::new("issues", &[Str]),
    KeySpec::new("donate", &[Str, Null]),
    KeySpec::new("buy", &[Str]),
    KeySpec::new("previous_names", &[Array]),
    KeySpec::new("labels", &[Array]),
];

const DEPENDENCY_KEYS: &[KeySpec] = &[
    KeySpec::new("name", &[Str]),
    KeySpec::new("description", &[Str]),
    KeySpec::new("releases", &[Array]),
    KeySpec::new("issues", &[Str]),
    KeySpec::new("load_order", &[Str]),
    KeySpec::new("author", &[Str]),
];

const PACKAGE_RELEASE_KEYS: &[KeySpec] = &[
    KeySpec::new("base", &[Str]),
    KeySpec::new("tags", &[Bool, Str]),
    KeySpec::new("branch", &[Str]),
    KeySpec::new("sublime_text", &[Str]),
    KeySpec::new("platforms", &[Array, Str]),
    KeySpec::new("dependencies", &[Array]),
    KeySpec::new("version", &[Str]),
    KeySpec::new("date", &[Str]),
    KeySpec::new("url", &[Str]),
];

const DEPENDENCY_RELEASE_KEYS: &[KeySpec] = &[
    KeySpec::new("base", &[Str]),
    KeySpec::new("tags", &[Bool, Str]),
    KeySpec::new("branch", &[Str]),
    KeySpec::new("sublime_text", &[Str]),
    KeySpec::new("platforms", &[Array, Str]),
    KeySpec::new("dependencies", &[Array]),
    KeySpec::new("version", &[Str]),
    KeySpec::new("date", &[Str]),
    KeySpec::new("url", &[Str]),
    KeySpec::new("sha256", &[Str]),
];

/// Kind of record a key map applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Channel,
    Repository,
    Package,
    Dependency,
    PackageRelease,
    DependencyRelease,
}

impl RecordKind {
    /// Declared keys for this kind
    pub fn keys(&self) -> &'static [KeySpec] {
        match self {
            RecordKind::Channel => CHANNEL_KEYS,
            RecordKind::Repository => REPOSITORY_KEYS,
            RecordKind::Package => PACKAGE_KEYS,
            RecordKind::Dependency => DEPENDENCY_KEYS,
            RecordKind::PackageRelease => PACKAGE_RELEASE_KEYS,
            RecordKind::DependencyRelease => DEPENDENCY_RELEASE_KEYS,
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&'static KeySpec> {
        self.keys().iter().find(|spec| spec.key == key)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Channel => "channel",
            RecordKind::Repository => "repository",
            RecordKind::Package => "package",
            RecordKind::Dependency => "dependency",
            RecordKind::PackageRelease => "package release",
            RecordKind::DependencyRelease => "dependency release",
        }
    }

    /// Check every key of `record` against the declared map.
    ///
    /// Violations come back in the record's key order.
    pub fn check_keys(&self, record: &Map<String, Value>) -> Vec<KeyViolation> {
        let mut violations = Vec::new();
        for (key, value) in record {
            match self.lookup(key) {
                None => violations.push(KeyViolation::Unexpected {
                    kind: *self,
                    key: key.clone(),
                }),
                Some(spec) if !spec.accepts(value) => violations.push(KeyViolation::WrongType {
                    key: key.clone(),
                    expected: spec.expected(),
                    found: ValueType::of(value),
                }),
                Some(_) => {}
            }
        }
        violations
    }
}

/// A key that does not conform to its record kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyViolation {
    Unexpected { kind: RecordKind, key: String },
    WrongType { key: String, expected: String, found: ValueType },
}

impl fmt::Display for KeyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyViolation::Unexpected { kind, key } => {
                write!(f, "Unexpected key {:?} for a {}", key, kind.label())
            }
            KeyViolation::WrongType { key, expected, found } => {
                write!(f, "Key {:?} must be {}, found {}", key, expected, found)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_union_types_accepted() {
        let record = object(json!({
            "details": "https://github.com/foo/bar",
            "donate": null,
            "author": ["a", "b"]
        }));
        assert!(RecordKind::Package.check_keys(&record).is_empty());

        let record = object(json!({ "donate": "https://example.com/donate", "author": "a" }));
        assert!(RecordKind::Package.check_keys(&record).is_empty());
    }

    #[test]
    fn test_unexpected_and_wrong_type() {
        let record = object(json!({
            "name": "Foo",
            "load_order": "01",
            "releases": {}
        }));
        let violations = RecordKind::Package.check_keys(&record);
        assert_eq!(violations.len(), 2);
        assert!(matches!(&violations[0], KeyViolation::Unexpected { key, .. } if key == "load_order"));
        assert!(matches!(
            &violations[1],
            KeyViolation::WrongType { key, found: ValueType::Object, .. } if key == "releases"
        ));
    }

    #[test]
    fn test_sha256_only_for_dependency_releases() {
        let record = object(json!({ "sha256": "00" }));
        assert!(RecordKind::DependencyRelease.check_keys(&record).is_empty());
        assert_eq!(RecordKind::PackageRelease.check_keys(&record).len(), 1);
    }

    #[test]
    fn test_expected_type_message() {
        let spec = RecordKind::PackageRelease.lookup("tags").unwrap();
        assert_eq!(spec.expected(), "bool or string");
    }
}
