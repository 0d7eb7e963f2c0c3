//! Package fingerprints for revision diffs

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::loader::canonical_json;

/// SHA256 of a record's canonical serialization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute from a JSON record.
    ///
    /// Records that differ only in whitespace get the same fingerprint; key
    /// order is significant.
    pub fn of_record(value: &serde_json::Value) -> Result<Self> {
        Ok(Self::from_bytes(canonical_json(value)?.as_bytes()))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for display
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_ignores_formatting() {
        let compact: serde_json::Value =
            serde_json::from_str(r#"{"name":"Foo","releases":[{"tags":true}]}"#).unwrap();
        let spaced: serde_json::Value =
            serde_json::from_str("{\n  \"name\": \"Foo\",\n  \"releases\": [ { \"tags\": true } ]\n}").unwrap();
        assert_eq!(
            Fingerprint::of_record(&compact).unwrap(),
            Fingerprint::of_record(&spaced).unwrap()
        );
    }

    #[test]
    fn test_fingerprint_detects_changes() {
        let a = Fingerprint::of_record(&json!({ "name": "Foo", "labels": ["a"] })).unwrap();
        let b = Fingerprint::of_record(&json!({ "name": "Foo", "labels": ["b"] })).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }
}
