//! Schema version handling
//!
//! Channel documents carry `schema_version` strings such as `"3.0.0"` or
//! the legacy `"2.0"`. Short forms are padded so they parse as semver.

use semver::Version;
use std::fmt;

use crate::error::{ChannelError, Result};

/// A parsed `schema_version`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion {
    /// Normalised semantic version
    pub version: Version,
    /// The string as written in the document
    pub raw: String,
}

impl SchemaVersion {
    /// Parse a schema version, accepting `"2"`, `"2.0"` and `"2.0.0"`
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.strip_prefix('v').unwrap_or(raw);
        let parts = trimmed.split('.').count();
        let padded = match parts {
            1 => format!("{}.0.0", trimmed),
            2 => format!("{}.0", trimmed),
            _ => trimmed.to_string(),
        };
        let version = Version::parse(&padded)
            .map_err(|e| ChannelError::InvalidVersion(format!("{:?}: {}", raw, e)))?;
        Ok(Self {
            version,
            raw: raw.to_string(),
        })
    }

    pub fn version_string(&self) -> String {
        self.version.to_string()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// How a document's schema version is treated during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSupport {
    /// The authoritative version; validate fully
    Supported,
    /// A known older version; skip with a diagnostic
    Legacy(SchemaVersion),
    /// Anything else, including unparseable strings
    Unknown(String),
    /// No `schema_version` string at all
    Missing,
}

/// Classifies `schema_version` values against the configured versions
#[derive(Debug, Clone)]
pub struct VersionPolicy {
    supported: SchemaVersion,
    legacy: Vec<SchemaVersion>,
}

impl VersionPolicy {
    pub fn new(supported: &str, legacy: &[String]) -> Result<Self> {
        let supported = SchemaVersion::parse(supported)?;
        let legacy = legacy
            .iter()
            .map(|v| SchemaVersion::parse(v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { supported, legacy })
    }

    pub fn supported(&self) -> &SchemaVersion {
        &self.supported
    }

    /// Classify a raw `schema_version` value.
    ///
    /// The supported version must be written exactly; legacy versions are
    /// compared after normalisation so `"2.0"` and `"2"` both count.
    pub fn classify(&self, raw: Option<&serde_json::Value>) -> SchemaSupport {
        let Some(raw) = raw else {
            return SchemaSupport::Missing;
        };
        let Some(raw) = raw.as_str() else {
            return SchemaSupport::Unknown(raw.to_string());
        };
        if raw == self.supported.raw {
            return SchemaSupport::Supported;
        }
        match SchemaVersion::parse(raw) {
            Ok(parsed) if self.legacy.iter().any(|l| l.version == parsed.version) => {
                SchemaSupport::Legacy(parsed)
            }
            _ => SchemaSupport::Unknown(raw.to_string()),
        }
    }
}
