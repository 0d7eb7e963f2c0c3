//! Error types for the channel validator
//!
//! These cover structural and operational failures. Rule violations inside a
//! well-formed document are not errors; they are reported as
//! [`Diagnostic`](crate::diagnostics::Diagnostic)s.

use thiserror::Error;

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Channel validator errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Unable to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to fetch {location}: {message}")]
    Network { location: String, message: String },

    #[error("Fetching {location} returned HTTP status {status}")]
    HttpStatus { location: String, status: u16 },

    #[error("Contents of {location} are not valid UTF-8")]
    NotUtf8 { location: String },

    #[error("Contents of {location} are empty")]
    Empty { location: String },

    #[error("Malformed JSON in {location}: {source}")]
    Json {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Include depth limit of {limit} exceeded at {location}")]
    DepthExceeded { location: String, limit: usize },

    #[error("Invalid reference {reference:?} in {location}")]
    InvalidReference { location: String, reference: String },

    #[error("Invalid schema version: {0}")]
    InvalidVersion(String),

    #[error("IO error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl ChannelError {
    /// Whether the failure is worth retrying: connect errors, timeouts and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ChannelError::Network { .. } => true,
            ChannelError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The location the failure is attributed to, when there is one
    pub fn location(&self) -> Option<&str> {
        match self {
            ChannelError::Io { location, .. }
            | ChannelError::Network { location, .. }
            | ChannelError::HttpStatus { location, .. }
            | ChannelError::NotUtf8 { location }
            | ChannelError::Empty { location }
            | ChannelError::Json { location, .. }
            | ChannelError::DepthExceeded { location, .. }
            | ChannelError::InvalidReference { location, .. } => Some(location),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let network = ChannelError::Network {
            location: "https://example.com/r.json".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(network.is_transient());

        let server = ChannelError::HttpStatus {
            location: "https://example.com/r.json".to_string(),
            status: 503,
        };
        assert!(server.is_transient());

        let missing = ChannelError::HttpStatus {
            location: "https://example.com/r.json".to_string(),
            status: 404,
        };
        assert!(!missing.is_transient());

        let empty = ChannelError::Empty { location: "a.json".to_string() };
        assert!(!empty.is_transient());
    }

    #[test]
    fn test_location_is_attributed() {
        let err = ChannelError::NotUtf8 { location: "repository/b.json".to_string() };
        assert_eq!(err.location(), Some("repository/b.json"));
        assert_eq!(err.to_string(), "Contents of repository/b.json are not valid UTF-8");
    }
}
