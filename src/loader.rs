//! Document Loading
//!
//! Reads channel and repository documents from the local filesystem or over
//! HTTP(S). Parsing keeps key insertion order so ordering and indentation
//! checks see the document as written.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{ChannelError, Result};

/// Where a document lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Path(PathBuf),
    Url(Url),
}

impl Location {
    /// Interpret a reference as written in a channel or repository file.
    /// Anything with an `http(s)` scheme is remote; everything else is a path.
    pub fn parse(reference: &str) -> Self {
        match Url::parse(reference) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Location::Url(url),
            _ => Location::Path(PathBuf::from(reference)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Resolve `reference` relative to this document.
    ///
    /// Absolute URLs are taken as is. Relative references join onto the
    /// parent directory of a path, or onto the URL itself.
    pub fn join(&self, reference: &str) -> Result<Location> {
        if let Location::Url(url) = Location::parse(reference) {
            return Ok(Location::Url(url));
        }
        match self {
            Location::Path(path) => {
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Path(normalize(&base.join(reference))))
            }
            Location::Url(url) => url
                .join(reference)
                .map(Location::Url)
                .map_err(|_| ChannelError::InvalidReference {
                    location: self.to_string(),
                    reference: reference.to_string(),
                }),
        }
    }

    /// Last path segment, e.g. `a.json`
    pub fn file_name(&self) -> Option<String> {
        match self {
            Location::Path(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Location::Url(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|s| !s.is_empty()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Path(path) => write!(f, "{}", path.display()),
            Location::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Drop `.` components and fold `..` where possible
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// A loaded document
#[derive(Debug, Clone)]
pub struct Document {
    pub location: Location,
    /// Raw text as read
    pub raw: String,
    /// Parsed content, keys in insertion order
    pub value: Value,
}

impl Document {
    /// Decode bytes into a document, with a distinct error per failure mode
    pub fn from_bytes(location: Location, bytes: Vec<u8>) -> Result<Self> {
        let raw = String::from_utf8(bytes).map_err(|_| ChannelError::NotUtf8 {
            location: location.to_string(),
        })?;
        if raw.trim().is_empty() {
            return Err(ChannelError::Empty {
                location: location.to_string(),
            });
        }
        let value = serde_json::from_str(&raw).map_err(|source| ChannelError::Json {
            location: location.to_string(),
            source,
        })?;
        Ok(Self { location, raw, value })
    }

    pub fn location_string(&self) -> String {
        self.location.to_string()
    }

    pub fn schema_version(&self) -> Option<&Value> {
        self.value.get("schema_version")
    }
}

/// Serialize a value the way channel files are written: tab indentation,
/// `": "` separators, keys in insertion order, trailing newline.
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(value, &mut ser)?;
    let mut text = String::from_utf8(buf).map_err(|e| {
        ChannelError::LocalIo(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    text.push('\n');
    Ok(text)
}

/// Loads documents from disk or over HTTP
pub struct Loader {
    client: Client,
    retries: u32,
}

impl Loader {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(http.timeout())
            .user_agent(http.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            retries: http.retries,
        })
    }

    pub fn load(&self, location: &Location) -> Result<Document> {
        let bytes = match location {
            Location::Path(path) => {
                debug!(path = %path.display(), "reading document");
                fs::read(path).map_err(|source| ChannelError::Io {
                    location: location.to_string(),
                    source,
                })?
            }
            Location::Url(url) => self.fetch_with_retry(url)?,
        };
        Document::from_bytes(location.clone(), bytes)
    }

    fn fetch_with_retry(&self, url: &Url) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.fetch(url) {
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(url = %url, attempt, error = %err, "transient fetch failure, retrying");
                    thread::sleep(Duration::from_millis(500 * u64::from(attempt)));
                }
                other => return other,
            }
        }
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(url = %url, "fetching document");
        let network = |e: reqwest::Error| ChannelError::Network {
            location: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url.clone()).send().map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::HttpStatus {
                location: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(network)?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{response, ScriptedServer};
    use serde_json::json;

    #[test]
    fn test_location_parse() {
        assert!(Location::parse("https://example.com/repo.json").is_remote());
        assert!(!Location::parse("./repository.json").is_remote());
        assert!(!Location::parse("repository/a.json").is_remote());
    }

    #[test]
    fn test_join_local() {
        let root = Location::Path(PathBuf::from("data/repository.json"));
        let joined = root.join("./repository/a.json").unwrap();
        assert_eq!(joined, Location::Path(PathBuf::from("data/repository/a.json")));

        let nested = joined.join("../b.json").unwrap();
        assert_eq!(nested, Location::Path(PathBuf::from("data/b.json")));
    }

    #[test]
    fn test_join_url() {
        let root = Location::parse("https://example.com/channel/repository.json");
        let joined = root.join("./repository/a.json").unwrap();
        assert_eq!(joined.to_string(), "https://example.com/channel/repository/a.json");
        assert_eq!(joined.file_name().as_deref(), Some("a.json"));

        let absolute = root.join("https://other.org/r.json").unwrap();
        assert_eq!(absolute.to_string(), "https://other.org/r.json");
    }

    #[test]
    fn test_decode_failures_are_distinct() {
        let loc = Location::Path(PathBuf::from("x.json"));
        assert!(matches!(
            Document::from_bytes(loc.clone(), vec![0xff, 0xfe]),
            Err(ChannelError::NotUtf8 { .. })
        ));
        assert!(matches!(
            Document::from_bytes(loc.clone(), b"  \n".to_vec()),
            Err(ChannelError::Empty { .. })
        ));
        assert!(matches!(
            Document::from_bytes(loc.clone(), b"{\"a\": }".to_vec()),
            Err(ChannelError::Json { .. })
        ));
        assert!(Document::from_bytes(loc, b"{\"a\": 1}".to_vec()).is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = Loader::new(&HttpConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let loc = Location::Path(dir.path().join("absent.json"));
        assert!(matches!(loader.load(&loc), Err(ChannelError::Io { .. })));
    }

    #[test]
    fn test_key_order_preserved() {
        let loc = Location::Path(PathBuf::from("x.json"));
        let doc = Document::from_bytes(loc, br#"{"zeta": 1, "alpha": 2}"#.to_vec()).unwrap();
        let keys: Vec<_> = doc.value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_transient_failure_retried_once() {
        let server = ScriptedServer::start(|_| {
            vec![
                response("503 Service Unavailable", &[], ""),
                response("200 OK", &[], r#"{"schema_version": "3.0.0"}"#),
            ]
        });
        let loader = Loader::new(&HttpConfig::default()).unwrap();

        let doc = loader.load(&Location::parse(&server.url("/packages.json"))).unwrap();
        assert_eq!(doc.value["schema_version"], "3.0.0");
        assert_eq!(server.hits(), 2);
    }

    #[test]
    fn test_retries_exhausted() {
        let server = ScriptedServer::start(|_| {
            vec![
                response("503 Service Unavailable", &[], ""),
                response("502 Bad Gateway", &[], ""),
            ]
        });
        let loader = Loader::new(&HttpConfig::default()).unwrap();

        let result = loader.load(&Location::parse(&server.url("/packages.json")));
        assert!(matches!(result, Err(ChannelError::HttpStatus { status: 502, .. })));
        assert_eq!(server.hits(), 2);
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let server = ScriptedServer::start(|_| {
            vec![
                response("404 Not Found", &[], ""),
                response("200 OK", &[], "{}"),
            ]
        });
        let loader = Loader::new(&HttpConfig::default()).unwrap();

        let result = loader.load(&Location::parse(&server.url("/packages.json")));
        assert!(matches!(result, Err(ChannelError::HttpStatus { status: 404, .. })));
        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn test_canonical_json_uses_tabs() {
        let text = canonical_json(&json!({ "schema_version": "3.0.0", "packages": [] })).unwrap();
        assert_eq!(text, "{\n\t\"schema_version\": \"3.0.0\",\n\t\"packages\": []\n}\n");
    }
}
