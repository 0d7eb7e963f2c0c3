//! Configuration for the channel validator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (channel.toml)
//! - Environment variables (CHANNEL__*)
//!
//! ## Example config file (channel.toml):
//! ```toml
//! [channel]
//! file = "channel.json"
//! repository_dir = "repository"
//!
//! [schema]
//! version = "3.0.0"
//! legacy_versions = ["1.0", "1.1", "1.2", "2.0"]
//!
//! [walk]
//! max_include_depth = 8
//!
//! [http]
//! timeout_secs = 30
//! retries = 1
//!
//! [validation]
//! unsorted_leading_repositories = 1
//!
//! [review]
//! current_build = 4169
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the validator and its companion tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub walk: WalkConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub review: ReviewConfig,
}

/// Where the channel data lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel file, relative to the data root
    #[serde(default = "default_channel_file")]
    pub file: PathBuf,

    /// Directory holding the letter-sharded repository files
    #[serde(default = "default_repository_dir")]
    pub repository_dir: PathBuf,
}

/// Accepted schema versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// The authoritative schema version
    #[serde(default = "default_schema_version")]
    pub version: String,

    /// Older versions that are skipped rather than failed
    #[serde(default = "default_legacy_versions")]
    pub legacy_versions: Vec<String>,
}

/// Include walking limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkConfig {
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

/// Remote fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pause between requests when scanning many URLs
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

/// Rule tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Leading channel repositories exempt from the sort check
    #[serde(default = "default_unsorted_leading")]
    pub unsorted_leading_repositories: usize,
}

/// Review of newly added packages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Build that at least one release of a new package should support
    #[serde(default = "default_current_build")]
    pub current_build: u32,
}

// Default value functions
fn default_channel_file() -> PathBuf {
    PathBuf::from("channel.json")
}

fn default_repository_dir() -> PathBuf {
    PathBuf::from("repository")
}

fn default_schema_version() -> String {
    "3.0.0".to_string()
}

fn default_legacy_versions() -> Vec<String> {
    ["1.0", "1.1", "1.2", "2.0"].iter().map(|s| s.to_string()).collect()
}

fn default_max_include_depth() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    1
}

fn default_user_agent() -> String {
    format!("package-channel/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_unsorted_leading() -> usize {
    1
}

fn default_current_build() -> u32 {
    4169
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            file: default_channel_file(),
            repository_dir: default_repository_dir(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            version: default_schema_version(),
            legacy_versions: default_legacy_versions(),
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_include_depth: default_max_include_depth(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            user_agent: default_user_agent(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            unsorted_leading_repositories: default_unsorted_leading(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            current_build: default_current_build(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl ValidatorConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["channel.toml", ".channel.toml", "config/channel.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("io", "package-channel", "channel") {
            let xdg_config = config_dir.config_dir().join("channel.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (CHANNEL__*)
        builder = builder.add_source(
            Environment::with_prefix("CHANNEL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Resolve the channel file under a data root
    pub fn channel_path(&self, root: &std::path::Path) -> PathBuf {
        if self.channel.file.is_absolute() {
            self.channel.file.clone()
        } else {
            root.join(&self.channel.file)
        }
    }

    /// Resolve the repository directory under a data root
    pub fn repository_dir(&self, root: &std::path::Path) -> PathBuf {
        if self.channel.repository_dir.is_absolute() {
            self.channel.repository_dir.clone()
        } else {
            root.join(&self.channel.repository_dir)
        }
    }
}
