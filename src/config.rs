//! YAML configuration and credentials
//!
//! ```yaml
//! local:
//!   output_dir: ./data
//!   save_format: csv
//! twitter:
//!   account:
//!     bearer_token: "..."
//!   query_params:
//!     expansions: [author_id, referenced_tweets.id]
//!     tweet_fields: [created_at, referenced_tweets]
//! harvest:
//!   accumulation: streaming
//!   full_save: true
//! ```
//!
//! Unknown keys are rejected at every level. The bearer token only ever
//! lives in a [`Credentials`] value handed to the transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::accumulator::AccumulationMode;
use crate::harvester::config::{
    DEFAULT_BASE_URL, DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, MAX_SEARCH_PAGE, MAX_TIMELINE_PAGE,
    MIN_BATCH_SIZE, MIN_TIMELINE_PAGE,
};
use crate::output::SaveFormat;
use crate::query::{FieldGroups, FieldPolicy};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {reason}")]
    Io {
        /// Config path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// YAML syntax or structure error
    #[error("invalid config: {0}")]
    Yaml(String),

    /// Value out of range or missing
    #[error("config validation failed: {0}")]
    Validation(String),
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// API bearer token; `Debug` never prints it
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    bearer_token: String,
}

impl Credentials {
    /// Wrap a bearer token
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
        }
    }

    /// Token value for the `Authorization` header
    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    /// Whether the token is blank
    pub fn is_empty(&self) -> bool {
        self.bearer_token.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials([REDACTED])")
    }
}

/// Harvest behaviour shared by every query mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestOptions {
    /// Buffered or streaming accumulation
    pub accumulation: AccumulationMode,
    /// Keep every field (`true`) or the curated subset
    pub full_save: bool,
    /// What to do with field groups a mode does not support
    pub field_policy: FieldPolicy,
    /// Timeline page size
    pub page_size: u32,
    /// Per-request ceiling for search and lookups
    pub batch_size: usize,
    /// Table format
    pub save_format: SaveFormat,
    /// Tag timeline rows with the target identifier
    pub tag_target: bool,
    /// API base URL
    pub base_url: String,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            accumulation: AccumulationMode::default(),
            full_save: true,
            field_policy: FieldPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            save_format: SaveFormat::default(),
            tag_target: false,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl HarvestOptions {
    /// Check sizes against the API limits
    pub fn validate(&self) -> ConfigResult<()> {
        if !(MIN_TIMELINE_PAGE..=MAX_TIMELINE_PAGE).contains(&self.page_size) {
            return Err(ConfigError::Validation(format!(
                "page_size {} outside {MIN_TIMELINE_PAGE}..={MAX_TIMELINE_PAGE}",
                self.page_size
            )));
        }
        if !(MIN_BATCH_SIZE..=MAX_SEARCH_PAGE).contains(&self.batch_size) {
            return Err(ConfigError::Validation(format!(
                "batch_size {} outside {MIN_BATCH_SIZE}..={MAX_SEARCH_PAGE}",
                self.batch_size
            )));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "base_url must be an http(s) URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// `local` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Root of all run directories
    pub output_dir: PathBuf,
    /// Table format; overrides `harvest.save_format` when given
    #[serde(default)]
    pub save_format: Option<SaveFormat>,
}

/// `twitter.account` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// API bearer token
    pub bearer_token: Credentials,
}

/// `twitter` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TwitterConfig {
    /// Account credentials
    pub account: AccountConfig,
    /// Requested field groups
    #[serde(default)]
    pub query_params: FieldGroups,
}

/// Whole configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestConfig {
    /// Local paths and format
    pub local: LocalConfig,
    /// API account and fields
    pub twitter: TwitterConfig,
    /// Harvest behaviour
    #[serde(default)]
    pub harvest: HarvestOptions,
}

impl HarvestConfig {
    /// Load and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: HarvestConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check credentials and harvest options
    pub fn validate(&self) -> ConfigResult<()> {
        if self.twitter.account.bearer_token.is_empty() {
            return Err(ConfigError::Validation(
                "twitter.account.bearer_token is empty".to_string(),
            ));
        }
        self.harvest.validate()
    }

    /// Credentials for the transport
    pub fn credentials(&self) -> Credentials {
        self.twitter.account.bearer_token.clone()
    }

    /// Harvest options, with the table format taken from `local.save_format`
    /// when that key is present
    pub fn options(&self) -> HarvestOptions {
        HarvestOptions {
            save_format: self.local.save_format.unwrap_or(self.harvest.save_format),
            ..self.harvest.clone()
        }
    }
}
