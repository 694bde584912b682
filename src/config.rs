//! Configuration file parser for ~/.config/hoyolab-news/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! `Config::write_default` creates a commented starter file.
//! Unknown top-level keys are accepted but logged as warnings since they are
//! usually typos.
use crate::hoyolab::{ClientBuildError, HoyolabNews, DEFAULT_BASE_URL};
use crate::models::{FeedItemCategory, Game, Language};
use crate::sync::{FetchPolicy, RefreshOptions};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Response language for every request.
    pub language: Language,

    /// API host. Only changed for testing against a local mock.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum full-post requests in flight per source.
    pub concurrency: usize,

    /// Behaviour when a single post fails during a poll.
    pub policy: FetchPolicy,

    /// Items kept per source after merging (0 = unlimited).
    pub max_items: usize,

    /// Games and categories to poll.
    pub sources: Vec<SourceConfig>,
}

/// One game to poll, with the categories of interest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub game: Game,

    #[serde(default = "all_categories")]
    pub categories: Vec<FeedItemCategory>,

    /// Posts requested per category from the list endpoint.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn all_categories() -> Vec<FeedItemCategory> {
    FeedItemCategory::ALL.to_vec()
}

fn default_page_size() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: Language::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
            concurrency: 5,
            policy: FetchPolicy::default(),
            max_items: 0,
            sources: Vec::new(),
        }
    }
}

/// Written by [`Config::write_default`] on first run.
const DEFAULT_CONFIG_TOML: &str = r#"# hoyolab-news configuration

# Response language (en-us, de-de, ja-jp, ...)
language = "en-us"

# Per-request timeout in seconds
timeout_secs = 10

# Full-post requests in flight per source
concurrency = 5

# fail-fast: stop a poll at the first failing post
# collect-all: keep the other posts and report failures
policy = "fail-fast"

# Items kept per source (0 = unlimited)
max_items = 0

# One block per game: honkai, genshin, themis, starrail, zenless
[[sources]]
game = "genshin"
categories = ["notices", "events", "info"]
page_size = 5
"#;

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Zero timeout or concurrency → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "language",
                "base_url",
                "timeout_secs",
                "concurrency",
                "policy",
                "max_items",
                "sources",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            language = %config.language,
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Writes a commented default config with one sample source to `path`,
    /// creating parent directories as needed.
    ///
    /// Never overwrites: an existing file is an `Err(ConfigError::Io)`.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(DEFAULT_CONFIG_TOML.as_bytes())?;

        tracing::info!(path = %path.display(), "Wrote default configuration");
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if let Some(source) = self.sources.iter().find(|s| s.categories.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "source '{}' has no categories",
                source.game
            )));
        }
        Ok(())
    }

    /// Builds a client for `game` with this configuration's API settings.
    pub fn client_for(&self, game: Game) -> Result<HoyolabNews, ClientBuildError> {
        let client = HoyolabNews::new(game, Some(self.language))
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if self.base_url == DEFAULT_BASE_URL {
            Ok(client)
        } else {
            client.with_base_url(&self.base_url)
        }
    }

    pub fn refresh_options(&self, source: &SourceConfig) -> RefreshOptions {
        RefreshOptions {
            page_size: source.page_size,
            policy: self.policy,
            concurrency: self.concurrency,
            max_items: self.max_items,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
