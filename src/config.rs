//! Configuration file parser for ~/.config/memecast/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
//! `BOT_TOKEN` and `MEMECAST_DATABASE` in the environment take precedence
//! over the file.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::delivery::{DeliveryConfig, DEFAULT_CATEGORY, DEFAULT_MAX_MEDIA_BYTES};
use crate::ingest::{meme, reddit, DEFAULT_TITLE_MAX_CHARS};
use crate::transport::DEFAULT_API_BASE;

pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";
pub const DATABASE_ENV: &str = "MEMECAST_DATABASE";

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

/// Top-level application configuration.
///
/// Every section and key is optional; missing keys fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path. Defaults to `memecast.db` in the config directory.
    pub database: Option<String>,
    pub telegram: TelegramConfig,
    pub delivery: DeliverySettings,
    pub ingest: IngestConfig,
    pub schedule: ScheduleConfig,
}

/// Bot API settings.
///
/// Custom Debug impl masks `bot_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 20,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Minimum gap between two sends, in milliseconds.
    pub inter_send_delay_ms: u64,
    /// Category for items stored without one.
    pub default_category: String,
    /// Budget for one video download.
    pub media_timeout_secs: u64,
    pub max_media_bytes: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            inter_send_delay_ms: 500,
            default_category: DEFAULT_CATEGORY.to_string(),
            media_timeout_secs: 30,
            max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub title_max_chars: usize,
    pub reddit: RedditConfig,
    pub meme: MemeConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            reddit: RedditConfig::default(),
            meme: MemeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub base_url: String,
    pub subreddit: String,
    pub limit: u32,
    /// Category assigned to fetched posts.
    pub category: Option<String>,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: reddit::DEFAULT_BASE_URL.to_string(),
            subreddit: reddit::DEFAULT_SUBREDDIT.to_string(),
            limit: reddit::DEFAULT_LIMIT,
            category: Some("football_meme".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemeConfig {
    pub base_url: String,
    pub category: Option<String>,
}

impl Default for MemeConfig {
    fn default() -> Self {
        Self {
            base_url: meme::DEFAULT_BASE_URL.to_string(),
            category: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Minutes between `post_next` calls in `run` mode.
    pub post_interval_minutes: u64,
    /// Minutes between Reddit fetches in `run` mode. 0 = disabled.
    pub fetch_interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            post_interval_minutes: 60,
            fetch_interval_minutes: 0,
        }
    }
}

const KNOWN_KEYS: &[(&str, &[&str])] = &[
    ("database", &[]),
    ("telegram", &["bot_token", "api_base_url", "request_timeout_secs"]),
    (
        "delivery",
        &[
            "inter_send_delay_ms",
            "default_category",
            "media_timeout_secs",
            "max_media_bytes",
        ],
    ),
    ("ingest", &["title_max_chars", "reddit", "meme"]),
    ("schedule", &["post_interval_minutes", "fetch_interval_minutes"]),
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file and apply environment overrides.
    ///
    /// - Missing or empty file → defaults
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
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
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Environment values win over the file. Blank values are ignored.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_blank(BOT_TOKEN_ENV) {
            self.telegram.bot_token = Some(token.trim().to_string());
        }
        if let Some(db) = non_blank(DATABASE_ENV) {
            self.database = Some(db);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.post_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "schedule.post_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.delivery.media_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "delivery.media_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.delivery.default_category.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "delivery.default_category must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The bot token, wrapped so it cannot end up in logs.
    pub fn bot_token(&self) -> Option<SecretString> {
        self.telegram
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            inter_send_delay: Duration::from_millis(self.delivery.inter_send_delay_ms),
            default_category: self.delivery.default_category.trim().to_string(),
        }
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.media_timeout_secs)
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        let Some((_, children)) = KNOWN_KEYS.iter().find(|(k, _)| *k == key.as_str()) else {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        };
        if let Some(table) = value.as_table() {
            for child in table.keys() {
                if !children.contains(&child.as_str()) {
                    tracing::warn!(key = %format!("{key}.{child}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
