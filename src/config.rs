//! Configuration file parser for feedbridge.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which is then almost always unusable because no platform token is set;
//! `validate()` catches that at startup. Secrets can live in the file or be
//! injected through environment variables (env wins).

use serde::Deserialize;
use std::path::Path;
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

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Enumerated options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProviderKind {
    Google,
    Deepl,
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Console,
    Json,
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
///
/// The custom Debug impl masks every secret to prevent leakage in logs and
/// error messages.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file path.
    pub database_path: String,

    /// Dispatch cycle period in minutes (>= 1).
    pub fetch_interval_minutes: u64,

    /// Janitor period in hours (>= 1).
    pub cleanup_interval_hours: u64,

    /// Entries and receipts older than this many days are purged (>= 1).
    pub entry_retention_days: u64,

    /// Translation cache backend.
    pub cache_backend: CacheBackendKind,
    pub redis_url: Option<String>,
    pub translation_cache_ttl_days: u64,

    /// Translation master switch and provider selection.
    pub translation_enabled: bool,
    pub translation_provider: TranslationProviderKind,
    pub openai_model: String,
    /// Override for OpenAI-compatible APIs.
    pub openai_base_url: Option<String>,

    /// Maximum feeds per channel (0 = unlimited).
    pub max_feeds_per_channel: u64,

    /// Fetcher concurrency permit.
    pub max_concurrent_fetches: usize,

    /// Delay between consecutive sends to one channel, in milliseconds.
    pub send_delay_ms: u64,

    /// Log level ("trace" .. "error") and output format.
    pub log_level: String,
    pub log_format: LogFormat,

    // ===== Secrets (file or env; env wins) =====
    pub discord_token: Option<String>,
    pub telegram_token: Option<String>,
    pub deepl_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "data/feedbridge.db".to_string(),
            fetch_interval_minutes: 60,
            cleanup_interval_hours: 24,
            entry_retention_days: 7,
            cache_backend: CacheBackendKind::Memory,
            redis_url: None,
            translation_cache_ttl_days: 7,
            translation_enabled: false,
            translation_provider: TranslationProviderKind::Deepl,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: None,
            max_feeds_per_channel: 0,
            max_concurrent_fetches: 10,
            send_delay_ms: 500,
            log_level: "info".to_string(),
            log_format: LogFormat::Console,
            discord_token: None,
            telegram_token: None,
            deepl_api_key: None,
            openai_api_key: None,
            google_api_key: None,
        }
    }
}

/// Mask secrets in Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn masked(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "[REDACTED]"
            } else {
                "None"
            }
        }

        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("fetch_interval_minutes", &self.fetch_interval_minutes)
            .field("cleanup_interval_hours", &self.cleanup_interval_hours)
            .field("entry_retention_days", &self.entry_retention_days)
            .field("cache_backend", &self.cache_backend)
            .field("redis_url", &self.redis_url)
            .field("translation_cache_ttl_days", &self.translation_cache_ttl_days)
            .field("translation_enabled", &self.translation_enabled)
            .field("translation_provider", &self.translation_provider)
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("max_feeds_per_channel", &self.max_feeds_per_channel)
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("send_delay_ms", &self.send_delay_ms)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("discord_token", &masked(&self.discord_token))
            .field("telegram_token", &masked(&self.telegram_token))
            .field("deepl_api_key", &masked(&self.deepl_api_key))
            .field("openai_api_key", &masked(&self.openai_api_key))
            .field("google_api_key", &masked(&self.google_api_key))
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file and apply env overrides.
    ///
    /// - Missing file → `Ok(Config::default())` (plus env)
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        fn env_override(target: &mut Option<String>, var: &str) {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *target = Some(value);
                }
            }
        }

        env_override(&mut self.discord_token, "DISCORD_TOKEN");
        env_override(&mut self.telegram_token, "TELEGRAM_TOKEN");
        env_override(&mut self.deepl_api_key, "DEEPL_API_KEY");
        env_override(&mut self.openai_api_key, "OPENAI_API_KEY");
        env_override(&mut self.google_api_key, "GOOGLE_TRANSLATE_API_KEY");
        env_override(&mut self.redis_url, "REDIS_URL");
    }

    /// Startup validation. Violations here are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_interval_minutes < 1 {
            return Err(ConfigError::Invalid(
                "fetch_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval_hours < 1 {
            return Err(ConfigError::Invalid(
                "cleanup_interval_hours must be at least 1".to_string(),
            ));
        }
        if self.entry_retention_days < 1 {
            return Err(ConfigError::Invalid(
                "entry_retention_days must be at least 1".to_string(),
            ));
        }
        if self.cache_backend == CacheBackendKind::Redis && self.redis_url.is_none() {
            return Err(ConfigError::Invalid(
                "cache_backend = \"redis\" requires redis_url".to_string(),
            ));
        }
        if self.discord_token.is_none() && self.telegram_token.is_none() {
            return Err(ConfigError::Invalid(
                "No platform token configured. Set DISCORD_TOKEN or TELEGRAM_TOKEN.".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether translation is both enabled and credentialed.
    pub fn can_translate(&self) -> bool {
        if !self.translation_enabled {
            return false;
        }
        match self.translation_provider {
            TranslationProviderKind::Deepl => self.deepl_api_key.is_some(),
            TranslationProviderKind::Google => self.google_api_key.is_some(),
            TranslationProviderKind::Openai => self.openai_api_key.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fetch_interval_minutes, 60);
        assert_eq!(config.entry_retention_days, 7);
        assert_eq!(config.cache_backend, CacheBackendKind::Memory);
        assert!(!config.translation_enabled);
        assert_eq!(config.send_delay_ms, 500);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            fetch_interval_minutes = 15
            translation_enabled = true
            translation_provider = "openai"
            openai_api_key = "sk-test"
            discord_token = "token"
        "#,
        )
        .unwrap();

        assert_eq!(config.fetch_interval_minutes, 15);
        assert_eq!(config.translation_provider, TranslationProviderKind::Openai);
        assert!(config.can_translate());
        // untouched keys keep defaults
        assert_eq!(config.cleanup_interval_hours, 24);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            fetch_interval_minutes: 0,
            discord_token: Some("t".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_a_platform_token() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("platform token"));

        let config = Config {
            telegram_token: Some("t".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_redis_requires_url() {
        let config = Config {
            cache_backend: CacheBackendKind::Redis,
            discord_token: Some("t".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_can_translate_needs_matching_key() {
        let config = Config {
            translation_enabled: true,
            translation_provider: TranslationProviderKind::Deepl,
            openai_api_key: Some("sk".into()), // wrong provider's key
            ..Default::default()
        };
        assert!(!config.can_translate());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let config = Config {
            discord_token: Some("super-secret".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
