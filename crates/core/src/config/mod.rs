//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TIDECACHE_*)
//! 2. TOML config file (if TIDECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::key::default_volatile_params;
use crate::strategy::StrategyRule;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TIDECACHE_*)
/// 2. TOML config file (if TIDECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite partition store.
    ///
    /// Set via TIDECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin served by the engine. Requests to any other origin bypass it.
    ///
    /// Set via TIDECACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Current version; the last segment of every partition name.
    ///
    /// Set via TIDECACHE_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Deployment variant segment of partition names.
    ///
    /// Set via TIDECACHE_VARIANT environment variable.
    #[serde(default = "default_variant")]
    pub variant: String,

    /// User-Agent string for network requests.
    ///
    /// Set via TIDECACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network fetch timeout in milliseconds.
    ///
    /// Set via TIDECACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Byte ceiling of the image partition.
    ///
    /// Set via TIDECACHE_IMAGE_BUDGET_BYTES environment variable.
    #[serde(default = "default_image_budget_bytes")]
    pub image_budget_bytes: u64,

    /// Fraction of image entries deleted once the budget is exceeded.
    #[serde(default = "default_eviction_fraction")]
    pub eviction_fraction: f64,

    /// Period of the background eviction run, in seconds.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// Run eviction after an image write once the image partition holds more
    /// than this many entries. Unset disables the opportunistic run.
    #[serde(default)]
    pub eviction_entry_threshold: Option<usize>,

    /// Navigation fallback document, stored in the offline partition at install.
    #[serde(default = "default_offline_document")]
    pub offline_document: String,

    /// Critical resources bulk-added into the static partition at install.
    #[serde(default = "default_precache_static")]
    pub precache_static: Vec<String>,

    /// Extra resources bulk-added into the offline partition at install.
    #[serde(default)]
    pub precache_offline: Vec<String>,

    /// Query parameters stripped from cache keys (`*` suffix matches a prefix).
    #[serde(default = "default_volatile_params")]
    pub volatile_params: Vec<String>,

    /// Resource templates for PRELOAD_MARKET_RESOURCES; `{market}` is replaced
    /// by the requested market slug.
    #[serde(default = "default_market_resources")]
    pub market_resources: Vec<String>,

    /// Maximum concurrent fetches in one preload batch.
    #[serde(default = "default_preload_concurrency")]
    pub preload_concurrency: usize,

    /// Ordered strategy rules replacing the built-in set.
    #[serde(default)]
    pub rules: Option<Vec<StrategyRule>>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tidecache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_version() -> String {
    "1.0.0".into()
}

fn default_variant() -> String {
    "pwa".into()
}

fn default_user_agent() -> String {
    "tidecache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_image_budget_bytes() -> u64 {
    52_428_800 // 50MB
}

fn default_eviction_fraction() -> f64 {
    0.2
}

fn default_eviction_interval_secs() -> u64 {
    300
}

fn default_offline_document() -> String {
    "/offline.html".into()
}

fn default_precache_static() -> Vec<String> {
    vec!["/".into(), "/manifest.json".into()]
}

fn default_market_resources() -> Vec<String> {
    vec!["/markets/{market}".into(), "/api/markets/{market}.json".into()]
}

fn default_preload_concurrency() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            version: default_version(),
            variant: default_variant(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            image_budget_bytes: default_image_budget_bytes(),
            eviction_fraction: default_eviction_fraction(),
            eviction_interval_secs: default_eviction_interval_secs(),
            eviction_entry_threshold: None,
            offline_document: default_offline_document(),
            precache_static: default_precache_static(),
            precache_offline: Vec::new(),
            volatile_params: default_volatile_params(),
            market_resources: default_market_resources(),
            preload_concurrency: default_preload_concurrency(),
            rules: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Eviction period as Duration for `tokio::time::interval`.
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TIDECACHE_`
    /// 2. TOML file from `TIDECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TIDECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TIDECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./tidecache.sqlite"));
        assert_eq!(config.origin, "http://localhost:3000");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.variant, "pwa");
        assert_eq!(config.image_budget_bytes, 52_428_800);
        assert_eq!(config.eviction_fraction, 0.2);
        assert_eq!(config.offline_document, "/offline.html");
        assert!(config.eviction_entry_threshold.is_none());
        assert!(config.rules.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(15_000));
        assert_eq!(config.eviction_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_toml_layer() {
        let toml = r#"
            version = "2.1.0"
            variant = "web"
            eviction_entry_threshold = 100
            precache_static = ["/app.js"]

            [[rules]]
            strategy = "cache-only"
            pattern = { path_prefix = "/downloads/" }
        "#;
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert_eq!(config.version, "2.1.0");
        assert_eq!(config.variant, "web");
        assert_eq!(config.eviction_entry_threshold, Some(100));
        assert_eq!(config.precache_static, vec!["/app.js".to_string()]);
        assert_eq!(config.rules.as_ref().map(Vec::len), Some(1));
        assert!(config.validate().is_ok());
    }
}
