//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::cache::naming::{validate_variant, validate_version};
use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `version`/`variant` would produce a malformed partition name
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `image_budget_bytes` or `eviction_interval_secs` is 0
    /// - `eviction_fraction` is outside (0, 1]
    /// - `preload_concurrency` is outside 1..=16
    /// - `offline_document` is empty or `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if `market_resources` templates lack
    /// the `{market}` placeholder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
            Ok(_) => return Err(invalid("origin", "must be an http(s) URL with a host")),
            Err(e) => return Err(invalid("origin", e.to_string())),
        }

        validate_version(&self.version).map_err(|e| invalid("version", e.to_string()))?;
        validate_variant(&self.variant).map_err(|e| invalid("variant", e.to_string()))?;

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.image_budget_bytes == 0 {
            return Err(invalid("image_budget_bytes", "must be greater than 0"));
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(invalid("eviction_fraction", "must be in (0, 1]"));
        }
        if self.eviction_interval_secs == 0 {
            return Err(invalid("eviction_interval_secs", "must be greater than 0"));
        }

        if !(1..=16).contains(&self.preload_concurrency) {
            return Err(invalid("preload_concurrency", "must be between 1 and 16"));
        }

        if self.offline_document.is_empty() {
            return Err(invalid("offline_document", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if let Some(template) = self.market_resources.iter().find(|t| !t.contains("{market}")) {
            return Err(ConfigError::Missing {
                field: "market_resources".into(),
                hint: format!("template {template:?} has no {{market}} placeholder"),
            });
        }

        if self.eviction_entry_threshold == Some(0) {
            tracing::warn!("eviction_entry_threshold is 0; eviction will run after every image write");
        }

        Ok(())
    }
}
