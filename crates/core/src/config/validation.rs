//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL
    /// - `cache_version`, `fallback_store_version` or `user_agent` is empty
    /// - `offline_path` or a manifest entry is not an absolute path
    /// - `max_cache_bytes` is 0 or `eviction_target_ratio` is outside (0, 1]
    /// - a poll period is under 100ms
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;

        if self.cache_version.trim().is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }
        if self.fallback_store_version.trim().is_empty() {
            return Err(invalid("fallback_store_version", "must not be empty"));
        }

        if !self.offline_path.starts_with('/') {
            return Err(invalid("offline_path", "must start with '/'"));
        }
        if let Some(bad) = self.manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "manifest".into(),
                reason: format!("entry {bad:?} must start with '/'"),
            });
        }
        if !self.manifest.iter().any(|p| p == &self.offline_path) {
            tracing::warn!(
                offline_path = %self.offline_path,
                "offline document is not in the manifest; offline navigations fail until it is cached"
            );
        }

        if self.max_cache_bytes == 0 {
            return Err(invalid("max_cache_bytes", "must be greater than 0"));
        }
        if !(self.eviction_target_ratio > 0.0 && self.eviction_target_ratio <= 1.0) {
            return Err(invalid("eviction_target_ratio", "must be in (0, 1]"));
        }

        if self.offline_poll_ms < 100 {
            return Err(invalid("offline_poll_ms", "must be at least 100ms"));
        }
        if self.probe_interval_ms < 100 {
            return Err(invalid("probe_interval_ms", "must be at least 100ms"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(config: AppConfig) -> String {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_origin() {
        assert_eq!(field_of(AppConfig { origin: "not a url".into(), ..Default::default() }), "origin");
    }

    #[test]
    fn test_validate_empty_versions() {
        assert_eq!(field_of(AppConfig { cache_version: " ".into(), ..Default::default() }), "cache_version");
        assert_eq!(
            field_of(AppConfig { fallback_store_version: String::new(), ..Default::default() }),
            "fallback_store_version"
        );
    }

    #[test]
    fn test_validate_relative_paths() {
        assert_eq!(field_of(AppConfig { offline_path: "offline.html".into(), ..Default::default() }), "offline_path");
        assert_eq!(
            field_of(AppConfig { manifest: vec!["/".into(), "js/app.js".into()], ..Default::default() }),
            "manifest"
        );
    }

    #[test]
    fn test_validate_eviction() {
        assert_eq!(field_of(AppConfig { max_cache_bytes: 0, ..Default::default() }), "max_cache_bytes");
        assert_eq!(field_of(AppConfig { eviction_target_ratio: 0.0, ..Default::default() }), "eviction_target_ratio");
        assert_eq!(field_of(AppConfig { eviction_target_ratio: 1.5, ..Default::default() }), "eviction_target_ratio");
        assert!(AppConfig { eviction_target_ratio: 1.0, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_validate_periods() {
        assert_eq!(field_of(AppConfig { offline_poll_ms: 10, ..Default::default() }), "offline_poll_ms");
        assert_eq!(field_of(AppConfig { probe_interval_ms: 0, ..Default::default() }), "probe_interval_ms");
    }

    #[test]
    fn test_validate_timeout_bounds() {
        assert_eq!(field_of(AppConfig { timeout_ms: 50, ..Default::default() }), "timeout_ms");
        assert_eq!(field_of(AppConfig { timeout_ms: 301_000, ..Default::default() }), "timeout_ms");
        assert!(AppConfig { timeout_ms: 100, ..Default::default() }.validate().is_ok());
        assert!(AppConfig { timeout_ms: 300_000, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_user_agent() {
        assert_eq!(field_of(AppConfig { user_agent: String::new(), ..Default::default() }), "user_agent");
    }
}
