//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFLINE_H5_*)
//! 2. TOML config file (if OFFLINE_H5_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::EvictionPolicy;
use crate::fallback::FallbackConfig;
use crate::strategy::{RoutePolicy, Strategy};
use crate::worker::{DEFAULT_MANIFEST, Manifest, WorkerConfig};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFLINE_H5_*)
/// 2. TOML config file (if OFFLINE_H5_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding buckets, records and notes.
    ///
    /// Set via OFFLINE_H5_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the page is served from; only its requests are intercepted.
    ///
    /// Set via OFFLINE_H5_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Worker cache version. Changing it retires every older bucket.
    ///
    /// Set via OFFLINE_H5_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path of the offline document.
    #[serde(default = "default_offline_path")]
    pub offline_path: String,

    /// Precache manifest (absolute paths, in order).
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Exact-path strategy overrides, checked before the pattern rules.
    #[serde(default)]
    pub route_overrides: BTreeMap<String, Strategy>,

    /// Whether the worker runtime is available. When false the fallback
    /// controller serves requests.
    ///
    /// Set via OFFLINE_H5_WORKER_SUPPORTED environment variable.
    #[serde(default = "default_true")]
    pub worker_supported: bool,

    /// Version suffix of the fallback record namespace.
    #[serde(default = "default_fallback_store_version")]
    pub fallback_store_version: String,

    /// Size ceiling of a record namespace in bytes.
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: u64,

    /// Fraction of the ceiling eviction shrinks to.
    #[serde(default = "default_eviction_target_ratio")]
    pub eviction_target_ratio: f64,

    /// Period of the offline redirect poll in milliseconds.
    #[serde(default = "default_offline_poll_ms")]
    pub offline_poll_ms: u64,

    /// Period of the network quality probe in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Location the page starts on.
    #[serde(default = "default_start_path")]
    pub start_path: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFLINE_H5_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OFFLINE_H5_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offline-h5.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_version() -> String {
    "3.5.1".into()
}

fn default_offline_path() -> String {
    "/offline.html".into()
}

fn default_manifest() -> Vec<String> {
    DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_fallback_store_version() -> String {
    "1.0".into()
}

fn default_max_cache_bytes() -> u64 {
    EvictionPolicy::DEFAULT_MAX_BYTES
}

fn default_eviction_target_ratio() -> f64 {
    EvictionPolicy::DEFAULT_TARGET_RATIO
}

fn default_offline_poll_ms() -> u64 {
    10_000
}

fn default_probe_interval_ms() -> u64 {
    60_000
}

fn default_start_path() -> String {
    "/".into()
}

fn default_user_agent() -> String {
    "offline-h5/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_version: default_cache_version(),
            offline_path: default_offline_path(),
            manifest: default_manifest(),
            route_overrides: BTreeMap::new(),
            worker_supported: true,
            fallback_store_version: default_fallback_store_version(),
            max_cache_bytes: default_max_cache_bytes(),
            eviction_target_ratio: default_eviction_target_ratio(),
            offline_poll_ms: default_offline_poll_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            start_path: default_start_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn offline_poll(&self) -> Duration {
        Duration::from_millis(self.offline_poll_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// The origin as a URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid { field: "origin".into(), reason: "must be http or https".into() });
        }
        Ok(url)
    }

    pub fn eviction(&self) -> EvictionPolicy {
        EvictionPolicy::new(self.max_cache_bytes, self.eviction_target_ratio)
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::new(self.manifest.iter().cloned())
    }

    /// Settings for the worker runtime.
    pub fn worker_config(&self) -> Result<WorkerConfig, ConfigError> {
        Ok(WorkerConfig {
            origin: self.origin_url()?,
            cache_version: self.cache_version.clone(),
            offline_path: self.offline_path.clone(),
            manifest: self.manifest(),
            routes: RoutePolicy::worker_default().with_overrides(&self.route_overrides),
        })
    }

    /// Settings for the fallback controller.
    pub fn fallback_config(&self) -> Result<FallbackConfig, ConfigError> {
        Ok(FallbackConfig {
            origin: self.origin_url()?,
            offline_path: self.offline_path.clone(),
            manifest: self.manifest(),
            routes: RoutePolicy::fallback_default().with_overrides(&self.route_overrides),
            eviction: self.eviction(),
        })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFLINE_H5_`
    /// 2. TOML file from `OFFLINE_H5_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("OFFLINE_H5_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFLINE_H5_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
