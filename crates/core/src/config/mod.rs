//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MARKNAV_*, nested sections split on `__`)
//! 2. TOML config file (if MARKNAV_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MARKNAV_*)
/// 2. TOML config file (if MARKNAV_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache strategy and sizing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Remote key-value store credentials.
    ///
    /// When absent the store is unavailable and the bundled dataset is served.
    #[serde(default)]
    pub kv: Option<KvConfig>,

    /// JSON file overriding the embedded bundled dataset.
    ///
    /// Set via MARKNAV_BUNDLED_PATH environment variable.
    #[serde(default)]
    pub bundled_path: Option<PathBuf>,

    /// `expirationTtl` applied to every remote store write, in seconds.
    ///
    /// Set via MARKNAV_STORE_TTL_SECS environment variable.
    #[serde(default)]
    pub store_ttl_secs: Option<u64>,
}

/// Cache strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// In-process map only.
    Memory,
    /// SQLite file that survives restarts.
    Local,
    /// In-memory SQLite database scoped to this process.
    Session,
    /// In-process tier fronting the local durable tier.
    Hybrid,
}

impl std::fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Local => "local",
            Self::Session => "session",
            Self::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Set via MARKNAV_CACHE__STRATEGY environment variable.
    #[serde(default = "default_strategy")]
    pub strategy: CacheStrategy,

    /// Default entry lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// LRU bound for the in-process tier.
    #[serde(default = "default_max_entries")]
    pub max_entries: Option<usize>,

    /// Interval of the background expiry sweep in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// SQLite file for the local durable tier.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_strategy() -> CacheStrategy {
    CacheStrategy::Hybrid
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_entries() -> Option<usize> {
    Some(500)
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./marknav-cache.sqlite")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            default_ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            db_path: default_db_path(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Remote key-value store (Workers KV REST API) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvConfig {
    /// Set via MARKNAV_KV__ACCOUNT_ID environment variable.
    #[serde(default)]
    pub account_id: String,

    /// Set via MARKNAV_KV__NAMESPACE_ID environment variable.
    #[serde(default)]
    pub namespace_id: String,

    /// Set via MARKNAV_KV__API_TOKEN environment variable.
    #[serde(default)]
    pub api_token: String,

    #[serde(default = "default_kv_base_url")]
    pub base_url: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_kv_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional prefix applied to every logical key.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

fn default_kv_base_url() -> String {
    "https://api.cloudflare.com/client/v4".into()
}

fn default_kv_timeout_ms() -> u64 {
    10_000
}

impl KvConfig {
    pub fn new(
        account_id: impl Into<String>, namespace_id: impl Into<String>, api_token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            namespace_id: namespace_id.into(),
            api_token: api_token.into(),
            base_url: default_kv_base_url(),
            timeout_ms: default_kv_timeout_ms(),
            key_prefix: None,
        }
    }

    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MARKNAV_`
    /// 2. TOML file from `MARKNAV_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("MARKNAV_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MARKNAV_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate configuration from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Return the store settings, or explain how to provide them.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no `kv` section is configured.
    pub fn require_kv(&self) -> Result<&KvConfig, ConfigError> {
        self.kv.as_ref().ok_or_else(|| ConfigError::Missing {
            field: "kv".into(),
            hint: "Set MARKNAV_KV__ACCOUNT_ID, MARKNAV_KV__NAMESPACE_ID and MARKNAV_KV__API_TOKEN".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache.strategy, CacheStrategy::Hybrid);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.max_entries, Some(500));
        assert_eq!(config.cache.cleanup_interval(), Duration::from_secs(60));
        assert_eq!(config.cache.db_path, PathBuf::from("./marknav-cache.sqlite"));
        assert!(config.kv.is_none());
        assert!(config.bundled_path.is_none());
        assert!(config.store_ttl_secs.is_none());
    }

    #[test]
    fn test_from_figment_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(
            r#"
            [cache]
            strategy = "memory"
            default_ttl_secs = 30

            [kv]
            account_id = "acct"
            namespace_id = "ns"
            api_token = "token"
            "#,
        ));

        let config = AppConfig::from_figment(figment).unwrap();
        assert_eq!(config.cache.strategy, CacheStrategy::Memory);
        assert_eq!(config.cache.default_ttl_secs, 30);
        let kv = config.require_kv().unwrap();
        assert_eq!(kv.namespace_id, "ns");
        assert_eq!(kv.base_url, "https://api.cloudflare.com/client/v4");
        assert_eq!(kv.timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_from_figment_rejects_unknown_strategy() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string("[cache]\nstrategy = \"redis\"\n"));
        assert!(matches!(AppConfig::from_figment(figment), Err(ConfigError::LoadFailed(_))));
    }

    #[test]
    fn test_require_kv_missing() {
        let config = AppConfig::default();
        assert!(matches!(config.require_kv(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(CacheStrategy::Session.to_string(), "session");
    }
}
