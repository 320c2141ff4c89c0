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

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
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
    /// - `cache.default_ttl_secs` or `cache.cleanup_interval_secs` is 0
    /// - `cache.max_entries` is set to 0
    /// - `kv.timeout_ms` is less than 100ms or exceeds 5 minutes
    ///
    /// Returns `ConfigError::Missing` if a `kv` section lacks credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.default_ttl_secs == 0 {
            return Err(invalid("cache.default_ttl_secs", "must be greater than 0"));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(invalid("cache.cleanup_interval_secs", "must be greater than 0"));
        }
        if self.cache.max_entries == Some(0) {
            return Err(invalid("cache.max_entries", "must be greater than 0 when set"));
        }
        if self.store_ttl_secs.is_some_and(|ttl| ttl < 60) {
            // Workers KV rejects expiration_ttl below 60 seconds.
            return Err(invalid("store_ttl_secs", "must be at least 60 seconds"));
        }

        if let Some(kv) = &self.kv {
            for (field, value) in
                [("kv.account_id", &kv.account_id), ("kv.namespace_id", &kv.namespace_id), ("kv.api_token", &kv.api_token)]
            {
                if value.trim().is_empty() {
                    return Err(ConfigError::Missing {
                        field: field.into(),
                        hint: format!("Set MARKNAV_{} environment variable", field.to_uppercase().replace('.', "__")),
                    });
                }
            }
            if kv.timeout_ms < 100 {
                return Err(invalid("kv.timeout_ms", "must be at least 100ms"));
            }
            if kv.timeout_ms > 300_000 {
                return Err(invalid("kv.timeout_ms", "must not exceed 5 minutes (300000ms)"));
            }
            if url::Url::parse(&kv.base_url).is_err() {
                return Err(invalid("kv.base_url", "must be an absolute URL"));
            }
        }

        if self.cache.max_entries.is_some_and(|max| max > 100_000) {
            tracing::warn!(
                max_entries = ?self.cache.max_entries,
                "cache.max_entries is very large; eviction scans are linear in the entry count"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, KvConfig};

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_ttl() {
        let config = AppConfig { cache: CacheConfig { default_ttl_secs: 0, ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache.default_ttl_secs"));
    }

    #[test]
    fn test_validate_zero_max_entries() {
        let config =
            AppConfig { cache: CacheConfig { max_entries: Some(0), ..Default::default() }, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache.max_entries"));
    }

    #[test]
    fn test_validate_unbounded_cache_allowed() {
        let config = AppConfig { cache: CacheConfig { max_entries: None, ..Default::default() }, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_store_ttl_too_small() {
        let config = AppConfig { store_ttl_secs: Some(30), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "store_ttl_secs"));
    }

    #[test]
    fn test_validate_kv_missing_token() {
        let config = AppConfig { kv: Some(KvConfig::new("acct", "ns", "")), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, hint }) if field == "kv.api_token" && hint.contains("MARKNAV_KV__API_TOKEN")));
    }

    #[test]
    fn test_validate_kv_timeout_bounds() {
        let mut kv = KvConfig::new("acct", "ns", "token");
        kv.timeout_ms = 50;
        let config = AppConfig { kv: Some(kv.clone()), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "kv.timeout_ms"));

        kv.timeout_ms = 300_000;
        let config = AppConfig { kv: Some(kv), ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
