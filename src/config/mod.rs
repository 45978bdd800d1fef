//! Runtime settings, loaded from an optional TOML file and the environment.
//!
//! ```toml
//! bind_addr = "0.0.0.0:8080"
//!
//! [cache]
//! enabled = true
//! default_ttl_secs = 300
//! cleanup_interval_secs = 300
//! opt_in_param = "cache"
//!
//! [cache.routes]
//! "/orders" = 30
//! ```
//!
//! Every key can be overridden from the environment with the `STOREFRONT_`
//! prefix and `__` between nested keys, e.g. `STOREFRONT_CACHE__ENABLED=false`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_TTL};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "STOREFRONT";

const MAX_CLEANUP_INTERVAL_SECS: u64 = 60 * 60 * 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub cache: CacheSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            cache: CacheSettings::default(),
        }
    }
}

/// The `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// When false the response cache passes every request through.
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Query parameter that lets signed-in users read and fill the cache.
    pub opt_in_param: String,
    /// Per-route TTLs in seconds, keyed by path prefix.
    pub routes: HashMap<String, u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: DEFAULT_TTL.as_secs(),
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            opt_in_param: "cache".into(),
            routes: HashMap::new(),
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Settings {
    /// Loads `path` (if it exists) and then applies `STOREFRONT_*` overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(Self::environment())
            .build()?;
        Self::finish(built)
    }

    /// Parses settings from TOML text without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Self::finish(built)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(built: config::Config) -> Result<Self, ConfigError> {
        let settings: Self = built.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "bind_addr",
                reason: "must not be empty",
            });
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.cleanup_interval_secs",
                reason: "must be at least 1 second",
            });
        }
        if self.cache.cleanup_interval_secs > MAX_CLEANUP_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                key: "cache.cleanup_interval_secs",
                reason: "must be at most one year",
            });
        }
        if self.cache.opt_in_param.is_empty() {
            return Err(ConfigError::Invalid {
                key: "cache.opt_in_param",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}
