//! Query engine configuration.
//!
//! Values are layered with `figment`: built-in defaults, then an optional
//! YAML file, then `MODKIT_QUERY_*` environment variables.
//!
//! ```yaml
//! default_page_size: 25
//! max_page_size: 500
//! max_filter_length: 4096
//! ```

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "MODKIT_QUERY_";

/// Keys read from the environment. Other `MODKIT_QUERY_*` variables are
/// ignored rather than rejected as unknown fields.
const ENV_KEYS: &[&str] = &["default_page_size", "max_page_size", "max_filter_length"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Page size used when a caller passes a non-positive size, and by `clear()`.
    pub default_page_size: u64,
    /// Upper bound for page sizes; unbounded when absent.
    pub max_page_size: Option<u64>,
    /// Longest filter text accepted from the wire.
    pub max_filter_length: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: None,
            max_filter_length: 2000,
        }
    }
}

impl QueryConfig {
    /// Extract from an existing figment.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when extraction fails or the values are
    /// inconsistent.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: QueryConfig = figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, the YAML file at `path` (if it exists) and the
    /// `MODKIT_QUERY_*` environment variables naming a config key.
    ///
    /// # Errors
    /// See [`QueryConfig::from_figment`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(QueryConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).only(ENV_KEYS));
        let config = Self::from_figment(&figment)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "query configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(Error::Config("default_page_size must be positive".to_owned()));
        }
        if let Some(max) = self.max_page_size
            && max < self.default_page_size
        {
            return Err(Error::Config(format!(
                "max_page_size ({max}) is below default_page_size ({})",
                self.default_page_size
            )));
        }
        Ok(())
    }

    /// Clamp a requested page size to `[1, max_page_size]`, falling back to
    /// the default for non-positive requests.
    #[must_use]
    pub fn effective_page_size(&self, requested: i64) -> u64 {
        let size = u64::try_from(requested)
            .ok()
            .filter(|s| *s > 0)
            .unwrap_or(self.default_page_size);
        self.max_page_size.map_or(size, |max| size.min(max))
    }
}
