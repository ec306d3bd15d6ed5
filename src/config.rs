//! Query configuration.
//!
//! Loaded from TOML, optionally overridden from the environment. Every field
//! has a default, so an empty document is a valid configuration.

use basemodel_core::BaseModelError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Resolution mode
// ============================================================================

/// What happens when a relation or lookup target cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Skip the target, log it and report a [`Diagnostic`](crate::Diagnostic)
    #[default]
    Lenient,
    /// Fail the request
    Strict,
}

// ============================================================================
// QueryConfig
// ============================================================================

/// Per-table limits and budgets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    pub limit_default: usize,
    pub limit_max: usize,
    pub limit_min: usize,
    pub has_many_max: usize,
    pub bulk_length_max: usize,
    /// Rows per INSERT statement in bulk inserts
    pub chunk_size: usize,
    pub step_min: u64,
    pub steps_max: usize,
    pub timeout_ms: u64,
    /// Wall-clock budget of one CSV export call
    pub export_timeout_ms: u64,
    pub export_page_size: usize,
    pub resolution: ResolutionMode,
    /// Row estimate above which an estimated count is trusted
    pub count_estimate_threshold: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            limit_default: 25,
            limit_max: 100,
            limit_min: 1,
            has_many_max: 5,
            bulk_length_max: 1000,
            chunk_size: 50,
            step_min: 1,
            steps_max: 100,
            timeout_ms: 25_000,
            export_timeout_ms: 5_000,
            export_page_size: 100,
            resolution: ResolutionMode::Lenient,
            count_estimate_threshold: 1000,
        }
    }
}

impl QueryConfig {
    /// Parses and validates a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.into())
            } else {
                ConfigError::Io(path.into(), e)
            }
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(path.into(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `DB_QUERY_LIMIT_DEFAULT`, `DB_QUERY_LIMIT_MAX`,
    /// `DB_QUERY_LIMIT_MIN` and `NC_EXPORT_MAX_TIMEOUT`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn read<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            var: &'static str,
        ) -> Result<Option<T>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(value) if value.trim().is_empty() => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::Env { var, value }),
            }
        }

        if let Some(v) = read(&lookup, "DB_QUERY_LIMIT_DEFAULT")? {
            self.limit_default = v;
        }
        if let Some(v) = read(&lookup, "DB_QUERY_LIMIT_MAX")? {
            self.limit_max = v;
        }
        if let Some(v) = read(&lookup, "DB_QUERY_LIMIT_MIN")? {
            self.limit_min = v;
        }
        if let Some(v) = read(&lookup, "NC_EXPORT_MAX_TIMEOUT")? {
            self.export_timeout_ms = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit_min > self.limit_max {
            return Err(ConfigError::Invalid(format!(
                "limit_min ({}) is greater than limit_max ({})",
                self.limit_min, self.limit_max
            )));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.export_page_size == 0 {
            return Err(ConfigError::Invalid(
                "export_page_size must be positive".into(),
            ));
        }
        if self.steps_max == 0 {
            return Err(ConfigError::Invalid("steps_max must be positive".into()));
        }
        Ok(())
    }

    /// `max(min(requested, limit_max), limit_min)`, `limit_default` when absent.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.limit_default)
            .min(self.limit_max)
            .max(self.limit_min)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[source] toml::de::Error),

    #[error("invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for BaseModelError {
    fn from(value: ConfigError) -> Self {
        BaseModelError::Config(value.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
