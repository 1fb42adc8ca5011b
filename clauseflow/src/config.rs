//! Orchestrator configuration.
//!
//! Values come from code (`with_*` builders), from serialized config, or
//! from `CLAUSEFLOW_*` environment variables via [`OrchestratorConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::pipeline::RetryConfig;

/// Enables graceful degradation (`true`/`false`).
pub const ENV_GRACEFUL_DEGRADATION: &str = "CLAUSEFLOW_GRACEFUL_DEGRADATION";
/// Maximum attempts per collaborator call.
pub const ENV_RETRY_ATTEMPTS: &str = "CLAUSEFLOW_RETRY_ATTEMPTS";
/// Idle window of the retention sweep, in hours.
pub const ENV_CLEANUP_HOURS: &str = "CLAUSEFLOW_CLEANUP_HOURS";
/// Keeps runs on explicit cleanup so only the sweep removes them.
pub const ENV_PERSISTENCE: &str = "CLAUSEFLOW_PERSISTENCE";

/// Retention of finished runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Runs idle longer than this are purged by the sweep.
    pub idle_hours: u64,
    /// When set, `cleanup` keeps runs and leaves them to the sweep.
    pub persistence: bool,
    /// When set, new runs are never purged by the sweep.
    pub retain_runs: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            idle_hours: 24,
            persistence: false,
            retain_runs: false,
        }
    }
}

impl RetentionConfig {
    /// Idle window as a duration.
    #[must_use]
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.idle_hours.saturating_mul(3600))
    }
}

/// Configuration of a [`PipelineOrchestrator`](crate::pipeline::PipelineOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Substitute defaults for failed stages instead of aborting.
    pub graceful_degradation: bool,
    /// Retry policy for collaborator calls.
    pub retry: RetryConfig,
    /// Retention policy.
    pub retention: RetentionConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            graceful_degradation: true,
            retry: RetryConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables graceful degradation.
    #[must_use]
    pub fn with_graceful_degradation(mut self, enabled: bool) -> Self {
        self.graceful_degradation = enabled;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the idle window in hours.
    #[must_use]
    pub fn with_idle_hours(mut self, hours: u64) -> Self {
        self.retention.idle_hours = hours;
        self
    }

    /// Sets the persistence flag.
    #[must_use]
    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.retention.persistence = enabled;
        self
    }

    /// Reads overrides from `CLAUSEFLOW_*` environment variables on top of
    /// the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_flag(&lookup, ENV_GRACEFUL_DEGRADATION)? {
            config.graceful_degradation = v;
        }
        if let Some(v) = parse_var::<_, usize>(&lookup, ENV_RETRY_ATTEMPTS)? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = parse_var::<_, u64>(&lookup, ENV_CLEANUP_HOURS)? {
            config.retention.idle_hours = v;
        }
        if let Some(v) = parse_flag(&lookup, ENV_PERSISTENCE)? {
            config.retention.persistence = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validates the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        if self.retention.idle_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retention.idle_hours",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        })
}

fn parse_flag<F>(lookup: &F, name: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        }),
    }
}
