//! Pipeline configuration.
//!
//! Loaded from `STRATA_`-prefixed environment variables with `envy`:
//!
//! - `STRATA_VALIDATION_STATUS`: status for validation failures, `400` or `422` (default 400)
//! - `STRATA_SLOW_REQUEST_MS`: request-log warns above this latency (default 1000)
//! - `STRATA_HEALTH_TIMEOUT_MS`: per-check readiness timeout (default 2000)

use std::time::Duration;

use http::StatusCode;
use serde::Deserialize;

const PREFIX: &str = "STRATA_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid environment: {0}")]
    Env(#[from] envy::Error),

    #[error("validation status must be 400 or 422, got {0}")]
    ValidationStatus(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default = "default_validation_status")]
    pub validation_status: u16,

    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,

    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

fn default_validation_status() -> u16 {
    400
}

fn default_slow_request_ms() -> u64 {
    1000
}

fn default_health_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validation_status: default_validation_status(),
            slow_request_ms: default_slow_request_ms(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl Config {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Fails when a variable does not parse, or the validation status is
    /// neither 400 nor 422.
    pub fn from_env() -> Result<Self, ConfigError> {
        envy::prefixed(PREFIX).from_env::<Config>()?.checked()
    }

    /// Like [`from_env`](Self::from_env) but reads the given pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(PREFIX).from_iter::<_, Config>(vars)?.checked()
    }

    fn checked(self) -> Result<Self, ConfigError> {
        match self.validation_status {
            400 | 422 => Ok(self),
            other => Err(ConfigError::ValidationStatus(other)),
        }
    }

    pub fn validation_status(&self) -> StatusCode {
        StatusCode::from_u16(self.validation_status).unwrap_or(StatusCode::BAD_REQUEST)
    }

    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}
