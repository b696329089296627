use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Harvest settings, usually read from a TOML file.
///
/// ```toml
/// batch_size = 100
///
/// [retry]
/// max_retries = 3
/// initial_backoff_ms = 1000
/// rate_limit_wait_ms = 900000
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// Rows per tweet lookup request.
    pub batch_size: usize,
    /// Upper bound the upstream puts on `batch_size`.
    pub max_batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_batch_size: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl HarvestConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: HarvestConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.batch_size > self.max_batch_size {
            return Err(invalid(format!(
                "batch_size {} exceeds max_batch_size {}",
                self.batch_size, self.max_batch_size
            )));
        }
        if self.retry.multiplier == 0 {
            return Err(invalid("retry.multiplier must be at least 1"));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(invalid("retry.initial_backoff_ms exceeds retry.max_backoff_ms"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}
