//! Configuration management
//!
//! YAML configuration for the pools, retries, validation limits and output
//! location. Every field has a default, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validation::{FileKind, ValidationOptions};
use crate::worker::{PoolConfig, RetryPolicy, default_pool_size};

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File is not valid YAML for [`Config`]
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Slots per family
    pub max_workers: usize,
    /// Per-task timeout in milliseconds
    pub default_timeout_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_workers: default_pool_size(),
            default_timeout_ms: 30_000,
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
        }
    }
}

/// Size ceilings per input kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Images, in bytes
    pub image_max_bytes: u64,
    /// Videos, in bytes
    pub video_max_bytes: u64,
    /// PDFs, in bytes
    pub pdf_max_bytes: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            image_max_bytes: FileKind::Image.default_max_size(),
            video_max_bytes: FileKind::Video.default_max_size(),
            pdf_max_bytes: FileKind::Pdf.default_max_size(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,
    /// Worker pools
    pub pool: PoolSection,
    /// Retries
    pub retry: RetrySection,
    /// Validation limits
    pub limits: LimitsSection,
    /// Directory for produced files
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pool: PoolSection::default(),
            retry: RetrySection::default(),
            limits: LimitsSection::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads and validates a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses and validates YAML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges
    ///
    /// # Errors
    ///
    /// Returns the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "pool.max_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pool.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "pool.default_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry.max_delay_ms",
                reason: format!(
                    "{} is below base_delay_ms ({})",
                    self.retry.max_delay_ms, self.retry.base_delay_ms
                ),
            });
        }
        Ok(())
    }

    /// Pool settings for the task manager
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_max_workers(self.pool.max_workers)
            .with_default_timeout(Duration::from_millis(self.pool.default_timeout_ms))
    }

    /// Default retry policy for the task manager
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_retries(self.retry.max_retries)
            .with_delays(
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            )
    }

    /// Validation preset for `kind` with the configured ceiling
    #[must_use]
    pub fn validation_options(&self, kind: FileKind) -> ValidationOptions {
        let options = ValidationOptions::for_kind(kind);
        match kind {
            FileKind::Image => options.with_max_file_size(self.limits.image_max_bytes),
            FileKind::Video => options.with_max_file_size(self.limits.video_max_bytes),
            FileKind::Pdf => options.with_max_file_size(self.limits.pdf_max_bytes),
            FileKind::General => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.pool.default_timeout_ms, 30_000);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.limits.image_max_bytes, 50 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml_str(
            "log_level: debug\npool:\n  max_workers: 2\nretry:\n  max_retries: 3\n",
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.pool.max_workers, 2);
        assert_eq!(config.pool.default_timeout_ms, 30_000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.pool_config().max_workers, 2);
        assert_eq!(config.retry_policy().max_retries, 3);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_yaml_str("pool:\n  max_workers: 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config value for pool.max_workers: must be at least 1"
        );

        let err =
            Config::from_yaml_str("retry:\n  base_delay_ms: 500\n  max_delay_ms: 100\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "retry.max_delay_ms", .. }));

        assert!(matches!(
            Config::from_yaml_str("pool: [1, 2]").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_dir: /tmp/slix\nlimits:\n  pdf_max_bytes: 1024").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/slix"));
        assert_eq!(
            config.validation_options(FileKind::Pdf).max_file_size,
            1024
        );
        assert_eq!(
            config.validation_options(FileKind::Image).max_file_size,
            50 * 1024 * 1024
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
