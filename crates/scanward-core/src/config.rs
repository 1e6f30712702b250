//! Session configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What to do with a start request that arrives while a session is stopping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// Keep the newest request, replacing any older pending one.
    #[default]
    Replace,
    /// Refuse new requests while stopping.
    Reject,
}

/// Rules deciding which files are skipped without invoking an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// Glob patterns (matched against the full path) that are never scanned.
    pub exclude_patterns: Vec<String>,
    /// Files larger than this are skipped.
    pub max_file_size: Option<u64>,
    /// Extensions considered high-risk; quick scans only look at these and
    /// at files without an extension.
    pub quick_extensions: Vec<String>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        let quick_extensions = [
            "exe", "dll", "sys", "scr", "com", "msi", "bat", "cmd", "ps1", "vbs", "js", "jar",
            "sh", "so", "elf", "bin", "py", "pl", "docm", "xlsm", "pptm", "pdf", "zip", "rar",
            "7z",
        ];
        Self {
            exclude_patterns: Vec::new(),
            max_file_size: None,
            quick_extensions: quick_extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Configuration of the scan engine, immutable for the duration of a session.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum number of concurrent engine invocations.
    #[builder(default = "4")]
    pub max_workers: usize,

    /// Per-file engine ceiling.
    #[builder(default = "Duration::from_secs(60)")]
    #[serde(with = "millis")]
    pub file_timeout: Duration,

    /// Interval of the completion poll while stopping.
    #[builder(default = "Duration::from_secs(1)")]
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Pause between teardown and starting a pending request.
    #[builder(default = "Duration::from_millis(500)")]
    #[serde(with = "millis")]
    pub settle_delay: Duration,

    /// First backoff delay once the engine is considered unavailable.
    #[builder(default = "Duration::from_millis(250)")]
    #[serde(with = "millis")]
    pub backoff_base: Duration,

    /// Upper bound for the backoff delay.
    #[builder(default = "Duration::from_secs(10)")]
    #[serde(with = "millis")]
    pub backoff_max: Duration,

    /// Consecutive unavailability results before backoff kicks in.
    #[builder(default = "3")]
    pub unavailable_threshold: u32,

    /// Risk-based skip rules.
    #[builder(default)]
    pub risk: RiskPolicy,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    pub include_hidden: bool,

    /// Follow symbolic links during enumeration.
    #[builder(default = "false")]
    pub follow_symlinks: bool,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    pub max_depth: Option<u32>,

    /// Policy for start requests arriving while stopping.
    #[builder(default)]
    pub pending_policy: PendingPolicy,
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_workers == Some(0) {
            return Err("max_workers must be at least 1".to_string());
        }
        if self.poll_interval == Some(Duration::ZERO) {
            return Err("poll_interval must be non-zero".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scanward").join("config.toml"))
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config at the default location, falling back to defaults
    /// when no file exists there.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate a config that did not go through the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                message: "max_workers must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                message: "poll_interval must be non-zero".to_string(),
            });
        }
        if self.backoff_base > self.backoff_max {
            return Err(ConfigError::Invalid {
                message: "backoff_base must not exceed backoff_max".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            file_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_millis(500),
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(10),
            unavailable_threshold: 3,
            risk: RiskPolicy::default(),
            include_hidden: true,
            follow_symlinks: false,
            max_depth: None,
            pending_policy: PendingPolicy::Replace,
        }
    }
}

/// Durations are written as integer milliseconds in config files.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .max_workers(8usize)
            .poll_interval(Duration::from_millis(20))
            .pending_policy(PendingPolicy::Reject)
            .build()
            .unwrap();

        assert_eq!(config.max_workers, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert_eq!(config.pending_policy, PendingPolicy::Reject);
    }

    #[test]
    fn test_builder_rejects_zero_workers() {
        let err = ScanConfig::builder().max_workers(0usize).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_toml_durations_are_millis() {
        let config: ScanConfig = toml::from_str(
            r#"
            max_workers = 2
            poll_interval = 250
            settle_delay = 100

            [risk]
            exclude_patterns = ["**/*.iso"]
            "#,
        )
        .unwrap();

        assert_eq!(config.max_workers, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.file_timeout, Duration::from_secs(60));
        assert_eq!(config.risk.exclude_patterns, vec!["**/*.iso".to_string()]);
        assert!(!config.risk.quick_extensions.is_empty());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let config = ScanConfig {
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(1),
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
