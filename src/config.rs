use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default weight tolerance: debt% + equity% must land within 100 ± 0.01.
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("environment override {key}={value:?} is not valid")]
    InvalidEnv { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration handed to `Services`, `WaccEngine` and every
/// `RecoveryOrchestrator` at construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaccConfig {
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
    pub recovery: RecoveryConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of completed entries before LRU eviction kicks in.
    pub capacity: usize,
    /// Time-to-live from creation. Zero disables expiry.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Ring buffer size. Oldest events are dropped past this.
    pub capacity: usize,
    /// Events older than this are trimmed on record. Zero keeps events forever.
    pub retention_secs: u64,
    /// Whether the recorder starts in the monitoring state.
    pub start_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retention_secs: 3_600,
            start_enabled: true,
        }
    }
}

impl TelemetryConfig {
    pub fn retention(&self) -> Option<Duration> {
        (self.retention_secs > 0).then(|| Duration::from_secs(self.retention_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub auto_recover: bool,
    /// Operation attempts per boundary, the original attempt included.
    pub max_retry_attempts: u32,
    pub settle_delay_ms: u64,
    pub telemetry_restart_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_recover: true,
            max_retry_attempts: 3,
            settle_delay_ms: 100,
            telemetry_restart_delay_ms: 1_000,
        }
    }
}

impl RecoveryConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn telemetry_restart_delay(&self) -> Duration {
        Duration::from_millis(self.telemetry_restart_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub weight_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
        }
    }
}

impl WaccConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies `WACC_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("WACC_"))
            .collect();
        self.with_overrides(&vars)
    }

    /// Applies `WACC_*` overrides from an explicit map.
    pub fn with_overrides(mut self, vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        for (key, value) in vars {
            match key.as_str() {
                "WACC_CACHE_CAPACITY" => self.cache.capacity = parse_env(key, value)?,
                "WACC_CACHE_TTL_SECS" => self.cache.ttl_secs = parse_env(key, value)?,
                "WACC_TELEMETRY_CAPACITY" => self.telemetry.capacity = parse_env(key, value)?,
                "WACC_TELEMETRY_RETENTION_SECS" => {
                    self.telemetry.retention_secs = parse_env(key, value)?
                }
                "WACC_TELEMETRY_ENABLED" => self.telemetry.start_enabled = parse_env(key, value)?,
                "WACC_AUTO_RECOVER" => self.recovery.auto_recover = parse_env(key, value)?,
                "WACC_MAX_RETRY_ATTEMPTS" => {
                    self.recovery.max_retry_attempts = parse_env(key, value)?
                }
                "WACC_SETTLE_DELAY_MS" => self.recovery.settle_delay_ms = parse_env(key, value)?,
                "WACC_TELEMETRY_RESTART_DELAY_MS" => {
                    self.recovery.telemetry_restart_delay_ms = parse_env(key, value)?
                }
                "WACC_WEIGHT_TOLERANCE" => {
                    self.validation.weight_tolerance = parse_env(key, value)?
                }
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be at least 1".into()));
        }
        if self.telemetry.capacity == 0 {
            return Err(ConfigError::Invalid("telemetry.capacity must be at least 1".into()));
        }
        if self.recovery.max_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "recovery.max_retry_attempts must be at least 1".into(),
            ));
        }
        let tolerance = self.validation.weight_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "validation.weight_tolerance must be a finite, non-negative number".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
