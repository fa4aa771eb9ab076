//! Configuration for the retention engine.
//!
//! # Example
//!
//! ```
//! use retention_engine::EngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = EngineConfig::default();
//! assert_eq!(config.cache.max_bytes, 64 * 1024 * 1024); // 64 MB
//! assert_eq!(config.monitor.sample_interval_secs, 30);
//!
//! // Validation fails fast on malformed retention policy
//! config.validate().expect("default config is valid");
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::pressure::PressureThresholds;
use crate::retention::rules::{ConfigError, RetentionPolicyConfig};

/// Bounded cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Max entry count before LRU displacement (default: 10,000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Memory ceiling for tracked entry bytes (default: 64 MB)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// TTL applied when `set` omits one (default: 1 hour)
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Eager expiry sweep cadence (default: 5 minutes)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_entries() -> usize {
    10_000
}
fn default_max_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_ttl_secs() -> u64 {
    3_600
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Memory monitor settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Sampling cadence (default: 30s)
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,

    /// Heap budget the pressure ratios are measured against (default: 512 MB)
    #[serde(default = "default_max_heap_bytes")]
    pub max_heap_bytes: u64,

    /// Warning/Critical/Emergency ratios (defaults: 0.70/0.85/0.95)
    #[serde(default)]
    pub thresholds: PressureThresholds,

    /// Ring buffer capacity for trend computation (default: 120 samples)
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_sample_interval_secs() -> u64 {
    30
}
fn default_max_heap_bytes() -> u64 {
    512 * 1024 * 1024
}
fn default_max_samples() -> usize {
    120
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            max_heap_bytes: default_max_heap_bytes(),
            thresholds: PressureThresholds::default(),
            max_samples: default_max_samples(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

/// Ingest pipeline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on any single durable-store call (default: 5s)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Upper bound on a notification delivery attempt (default: 2s)
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,

    /// Scheduled cleanup cadence (default: 10 minutes)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_store_timeout_ms() -> u64 {
    5_000
}
fn default_notify_timeout_ms() -> u64 {
    2_000
}
fn default_cleanup_interval_secs() -> u64 {
    600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            notify_timeout_ms: default_notify_timeout_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Top-level configuration, loaded once at startup.
///
/// The retention policy section may also be hot-reloaded later via
/// [`RetentionPolicyEngine::reload`](crate::retention::RetentionPolicyEngine::reload).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub retention: RetentionPolicyConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Fail fast at load time: a malformed retention policy never reaches
    /// classification.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retention.validate()
    }
}
