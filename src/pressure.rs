// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memory pressure classification.
//!
//! The monitor stages its response so transient spikes do not trigger
//! disruptive reclamation, but sustained pressure does before an
//! out-of-memory condition is reached.
//!
//! # Example
//!
//! ```
//! use retention_engine::PressureLevel;
//!
//! let thresholds = retention_engine::PressureThresholds::default();
//!
//! let level = PressureLevel::from_ratio(0.5, &thresholds);
//! assert_eq!(level, PressureLevel::Normal);
//!
//! // Warning logs but does not reclaim
//! let level = PressureLevel::from_ratio(0.75, &thresholds);
//! assert_eq!(level, PressureLevel::Warning);
//! assert!(!level.should_force_reclaim());
//!
//! // Critical and above request forced reclamation
//! let level = PressureLevel::from_ratio(0.9, &thresholds);
//! assert_eq!(level, PressureLevel::Critical);
//! assert!(level.should_force_reclaim());
//! ```

use serde::Deserialize;

/// Heap-usage ratios at which each level engages.
#[derive(Debug, Clone, Deserialize)]
pub struct PressureThresholds {
    #[serde(default = "default_warning_ratio")]
    pub warning: f64,
    #[serde(default = "default_critical_ratio")]
    pub critical: f64,
    #[serde(default = "default_emergency_ratio")]
    pub emergency: f64,
}

fn default_warning_ratio() -> f64 {
    0.70
}
fn default_critical_ratio() -> f64 {
    0.85
}
fn default_emergency_ratio() -> f64 {
    0.95
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            warning: default_warning_ratio(),
            critical: default_critical_ratio(),
            emergency: default_emergency_ratio(),
        }
    }
}

/// Staged pressure cascade:
/// - **Normal** (< warning): nothing to do
/// - **Warning** (default 70%): alert only
/// - **Critical** (default 85%): alert + forced reclamation
/// - **Emergency** (default 95%): alarm + forced reclamation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    Emergency = 3,
}

impl PressureLevel {
    /// Classify a heap-usage ratio (0.0 → 1.0+).
    #[must_use]
    pub fn from_ratio(ratio: f64, thresholds: &PressureThresholds) -> Self {
        if ratio >= thresholds.emergency {
            Self::Emergency
        } else if ratio >= thresholds.critical {
            Self::Critical
        } else if ratio >= thresholds.warning {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Whether this level requests forced reclamation. Warning does not.
    #[must_use]
    pub fn should_force_reclaim(&self) -> bool {
        matches!(self, Self::Critical | Self::Emergency)
    }

    /// Whether crossing into this level is worth announcing to listeners.
    #[must_use]
    pub fn is_alert(&self) -> bool {
        !matches!(self, Self::Normal)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "Normal operation",
            Self::Warning => "Warning - heap usage high",
            Self::Critical => "Critical - forcing reclamation",
            Self::Emergency => "Emergency - reclamation and alarm",
        }
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
