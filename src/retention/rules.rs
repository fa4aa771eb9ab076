//! Retention rule and policy configuration.
//!
//! The tier table and rule list are configuration data, not code: operators
//! retune thresholds without redeploying logic. Rules are an explicitly
//! ordered list — the first matching rule wins, full stop. Nothing about
//! predicate kind affects precedence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{Priority, RawResultEvent};

/// Milliseconds per retention day.
pub const MS_PER_DAY: i64 = 86_400_000;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Retention config has no tiers")]
    NoTiers,
    #[error("Tier '{0}' maps to zero days")]
    ZeroDayTier(String),
    #[error("Default tier '{0}' is not in the tier table")]
    UnknownDefaultTier(String),
    #[error("Rule {index} references unknown tier '{tier}'")]
    RuleUnknownTier { index: usize, tier: String },
    #[error("Rule {index} has an empty winner pattern")]
    EmptyPattern { index: usize },
    #[error("Rule {index} has a non-finite multiplier threshold")]
    NonFiniteThreshold { index: usize },
}

/// Condition a rule checks against an incoming event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RulePredicate {
    /// Event multiplier is at least the threshold
    MultiplierAtLeast { threshold: f64 },
    /// Winner field contains the pattern (case-insensitive substring)
    WinnerContains { pattern: String },
}

impl RulePredicate {
    #[must_use]
    pub fn matches(&self, event: &RawResultEvent) -> bool {
        match self {
            Self::MultiplierAtLeast { threshold } => {
                event.multiplier.is_some_and(|m| m >= *threshold)
            }
            Self::WinnerContains { pattern } => event
                .winner
                .as_deref()
                .is_some_and(|w| w.to_lowercase().contains(&pattern.to_lowercase())),
        }
    }
}

/// One classification rule: predicate → target tier and priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionRule {
    pub predicate: RulePredicate,
    pub tier: String,
    pub priority: Priority,
}

/// Retention policy: tier table, ordered rule list, and the engine's
/// tunable windows.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionPolicyConfig {
    /// Tier name → retention days
    pub tiers: BTreeMap<String, u32>,
    /// Tier used when no rule matches
    pub default_tier: String,
    /// Checked in order; first match wins
    #[serde(default)]
    pub rules: Vec<RetentionRule>,
    /// Dedup window half-width: two identical events within ±window are one
    /// logical occurrence
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: i64,
    /// Max records removed per cleanup batch
    #[serde(default = "default_cleanup_batch_size")]
    pub cleanup_batch_size: usize,
}

fn default_dedup_window_ms() -> i64 {
    5_000
}
fn default_cleanup_batch_size() -> usize {
    1_000
}

impl Default for RetentionPolicyConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert("7d".to_string(), 7);
        tiers.insert("30d".to_string(), 30);
        tiers.insert("90d".to_string(), 90);
        tiers.insert("365d".to_string(), 365);

        Self {
            tiers,
            default_tier: "30d".to_string(),
            rules: vec![
                RetentionRule {
                    predicate: RulePredicate::MultiplierAtLeast { threshold: 100.0 },
                    tier: "90d".to_string(),
                    priority: Priority::High,
                },
                RetentionRule {
                    predicate: RulePredicate::WinnerContains {
                        pattern: "jackpot".to_string(),
                    },
                    tier: "365d".to_string(),
                    priority: Priority::Permanent,
                },
            ],
            dedup_window_ms: default_dedup_window_ms(),
            cleanup_batch_size: default_cleanup_batch_size(),
        }
    }
}

impl RetentionPolicyConfig {
    /// Fail fast on malformed configuration — a rule referencing an unknown
    /// tier is a load-time error, never a classification-time surprise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        for (name, days) in &self.tiers {
            if *days == 0 {
                return Err(ConfigError::ZeroDayTier(name.clone()));
            }
        }
        if !self.tiers.contains_key(&self.default_tier) {
            return Err(ConfigError::UnknownDefaultTier(self.default_tier.clone()));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if !self.tiers.contains_key(&rule.tier) {
                return Err(ConfigError::RuleUnknownTier {
                    index,
                    tier: rule.tier.clone(),
                });
            }
            match &rule.predicate {
                RulePredicate::WinnerContains { pattern } if pattern.is_empty() => {
                    return Err(ConfigError::EmptyPattern { index });
                }
                RulePredicate::MultiplierAtLeast { threshold } if !threshold.is_finite() => {
                    return Err(ConfigError::NonFiniteThreshold { index });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Retention days for a tier, if configured.
    #[must_use]
    pub fn tier_days(&self, tier: &str) -> Option<u32> {
        self.tiers.get(tier).copied()
    }
}
