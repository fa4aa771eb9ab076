// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retention policy engine.
//!
//! Classifies incoming results into a retention tier and priority by
//! walking the configured rule list in order, computes absolute expiry
//! horizons, and applies operator-initiated retention extensions through
//! the durable store.

pub mod rules;

pub use rules::{ConfigError, RetentionPolicyConfig, RetentionRule, RulePredicate, MS_PER_DAY};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::record::{now_millis, GameResultRecord, Priority, RawResultEvent, RetentionAuditNote};
use crate::store::traits::{ResultStore, StoreError};

#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("Unknown retention tier '{0}'")]
    UnknownTier(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of classifying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tier: String,
    pub priority: Priority,
    /// Absolute deletion horizon, epoch millis
    pub expires_at: i64,
}

/// Rule-driven classifier with a hot-reloadable policy.
///
/// The policy is validated before it is ever installed, so classification
/// never encounters an unknown tier.
pub struct RetentionPolicyEngine {
    policy: RwLock<RetentionPolicyConfig>,
}

impl RetentionPolicyEngine {
    pub fn new(config: RetentionPolicyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy: RwLock::new(config),
        })
    }

    /// Swap in a fresh policy without restarting. Rejected configs leave the
    /// current policy untouched.
    pub fn reload(&self, config: RetentionPolicyConfig) -> Result<(), ConfigError> {
        config.validate()?;
        info!(
            tiers = config.tiers.len(),
            rules = config.rules.len(),
            "retention policy reloaded"
        );
        *self.policy.write() = config;
        Ok(())
    }

    /// Classify an event: first matching rule in list order wins; no match
    /// falls back to the default tier with normal priority.
    pub fn classify(&self, event: &RawResultEvent) -> Classification {
        let policy = self.policy.read();
        let now = now_millis();

        for rule in &policy.rules {
            if rule.predicate.matches(event) {
                // Validation guarantees the tier exists.
                let days = policy.tier_days(&rule.tier).unwrap_or(1);
                debug!(
                    game_id = %event.game_id,
                    tier = %rule.tier,
                    priority = ?rule.priority,
                    "result classified by rule"
                );
                crate::metrics::record_classification(&rule.tier);
                return Classification {
                    tier: rule.tier.clone(),
                    priority: rule.priority,
                    expires_at: now + i64::from(days) * MS_PER_DAY,
                };
            }
        }

        let days = policy.tier_days(&policy.default_tier).unwrap_or(1);
        crate::metrics::record_classification(&policy.default_tier);
        Classification {
            tier: policy.default_tier.clone(),
            priority: Priority::Normal,
            expires_at: now + i64::from(days) * MS_PER_DAY,
        }
    }

    /// Extend a stored record's retention. Recomputes `expires_at` from now
    /// (not from the original `extracted_at`), overwrites tier and priority,
    /// and appends an audit note. Explicit operator action, never automatic.
    pub async fn extend(
        &self,
        store: &dyn ResultStore,
        record_id: Uuid,
        new_tier: &str,
        new_priority: Priority,
        reason: &str,
    ) -> Result<GameResultRecord, RetentionError> {
        let days = {
            let policy = self.policy.read();
            policy
                .tier_days(new_tier)
                .ok_or_else(|| RetentionError::UnknownTier(new_tier.to_string()))?
        };

        let now = now_millis();
        let expires_at = now + i64::from(days) * MS_PER_DAY;
        let note = RetentionAuditNote {
            reason: reason.to_string(),
            extended_at: now,
        };

        let updated = store
            .update_retention(record_id, new_tier.to_string(), new_priority, expires_at, note)
            .await?;

        info!(
            record_id = %record_id,
            tier = %new_tier,
            priority = ?new_priority,
            expires_at,
            "record retention extended"
        );
        Ok(updated)
    }

    /// Simple horizon check against the current clock; shared by lazy reads
    /// and the cleanup sweep.
    #[must_use]
    pub fn is_expired(&self, expires_at_ms: i64) -> bool {
        expires_at_ms <= now_millis()
    }

    #[must_use]
    pub fn dedup_window_ms(&self) -> i64 {
        self.policy.read().dedup_window_ms
    }

    #[must_use]
    pub fn cleanup_batch_size(&self) -> usize {
        self.policy.read().cleanup_batch_size
    }
}
