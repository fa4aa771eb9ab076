// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Result ingest pipeline.
//!
//! Consumes raw result events: deduplicates against a short window of
//! recently stored equivalents, classifies novel events through the
//! retention engine, persists them, and hands the stored record to the
//! notification collaborator.
//!
//! Collaborators are injected at construction. Store calls and the
//! notification delivery are the only suspension points; each is bounded
//! by a timeout so a slow backend cannot stall ingest indefinitely.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::record::{now_millis, GameResultRecord, RawResultEvent};
use crate::retention::{RetentionPolicyEngine, MS_PER_DAY};
use crate::store::traits::{ResultNotifier, ResultStore, StoreError};
use crate::tasks::BackgroundHandle;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A durable-store call exceeded its deadline. Losing a live result is
    /// business-visible, so this surfaces to the caller for retry.
    #[error("Durable store timed out during {operation}")]
    StoreTimeout { operation: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What `ingest` did with the event.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Novel event: persisted and handed to the notifier
    Stored(GameResultRecord),
    /// A stored record for the same logical event already existed inside
    /// the dedup window; nothing was written and nothing was notified
    Duplicate(GameResultRecord),
}

impl IngestOutcome {
    #[must_use]
    pub fn record(&self) -> &GameResultRecord {
        match self {
            Self::Stored(r) | Self::Duplicate(r) => r,
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Dedup → classify → persist → notify, plus the scheduled cleanup sweep
/// and operational purge.
pub struct ResultIngestPipeline {
    store: Arc<dyn ResultStore>,
    notifier: Arc<dyn ResultNotifier>,
    retention: Arc<RetentionPolicyEngine>,
    config: PipelineConfig,
}

impl ResultIngestPipeline {
    pub fn new(
        store: Arc<dyn ResultStore>,
        notifier: Arc<dyn ResultNotifier>,
        retention: Arc<RetentionPolicyEngine>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            retention,
            config,
        }
    }

    async fn store_call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, IngestError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        let _timer = crate::metrics::StoreTimer::new(operation);
        match timeout(self.config.store_timeout(), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                crate::metrics::record_store_error(operation, "error");
                Err(e.into())
            }
            Err(_) => {
                crate::metrics::record_store_error(operation, "timeout");
                Err(IngestError::StoreTimeout { operation })
            }
        }
    }

    /// Ingest one raw event.
    ///
    /// If a record for the same `(game_id, table_id, result)` already exists
    /// within the dedup window, it is returned untouched — no write, no
    /// notification. This is the idempotence guarantee. Otherwise the event
    /// is classified, persisted, and the stored record is handed to the
    /// notifier fire-and-forget: a notification failure never rolls back
    /// persistence and never surfaces as an ingest failure.
    pub async fn ingest(&self, event: RawResultEvent) -> Result<IngestOutcome, IngestError> {
        let window_ms = self.retention.dedup_window_ms();
        let around_ms = event.occurred_at();

        let existing = self
            .store_call(
                "find_similar",
                self.store.find_similar(
                    &event.game_id,
                    &event.table_id,
                    &event.result,
                    around_ms,
                    window_ms,
                ),
            )
            .await?;

        if let Some(duplicate) = existing {
            debug!(
                game_id = %event.game_id,
                table_id = %event.table_id,
                existing_id = %duplicate.id,
                "duplicate result inside dedup window, skipping"
            );
            crate::metrics::record_ingest("duplicate");
            return Ok(IngestOutcome::Duplicate(duplicate));
        }

        let classification = self.retention.classify(&event);
        let record = GameResultRecord::from_event(
            event,
            classification.tier,
            classification.priority,
            classification.expires_at,
        );

        let stored = self.store_call("insert", self.store.insert(record)).await?;
        crate::metrics::record_ingest("stored");
        debug!(
            record_id = %stored.id,
            game_id = %stored.game_id,
            tier = %stored.retention_tier,
            "result persisted"
        );

        self.notify_detached(stored.clone());
        Ok(IngestOutcome::Stored(stored))
    }

    /// Hand a stored record to the notification collaborator on its own
    /// task. Errors and timeouts are logged, never propagated — the record
    /// is already durable and the collaborator retries on its own terms.
    fn notify_detached(&self, record: GameResultRecord) {
        let notifier = Arc::clone(&self.notifier);
        let deadline = self.config.notify_timeout();
        tokio::spawn(async move {
            match timeout(deadline, notifier.notify(&record)).await {
                Ok(Ok(())) => {
                    crate::metrics::record_notification("success");
                }
                Ok(Err(e)) => {
                    crate::metrics::record_notification("error");
                    warn!(record_id = %record.id, error = %e, "result notification failed");
                }
                Err(_) => {
                    crate::metrics::record_notification("timeout");
                    warn!(record_id = %record.id, "result notification timed out");
                }
            }
        });
    }

    /// Delete one batch of expired, non-permanent records. Returns the
    /// count removed; zero is success (nothing to do). Call repeatedly
    /// until it returns 0 to drain a backlog without unbounded single-call
    /// latency.
    pub async fn cleanup_expired(&self, batch_size: usize) -> Result<u64, IngestError> {
        let removed = self
            .store_call(
                "delete_expired",
                self.store.delete_expired(now_millis(), batch_size),
            )
            .await?;
        if removed > 0 {
            info!(removed, "expired result records removed");
        }
        crate::metrics::record_cleanup(removed);
        Ok(removed)
    }

    /// Targeted deletion for operational use (e.g. decommissioning a game).
    /// Permanent records are excluded.
    pub async fn purge_game(&self, game_id: &str, older_than_days: u32) -> Result<u64, IngestError> {
        let cutoff_ms = now_millis() - i64::from(older_than_days) * MS_PER_DAY;
        let removed = self
            .store_call("purge", self.store.purge_game(game_id, cutoff_ms))
            .await?;
        info!(game_id, older_than_days, removed, "game results purged");
        crate::metrics::record_purge(removed);
        Ok(removed)
    }

    /// Start the scheduled cleanup sweep. Each cycle drains expired
    /// batches until the store reports an empty batch; transient store
    /// errors end the cycle and the next tick retries.
    pub fn spawn_cleanup(self: &Arc<Self>) -> BackgroundHandle {
        let pipeline = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.config.cleanup_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pipeline.drain_expired().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("cleanup sweep stopping");
                            break;
                        }
                    }
                }
            }
        });

        BackgroundHandle::new("cleanup-sweep", shutdown_tx, task)
    }

    async fn drain_expired(&self) {
        let batch_size = self.retention.cleanup_batch_size();
        loop {
            match self.cleanup_expired(batch_size).await {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "cleanup sweep cycle ended on store error");
                    break;
                }
            }
        }
    }
}
