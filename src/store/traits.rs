use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::record::{GameResultRecord, Priority, ResultValue, RetentionAuditNote};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,
    #[error("Store operation timed out")]
    Timeout,
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Abstract durable-store boundary.
///
/// The engine never assumes a specific query language — only these
/// operation shapes. Implementations must make `update_retention` atomic
/// with respect to `delete_expired`'s selection: a record mid-extension
/// must not be deleted by a sweep that read a stale `expires_at`.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Find an existing record for the same `(game_id, table_id, result)`
    /// whose `extracted_at` falls within ±`window_ms` of `around_ms` and
    /// whose `expires_at` is still in the future.
    async fn find_similar(
        &self,
        game_id: &str,
        table_id: &str,
        result: &ResultValue,
        around_ms: i64,
        window_ms: i64,
    ) -> Result<Option<GameResultRecord>, StoreError>;

    async fn insert(&self, record: GameResultRecord) -> Result<GameResultRecord, StoreError>;

    /// Delete up to `limit` records with `expires_at <= now_ms` and
    /// `priority != Permanent`. Returns the count actually removed;
    /// zero rows is success.
    async fn delete_expired(&self, now_ms: i64, limit: usize) -> Result<u64, StoreError>;

    /// Conditionally rewrite a record's retention envelope and append an
    /// audit note, atomically with respect to concurrent sweeps.
    async fn update_retention(
        &self,
        id: Uuid,
        tier: String,
        priority: Priority,
        expires_at: i64,
        note: RetentionAuditNote,
    ) -> Result<GameResultRecord, StoreError>;

    /// Delete non-permanent records for one game with
    /// `extracted_at < cutoff_ms`. Returns the count removed.
    async fn purge_game(&self, game_id: &str, cutoff_ms: i64) -> Result<u64, StoreError>;
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification channel error: {0}")]
    Channel(String),
}

/// Live-broadcast collaborator invoked after successful persistence.
///
/// Called fire-and-forget: failures are logged by the pipeline, never
/// propagated, and are independently retryable by the collaborator itself.
#[async_trait]
pub trait ResultNotifier: Send + Sync {
    async fn notify(&self, record: &GameResultRecord) -> Result<(), NotifyError>;
}
