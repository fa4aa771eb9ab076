use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::record::{now_millis, GameResultRecord, Priority, ResultValue, RetentionAuditNote};

use super::traits::{ResultStore, StoreError};

/// DashMap-backed result store for tests and embedded deployments.
///
/// Per-entry locking gives `update_retention` the required atomicity
/// against `delete_expired`: the sweep re-checks `expires_at` under the
/// entry lock at removal time, so an extension that lands first wins.
pub struct InMemoryResultStore {
    records: DashMap<Uuid, GameResultRecord>,
}

impl InMemoryResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fetch a record by id (test helper)
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<GameResultRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn find_similar(
        &self,
        game_id: &str,
        table_id: &str,
        result: &ResultValue,
        around_ms: i64,
        window_ms: i64,
    ) -> Result<Option<GameResultRecord>, StoreError> {
        let now = now_millis();
        // Full scan is fine here; real backends index (game_id, table_id, extracted_at).
        let found = self.records.iter().find_map(|entry| {
            let r = entry.value();
            let same_event = r.game_id == game_id && r.table_id == table_id && &r.result == result;
            let in_window = (r.extracted_at - around_ms).abs() <= window_ms;
            if same_event && in_window && r.expires_at > now {
                Some(r.clone())
            } else {
                None
            }
        });
        Ok(found)
    }

    async fn insert(&self, record: GameResultRecord) -> Result<GameResultRecord, StoreError> {
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_expired(&self, now_ms: i64, limit: usize) -> Result<u64, StoreError> {
        let candidates: Vec<Uuid> = self
            .records
            .iter()
            .filter(|entry| {
                let r = entry.value();
                r.priority != Priority::Permanent && r.expires_at <= now_ms
            })
            .map(|entry| *entry.key())
            .take(limit)
            .collect();

        let mut removed = 0u64;
        for id in candidates {
            // Re-check under the entry lock: a concurrent extension may have
            // pushed expires_at forward since the candidate scan.
            let deleted = self
                .records
                .remove_if(&id, |_, r| {
                    r.priority != Priority::Permanent && r.expires_at <= now_ms
                })
                .is_some();
            if deleted {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn update_retention(
        &self,
        id: Uuid,
        tier: String,
        priority: Priority,
        expires_at: i64,
        note: RetentionAuditNote,
    ) -> Result<GameResultRecord, StoreError> {
        let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound)?;
        let record = entry.value_mut();
        record.retention_tier = tier;
        record.priority = priority;
        record.expires_at = expires_at;
        record.audit.push(note);
        Ok(record.clone())
    }

    async fn purge_game(&self, game_id: &str, cutoff_ms: i64) -> Result<u64, StoreError> {
        let candidates: Vec<Uuid> = self
            .records
            .iter()
            .filter(|entry| {
                let r = entry.value();
                r.game_id == game_id
                    && r.priority != Priority::Permanent
                    && r.extracted_at < cutoff_ms
            })
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0u64;
        for id in candidates {
            if self
                .records
                .remove_if(&id, |_, r| {
                    r.game_id == game_id
                        && r.priority != Priority::Permanent
                        && r.extracted_at < cutoff_ms
                })
                .is_some()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawResultEvent;

    fn record(game: &str, table: &str, value: f64, expires_at: i64) -> GameResultRecord {
        let event = RawResultEvent::new(game, table, ResultValue::Number(value));
        GameResultRecord::from_event(event, "30d".into(), Priority::Normal, expires_at)
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryResultStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_insert_and_find_similar() {
        let store = InMemoryResultStore::new();
        let r = record("roulette", "r-1", 17.0, now_millis() + 60_000);
        let extracted = r.extracted_at;
        store.insert(r).await.unwrap();

        let found = store
            .find_similar("roulette", "r-1", &ResultValue::Number(17.0), extracted + 2_000, 5_000)
            .await
            .unwrap();
        assert!(found.is_some());

        let miss = store
            .find_similar("roulette", "r-1", &ResultValue::Number(18.0), extracted, 5_000)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_find_similar_respects_window() {
        let store = InMemoryResultStore::new();
        let r = record("roulette", "r-1", 17.0, now_millis() + 60_000);
        let extracted = r.extracted_at;
        store.insert(r).await.unwrap();

        let outside = store
            .find_similar("roulette", "r-1", &ResultValue::Number(17.0), extracted + 6_000, 5_000)
            .await
            .unwrap();
        assert!(outside.is_none());
    }

    #[tokio::test]
    async fn test_find_similar_skips_expired_records() {
        let store = InMemoryResultStore::new();
        let r = record("roulette", "r-1", 17.0, now_millis() - 1);
        let extracted = r.extracted_at;
        store.insert(r).await.unwrap();

        let found = store
            .find_similar("roulette", "r-1", &ResultValue::Number(17.0), extracted, 5_000)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_skips_permanent() {
        let store = InMemoryResultStore::new();
        let now = now_millis();

        let mut permanent = record("baccarat", "b-1", 1.0, now - 10_000);
        permanent.priority = Priority::Permanent;
        store.insert(permanent.clone()).await.unwrap();
        store.insert(record("baccarat", "b-2", 2.0, now - 10_000)).await.unwrap();
        store.insert(record("baccarat", "b-3", 3.0, now + 60_000)).await.unwrap();

        let removed = store.delete_expired(now, 100).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(permanent.id).is_some());
    }

    #[tokio::test]
    async fn test_delete_expired_respects_limit() {
        let store = InMemoryResultStore::new();
        let now = now_millis();
        for i in 0..10 {
            store.insert(record("g", &format!("t-{}", i), i as f64, now - 1)).await.unwrap();
        }

        let removed = store.delete_expired(now, 4).await.unwrap();
        assert_eq!(removed, 4);
        assert_eq!(store.len(), 6);

        // Drain loop: repeated calls reach zero
        let mut total = removed;
        loop {
            let n = store.delete_expired(now, 4).await.unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 10);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_retention_appends_audit() {
        let store = InMemoryResultStore::new();
        let r = record("roulette", "r-1", 17.0, 1_000);
        let id = r.id;
        store.insert(r).await.unwrap();

        let updated = store
            .update_retention(
                id,
                "365d".into(),
                Priority::High,
                999_999,
                RetentionAuditNote {
                    reason: "manual review".into(),
                    extended_at: 500,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.retention_tier, "365d");
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.expires_at, 999_999);
        assert_eq!(updated.audit.len(), 1);
        assert_eq!(updated.audit[0].reason, "manual review");
    }

    #[tokio::test]
    async fn test_update_retention_unknown_id() {
        let store = InMemoryResultStore::new();
        let result = store
            .update_retention(
                Uuid::new_v4(),
                "30d".into(),
                Priority::Normal,
                0,
                RetentionAuditNote {
                    reason: "x".into(),
                    extended_at: 0,
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_purge_game_excludes_permanent_and_recent() {
        let store = InMemoryResultStore::new();
        let now = now_millis();

        let mut old = record("crash", "c-1", 1.0, now + 60_000);
        old.extracted_at = now - 100_000;
        store.insert(old).await.unwrap();

        let mut permanent = record("crash", "c-2", 2.0, now + 60_000);
        permanent.extracted_at = now - 100_000;
        permanent.priority = Priority::Permanent;
        store.insert(permanent).await.unwrap();

        let recent = record("crash", "c-3", 3.0, now + 60_000);
        store.insert(recent).await.unwrap();

        let other_game = record("roulette", "r-1", 4.0, now + 60_000);
        store.insert(other_game).await.unwrap();

        let removed = store.purge_game("crash", now - 50_000).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryResultStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let r = record("g", &format!("t-{}-{}", batch, i), i as f64, now_millis() + 60_000);
                    store_clone.insert(r).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
