//! Integration tests for the retention engine.
//!
//! These run the full pipeline against the in-memory store — no external
//! backends required.
//!
//! # Test Organization
//! - `happy_*` - Normal operation: ingest, classification, cleanup, shutdown
//! - `failure_*` - Failure scenarios: notifier outages, sweep/extension races

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use retention_engine::record::now_millis;
use retention_engine::{
    BoundedCache, CacheConfig, EngineConfig, GameResultRecord, InMemoryResultStore, IngestOutcome,
    MemoryMonitor, NotifyError, PipelineConfig, Priority, RawResultEvent, ResultIngestPipeline,
    ResultNotifier, ResultStore, ResultValue, RetentionPolicyConfig, RetentionPolicyEngine,
    RetentionRule,
    RulePredicate,
};

// =============================================================================
// Helpers
// =============================================================================

struct CountingNotifier {
    calls: AtomicUsize,
}

impl CountingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ResultNotifier for CountingNotifier {
    async fn notify(&self, _record: &GameResultRecord) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl ResultNotifier for FailingNotifier {
    async fn notify(&self, _record: &GameResultRecord) -> Result<(), NotifyError> {
        Err(NotifyError::Channel("broadcast channel closed".into()))
    }
}

fn pipeline(
    store: Arc<InMemoryResultStore>,
    notifier: Arc<dyn ResultNotifier>,
    retention_config: RetentionPolicyConfig,
) -> Arc<ResultIngestPipeline> {
    let retention = Arc::new(RetentionPolicyEngine::new(retention_config).expect("valid config"));
    Arc::new(ResultIngestPipeline::new(
        store,
        notifier,
        retention,
        PipelineConfig::default(),
    ))
}

fn number_event(game: &str, table: &str, value: f64) -> RawResultEvent {
    RawResultEvent::new(game, table, ResultValue::Number(value))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

// =============================================================================
// Happy Path - Ingest & Classification
// =============================================================================

#[tokio::test]
async fn happy_ingest_twice_in_window_one_record_one_notification() {
    let store = Arc::new(InMemoryResultStore::new());
    let notifier = CountingNotifier::new();
    let pipeline = pipeline(store.clone(), notifier.clone(), RetentionPolicyConfig::default());

    let first = pipeline
        .ingest(number_event("lightning-roulette", "lr-1", 24.0))
        .await
        .unwrap();
    let second = pipeline
        .ingest(number_event("lightning-roulette", "lr-1", 24.0))
        .await
        .unwrap();

    assert!(matches!(first, IngestOutcome::Stored(_)));
    assert!(matches!(second, IngestOutcome::Duplicate(_)));
    assert_eq!(store.len(), 1);

    settle().await;
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn happy_rule_precedence_swapped_configs_differ() {
    // Same event, two configs that differ only in rule order, different
    // outcomes — precedence is list position, nothing else.
    let mut multiplier_first = RetentionPolicyConfig::default();
    multiplier_first.rules = vec![
        RetentionRule {
            predicate: RulePredicate::MultiplierAtLeast { threshold: 100.0 },
            tier: "90d".into(),
            priority: Priority::High,
        },
        RetentionRule {
            predicate: RulePredicate::WinnerContains {
                pattern: "jackpot".into(),
            },
            tier: "365d".into(),
            priority: Priority::Permanent,
        },
    ];
    let mut pattern_first = multiplier_first.clone();
    pattern_first.rules.reverse();

    let mut event = number_event("crazy-time", "ct-1", 1.0);
    event.multiplier = Some(150.0);
    event.winner = Some("jackpot hunter".into());

    let store_a = Arc::new(InMemoryResultStore::new());
    let pipeline_a = pipeline(store_a, CountingNotifier::new(), multiplier_first);
    let outcome_a = pipeline_a.ingest(event.clone()).await.unwrap();
    assert_eq!(outcome_a.record().retention_tier, "90d");
    assert_eq!(outcome_a.record().priority, Priority::High);

    let store_b = Arc::new(InMemoryResultStore::new());
    let pipeline_b = pipeline(store_b, CountingNotifier::new(), pattern_first);
    let outcome_b = pipeline_b.ingest(event).await.unwrap();
    assert_eq!(outcome_b.record().retention_tier, "365d");
    assert_eq!(outcome_b.record().priority, Priority::Permanent);
}

#[tokio::test]
async fn happy_unmatched_event_gets_default_tier() {
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = pipeline(store, CountingNotifier::new(), RetentionPolicyConfig::default());

    let outcome = pipeline
        .ingest(number_event("baccarat", "b-7", 2.0))
        .await
        .unwrap();

    assert_eq!(outcome.record().retention_tier, "30d");
    assert_eq!(outcome.record().priority, Priority::Normal);
    assert!(outcome.record().expires_at > now_millis());
}

// =============================================================================
// Happy Path - Cleanup, Purge, Extension
// =============================================================================

#[tokio::test]
async fn happy_cleanup_drains_backlog_and_spares_permanent() {
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = pipeline(store.clone(), CountingNotifier::new(), RetentionPolicyConfig::default());

    let now = now_millis();
    for i in 0..25 {
        let record = GameResultRecord::from_event(
            number_event("old-game", &format!("t-{}", i), i as f64),
            "7d".into(),
            Priority::Normal,
            now - 1,
        );
        store.insert(record).await.unwrap();
    }
    let permanent = GameResultRecord::from_event(
        number_event("old-game", "hall-of-fame", 999.0),
        "365d".into(),
        Priority::Permanent,
        now - 1,
    );
    let permanent_id = permanent.id;
    store.insert(permanent).await.unwrap();

    let mut total = 0;
    loop {
        let removed = pipeline.cleanup_expired(10).await.unwrap();
        if removed == 0 {
            break;
        }
        total += removed;
    }

    assert_eq!(total, 25);
    assert_eq!(store.len(), 1);
    assert!(store.get(permanent_id).is_some(), "permanent survives any horizon");
}

#[tokio::test]
async fn happy_extension_pushes_record_past_sweep() {
    let store = Arc::new(InMemoryResultStore::new());
    let retention =
        Arc::new(RetentionPolicyEngine::new(RetentionPolicyConfig::default()).unwrap());
    let pipeline = Arc::new(ResultIngestPipeline::new(
        store.clone(),
        CountingNotifier::new(),
        retention.clone(),
        PipelineConfig::default(),
    ));

    let record = GameResultRecord::from_event(
        number_event("roulette", "r-9", 36.0),
        "7d".into(),
        Priority::Normal,
        now_millis() - 1,
    );
    let id = record.id;
    store.insert(record).await.unwrap();

    let updated = retention
        .extend(store.as_ref(), id, "90d", Priority::High, "disputed payout")
        .await
        .unwrap();
    assert!(updated.expires_at > now_millis());
    assert_eq!(updated.audit.len(), 1);

    assert_eq!(pipeline.cleanup_expired(100).await.unwrap(), 0);
    assert!(store.get(id).is_some());
}

#[tokio::test]
async fn happy_purge_game_is_targeted() {
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = pipeline(store.clone(), CountingNotifier::new(), RetentionPolicyConfig::default());

    let now = now_millis();
    for (game, table) in [("dead-game", "t-1"), ("dead-game", "t-2"), ("live-game", "t-1")] {
        let mut record = GameResultRecord::from_event(
            number_event(game, table, 1.0),
            "30d".into(),
            Priority::Normal,
            now + 60_000,
        );
        record.extracted_at = now - 10 * 86_400_000;
        store.insert(record).await.unwrap();
    }

    let removed = pipeline.purge_game("dead-game", 5).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.len(), 1);
}

// =============================================================================
// Happy Path - Cache & Monitor wiring
// =============================================================================

#[tokio::test]
async fn happy_cache_ttl_example() {
    // set("a", v, ttl); wait past the ttl; get("a") -> Miss, size 0.
    let cache: BoundedCache<String> = BoundedCache::new(CacheConfig {
        max_entries: 16,
        max_bytes: 1024 * 1024,
        default_ttl_secs: 3_600,
        sweep_interval_secs: 300,
    });

    cache.set("a", "payload".into(), Some(Duration::from_millis(200)));
    assert!(cache.has("a"));

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.len(), 0);
}

#[tokio::test]
async fn happy_cache_lru_example() {
    // maxSize=2; set a, set b, get a, set c -> b evicted, a and c remain.
    let cache: BoundedCache<String> = BoundedCache::new(CacheConfig {
        max_entries: 2,
        max_bytes: 1024 * 1024,
        default_ttl_secs: 3_600,
        sweep_interval_secs: 300,
    });

    cache.set("a", "v".into(), None);
    tokio::time::sleep(Duration::from_millis(5)).await;
    cache.set("b", "v".into(), None);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(cache.get("a").is_some());
    tokio::time::sleep(Duration::from_millis(5)).await;
    cache.set("c", "v".into(), None);

    assert!(cache.has("a"));
    assert!(!cache.has("b"));
    assert!(cache.has("c"));
}

#[tokio::test]
async fn happy_all_background_tasks_shut_down_cleanly() {
    let config = EngineConfig::default();
    config.validate().unwrap();

    let cache: Arc<BoundedCache<String>> = Arc::new(BoundedCache::new(config.cache.clone()));
    let monitor = Arc::new(MemoryMonitor::new(config.monitor.clone()));
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = pipeline(store, CountingNotifier::new(), config.retention.clone());

    let sweeper = cache.spawn_sweeper();
    let sampler = monitor.spawn_sampler();
    let cleanup = pipeline.spawn_cleanup();

    tokio::time::sleep(Duration::from_millis(50)).await;

    sweeper.shutdown().await;
    sampler.shutdown().await;
    cleanup.shutdown().await;
}

// =============================================================================
// Failure Scenarios
// =============================================================================

#[tokio::test]
async fn failure_notifier_outage_never_loses_records() {
    let store = Arc::new(InMemoryResultStore::new());
    let pipeline = pipeline(store.clone(), Arc::new(FailingNotifier), RetentionPolicyConfig::default());

    for i in 0..5 {
        let outcome = pipeline
            .ingest(number_event("roulette", &format!("r-{}", i), i as f64))
            .await;
        assert!(outcome.is_ok(), "notify failures stay out of the ingest result");
    }
    settle().await;
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn failure_extension_and_sweep_race_never_half_applies() {
    // A record mid-extension must not be deleted by a sweep that read a
    // stale horizon: whenever extend() succeeds, the record survives.
    for _ in 0..25 {
        let store = Arc::new(InMemoryResultStore::new());
        let retention =
            Arc::new(RetentionPolicyEngine::new(RetentionPolicyConfig::default()).unwrap());
        let pipeline = Arc::new(ResultIngestPipeline::new(
            store.clone(),
            CountingNotifier::new(),
            retention.clone(),
            PipelineConfig::default(),
        ));

        let record = GameResultRecord::from_event(
            number_event("g", "t", 1.0),
            "7d".into(),
            Priority::Normal,
            now_millis() - 1,
        );
        let id = record.id;
        store.insert(record).await.unwrap();

        let store_for_extend = store.clone();
        let retention_for_extend = retention.clone();
        let extend = tokio::spawn(async move {
            retention_for_extend
                .extend(store_for_extend.as_ref(), id, "90d", Priority::High, "race")
                .await
        });
        let sweep = tokio::spawn(async move { pipeline.cleanup_expired(100).await });

        let extend_result = extend.await.unwrap();
        sweep.await.unwrap().unwrap();

        match extend_result {
            Ok(updated) => {
                assert!(
                    store.get(id).is_some(),
                    "extension won the race, record must survive the sweep"
                );
                assert!(updated.expires_at > now_millis());
            }
            Err(_) => {
                assert!(store.get(id).is_none(), "sweep won the race cleanly");
            }
        }
    }
}

#[tokio::test]
async fn failure_malformed_policy_rejected_at_load() {
    let json = r#"{
        "tiers": {"7d": 7},
        "default_tier": "7d",
        "rules": [
            {"predicate": {"kind": "winner_contains", "pattern": "x"},
             "tier": "ghost", "priority": "low"}
        ]
    }"#;
    let config: RetentionPolicyConfig = serde_json::from_str(json).unwrap();
    assert!(RetentionPolicyEngine::new(config).is_err());
}
