//! # Retention Engine
//!
//! A retention-aware result cache and memory-pressure eviction engine for
//! live game result streams.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ResultIngestPipeline                       │
//! │  • Dedup against recent stored equivalents (±5s window)     │
//! │  • Classify via RetentionPolicyEngine (tier/priority/TTL)   │
//! │  • Persist, then notify collaborator (fire-and-forget)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BoundedCache                           │
//! │  • Per-entry TTL with lazy expiry on reads                  │
//! │  • LRU eviction on count and memory ceilings                │
//! │  • Eager background sweep for never-read keys               │
//! │  • Lifecycle events to registered listeners                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (pressure-driven eviction)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MemoryMonitor                          │
//! │  • Periodic heap sampling into a bounded ring buffer        │
//! │  • Staged thresholds: Warning / Critical / Emergency        │
//! │  • Best-effort forced reclamation under sustained pressure  │
//! │  • Growth trend estimation for early alerting               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use retention_engine::{
//!     EngineConfig, InMemoryResultStore, RawResultEvent, ResultIngestPipeline,
//!     ResultNotifier, ResultValue, RetentionPolicyEngine,
//! };
//! use retention_engine::store::NotifyError;
//! use retention_engine::record::GameResultRecord;
//!
//! struct LogNotifier;
//!
//! #[async_trait::async_trait]
//! impl ResultNotifier for LogNotifier {
//!     async fn notify(&self, record: &GameResultRecord) -> Result<(), NotifyError> {
//!         println!("new result for {}", record.game_id);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EngineConfig::default();
//!     config.validate().expect("retention policy is well-formed");
//!
//!     let retention = Arc::new(
//!         RetentionPolicyEngine::new(config.retention.clone()).expect("validated above"),
//!     );
//!     let pipeline = Arc::new(ResultIngestPipeline::new(
//!         Arc::new(InMemoryResultStore::new()),
//!         Arc::new(LogNotifier),
//!         retention,
//!         config.pipeline.clone(),
//!     ));
//!
//!     let cleanup = pipeline.spawn_cleanup();
//!
//!     let event = RawResultEvent::new("crazy-time", "ct-01", ResultValue::Number(7.0));
//!     pipeline.ingest(event).await.expect("store reachable");
//!
//!     cleanup.shutdown().await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded Caching**: TTL + LRU with deterministic tie-breaks and a
//!   hard memory ceiling
//! - **Lazy + Eager Expiry**: reads never observe stale entries; a sweeper
//!   bounds memory for write-only keys
//! - **Staged Pressure Response**: warn → reclaim-and-warn → reclaim-and-alarm
//! - **Rule-Driven Retention**: ordered first-match-wins classification,
//!   hot-reloadable without restart
//! - **Idempotent Ingest**: at most one stored record per dedup window
//! - **Observer Seam**: typed cache/memory events to listeners supplied at
//!   construction, `metrics`-crate instrumentation throughout
//!
//! ## Configuration
//!
//! See [`EngineConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`pipeline`]: [`ResultIngestPipeline`] — dedup, classify, persist, notify
//! - [`cache`]: [`BoundedCache`] — TTL/LRU store with eviction events
//! - [`monitor`]: [`MemoryMonitor`] — sampling, thresholds, reclamation
//! - [`retention`]: [`RetentionPolicyEngine`] — rule tables and expiry math
//! - [`store`]: durable-store and notifier trait boundaries
//! - [`pressure`]: staged pressure levels
//! - [`events`]: lifecycle event payloads and listener traits
//! - [`sizing`]: approximate memory footprint estimation
//! - [`metrics`]: `metrics`-crate instrumentation helpers

pub mod cache;
pub mod config;
pub mod events;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod pressure;
pub mod record;
pub mod retention;
pub mod sizing;
pub mod store;
pub mod tasks;

pub use cache::{BoundedCache, CacheStats};
pub use config::{CacheConfig, EngineConfig, MonitorConfig, PipelineConfig};
pub use events::{CacheEvent, CacheEventListener, EvictReason, MemoryEvent, MemoryEventListener, MissReason};
pub use monitor::{MemoryMonitor, MemorySample, MemoryTrend, MonitorReport, TrendDirection};
pub use pipeline::{IngestError, IngestOutcome, ResultIngestPipeline};
pub use pressure::{PressureLevel, PressureThresholds};
pub use record::{GameResultRecord, Priority, RawResultEvent, ResultValue, RetentionAuditNote};
pub use retention::{
    Classification, ConfigError, RetentionError, RetentionPolicyConfig, RetentionPolicyEngine,
    RetentionRule, RulePredicate,
};
pub use sizing::SizedValue;
pub use store::{InMemoryResultStore, NotifyError, ResultNotifier, ResultStore, StoreError};
pub use tasks::BackgroundHandle;
