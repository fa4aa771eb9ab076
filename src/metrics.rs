// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the retention engine.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host
//! process chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `retention_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size gauges
//!
//! # Labels
//! - `reason`: expired, absent, capacity, memory_ceiling
//! - `operation`: find_similar, insert, delete_expired, update_retention, purge
//! - `status`: success, error, timeout
//! - `level`: warning, critical, emergency

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// CACHE - hit/miss/eviction accounting
// ═══════════════════════════════════════════════════════════════════════════

pub fn record_cache_hit() {
    counter!("retention_engine_cache_hits_total").increment(1);
}

pub fn record_cache_miss(reason: &'static str) {
    counter!("retention_engine_cache_misses_total", "reason" => reason).increment(1);
}

pub fn record_cache_insert(bytes: usize) {
    counter!("retention_engine_cache_inserts_total").increment(1);
    counter!("retention_engine_cache_inserted_bytes_total").increment(bytes as u64);
}

pub fn record_cache_eviction(reason: &'static str, bytes: usize) {
    counter!("retention_engine_cache_evictions_total", "reason" => reason).increment(1);
    counter!("retention_engine_cache_evicted_bytes_total").increment(bytes as u64);
}

pub fn record_cache_sweep(removed: usize) {
    counter!("retention_engine_cache_sweeps_total").increment(1);
    counter!("retention_engine_cache_swept_entries_total").increment(removed as u64);
}

pub fn set_cache_entries(count: usize) {
    gauge!("retention_engine_cache_entries").set(count as f64);
}

pub fn set_cache_bytes(bytes: usize) {
    gauge!("retention_engine_cache_bytes").set(bytes as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// MEMORY MONITOR - pressure and reclamation
// ═══════════════════════════════════════════════════════════════════════════

pub fn set_heap_usage_ratio(ratio: f64) {
    gauge!("retention_engine_heap_usage_ratio").set(ratio);
}

pub fn set_rss_bytes(bytes: u64) {
    gauge!("retention_engine_rss_bytes").set(bytes as f64);
}

pub fn record_memory_alert(level: &'static str) {
    counter!("retention_engine_memory_alerts_total", "level" => level).increment(1);
}

pub fn record_reclaim(freed_bytes: u64, duration: Duration) {
    counter!("retention_engine_reclaims_total").increment(1);
    counter!("retention_engine_reclaimed_bytes_total").increment(freed_bytes);
    histogram!("retention_engine_reclaim_seconds").record(duration.as_secs_f64());
}

pub fn record_reclaim_unavailable() {
    counter!("retention_engine_reclaim_unavailable_total").increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// INGEST PIPELINE - dedup, persistence, notification, cleanup
// ═══════════════════════════════════════════════════════════════════════════

pub fn record_ingest(outcome: &'static str) {
    counter!("retention_engine_ingest_total", "outcome" => outcome).increment(1);
}

pub fn record_store_error(operation: &'static str, status: &'static str) {
    counter!(
        "retention_engine_store_errors_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

pub fn record_store_latency(operation: &'static str, duration: Duration) {
    histogram!(
        "retention_engine_store_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

pub fn record_notification(status: &'static str) {
    counter!("retention_engine_notifications_total", "status" => status).increment(1);
}

pub fn record_cleanup(removed: u64) {
    counter!("retention_engine_cleanup_batches_total").increment(1);
    counter!("retention_engine_cleanup_removed_total").increment(removed);
    histogram!("retention_engine_cleanup_batch_size").record(removed as f64);
}

pub fn record_purge(removed: u64) {
    counter!("retention_engine_purged_records_total").increment(removed);
}

pub fn record_classification(tier: &str) {
    counter!("retention_engine_classifications_total", "tier" => tier.to_string()).increment(1);
}

/// A timing guard that records store latency on drop.
pub struct StoreTimer {
    operation: &'static str,
    start: Instant,
}

impl StoreTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for StoreTimer {
    fn drop(&mut self) {
        record_store_latency(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests verify the API compiles and doesn't panic.
    // In production, you'd use metrics-util's Recorder for assertions.

    #[test]
    fn test_cache_metrics() {
        record_cache_hit();
        record_cache_miss("expired");
        record_cache_miss("absent");
        record_cache_insert(1024);
        record_cache_eviction("capacity", 512);
        record_cache_eviction("memory_ceiling", 4096);
        record_cache_sweep(12);
        set_cache_entries(100);
        set_cache_bytes(1024 * 1024);
    }

    #[test]
    fn test_memory_metrics() {
        set_heap_usage_ratio(0.72);
        set_rss_bytes(128 * 1024 * 1024);
        record_memory_alert("warning");
        record_memory_alert("critical");
        record_reclaim(4 * 1024 * 1024, Duration::from_millis(12));
        record_reclaim_unavailable();
    }

    #[test]
    fn test_pipeline_metrics() {
        record_ingest("stored");
        record_ingest("duplicate");
        record_store_error("insert", "timeout");
        record_store_latency("find_similar", Duration::from_micros(250));
        record_notification("success");
        record_notification("error");
        record_cleanup(42);
        record_purge(7);
        record_classification("30d");
    }

    #[test]
    fn test_store_timer_records_on_drop() {
        {
            let _timer = StoreTimer::new("insert");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}
