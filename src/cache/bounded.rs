// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded TTL/LRU cache.
//!
//! The entry map, recency metadata, and running byte counter form one
//! logical unit of shared state behind a single `RwLock`: every mutating
//! path (insert, delete, eviction, sweep, lazy-expiry removal) holds the
//! exclusive scope, so the byte accounting can never drift from the actual
//! contents. Fresh-hit reads stay on the reader lock — recency is an atomic
//! per-entry counter.
//!
//! Expiry is enforced twice, sharing one check:
//! - lazily on the read path, bounding the staleness a reader can observe;
//! - eagerly by the background sweeper, bounding memory for keys that are
//!   never read again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::events::{CacheEvent, CacheEventListener, EvictReason, MissReason};
use crate::sizing::SizedValue;
use crate::tasks::BackgroundHandle;

struct Entry<V> {
    value: V,
    size_bytes: usize,
    expires_at: Instant,
    /// Insertion order, the deterministic tie-break for equal recency
    seq: u64,
    /// Microseconds since the cache epoch; updated atomically on every hit
    last_accessed_us: AtomicU64,
}

struct CacheInner<V> {
    entries: HashMap<String, Entry<V>>,
    tracked_bytes: usize,
    next_seq: u64,
}

/// Point-in-time counters for hit rate, eviction rate, and cleanup volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
    pub entries: usize,
    pub tracked_bytes: usize,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Generic key→value store with per-entry TTL, LRU recency tracking, and
/// size- and memory-bounded eviction.
///
/// Writes never hard-fail: `set` evicts whatever it must to make room and
/// then inserts.
pub struct BoundedCache<V> {
    inner: RwLock<CacheInner<V>>,
    config: CacheConfig,
    listeners: Vec<Arc<dyn CacheEventListener>>,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
}

impl<V> BoundedCache<V>
where
    V: SizedValue + Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_listeners(config, Vec::new())
    }

    /// Construct with an observer set. Listeners run inline on the calling
    /// path after the lock is released and must not block.
    #[must_use]
    pub fn with_listeners(config: CacheConfig, listeners: Vec<Arc<dyn CacheEventListener>>) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                tracked_bytes: 0,
                next_seq: 0,
            }),
            config,
            listeners,
            epoch: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_removed: AtomicU64::new(0),
        }
    }

    fn micros_since_epoch(&self, at: Instant) -> u64 {
        at.duration_since(self.epoch).as_micros() as u64
    }

    fn emit(&self, event: CacheEvent) {
        for listener in &self.listeners {
            listener.on_cache_event(&event);
        }
    }

    fn publish_gauges(&self, entries: usize, tracked_bytes: usize) {
        crate::metrics::set_cache_entries(entries);
        crate::metrics::set_cache_bytes(tracked_bytes);
    }

    /// Look up a key, refreshing its recency.
    ///
    /// An entry whose TTL has lapsed is deleted as part of the call and
    /// reported as a miss — readers never observe stale values. Unknown
    /// keys are a plain miss, never an error.
    pub fn get(&self, key: &str) -> Option<V> {
        enum Probe<V> {
            Hit(V),
            ExpiredCandidate,
            Absent,
        }

        let now = Instant::now();
        let probe = {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    entry
                        .last_accessed_us
                        .store(self.micros_since_epoch(now), Ordering::Relaxed);
                    Probe::Hit(entry.value.clone())
                }
                Some(_) => Probe::ExpiredCandidate,
                None => Probe::Absent,
            }
        };

        match probe {
            Probe::Hit(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_hit();
                self.emit(CacheEvent::Hit { key: key.to_string() });
                return Some(value);
            }
            Probe::Absent => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_miss("absent");
                self.emit(CacheEvent::Miss {
                    key: key.to_string(),
                    reason: MissReason::Absent,
                });
                return None;
            }
            Probe::ExpiredCandidate => {}
        }

        // Lazy expiry requires the exclusive scope; re-check under it since
        // the entry may have been refreshed or removed in the gap.
        enum Resolved<V> {
            Hit(V),
            Expired { entries: usize, tracked_bytes: usize },
            Absent,
        }

        let resolved = {
            let mut inner = self.inner.write();
            let now = Instant::now();
            let still_expired = inner.entries.get(key).map(|e| e.expires_at <= now);
            match still_expired {
                Some(true) => {
                    if let Some(removed) = inner.entries.remove(key) {
                        inner.tracked_bytes =
                            inner.tracked_bytes.saturating_sub(removed.size_bytes);
                    }
                    Resolved::Expired {
                        entries: inner.entries.len(),
                        tracked_bytes: inner.tracked_bytes,
                    }
                }
                Some(false) => {
                    // Raced with a concurrent set that refreshed the key.
                    if let Some(entry) = inner.entries.get(key) {
                        entry
                            .last_accessed_us
                            .store(self.micros_since_epoch(now), Ordering::Relaxed);
                        Resolved::Hit(entry.value.clone())
                    } else {
                        Resolved::Absent
                    }
                }
                None => Resolved::Absent,
            }
        };

        match resolved {
            Resolved::Hit(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_hit();
                self.emit(CacheEvent::Hit { key: key.to_string() });
                Some(value)
            }
            Resolved::Expired { entries, tracked_bytes } => {
                self.expired_removed.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_miss("expired");
                self.publish_gauges(entries, tracked_bytes);
                self.emit(CacheEvent::Miss {
                    key: key.to_string(),
                    reason: MissReason::Expired,
                });
                None
            }
            Resolved::Absent => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_miss("absent");
                self.emit(CacheEvent::Miss {
                    key: key.to_string(),
                    reason: MissReason::Absent,
                });
                None
            }
        }
    }

    /// Insert or replace a value. `ttl` defaults to the configured TTL.
    ///
    /// Before insertion: if the tracked footprint plus the incoming entry
    /// would exceed the memory ceiling, evict by recency (oldest first)
    /// until a fifth of the ceiling is freed or the cache is empty; then,
    /// if the entry count would exceed the maximum, evict exactly one LRU
    /// entry. Insertion itself always succeeds.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let size_bytes = value.size_bytes();
        let now = Instant::now();

        let mut events: Vec<CacheEvent> = Vec::new();
        let (entries_len, tracked_bytes) = {
            let mut inner = self.inner.write();

            // Replacement: retire the old entry first so the ceiling checks
            // see the real post-write state.
            if let Some(old) = inner.entries.remove(key) {
                inner.tracked_bytes = inner.tracked_bytes.saturating_sub(old.size_bytes);
            }

            if inner.tracked_bytes + size_bytes > self.config.max_bytes {
                self.evict_for_memory(&mut inner, size_bytes, &mut events);
            }

            if inner.entries.len() >= self.config.max_entries {
                self.evict_one_lru(&mut inner, &mut events);
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.insert(
                key.to_string(),
                Entry {
                    value,
                    size_bytes,
                    expires_at: now + ttl,
                    seq,
                    last_accessed_us: AtomicU64::new(self.micros_since_epoch(now)),
                },
            );
            inner.tracked_bytes += size_bytes;
            (inner.entries.len(), inner.tracked_bytes)
        };

        crate::metrics::record_cache_insert(size_bytes);
        self.publish_gauges(entries_len, tracked_bytes);
        for event in events {
            self.emit(event);
        }
        self.emit(CacheEvent::Insert {
            key: key.to_string(),
            size_bytes,
        });
    }

    /// Remove a key. Returns true if an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            let removed = inner.entries.remove(key);
            if let Some(ref entry) = removed {
                inner.tracked_bytes = inner.tracked_bytes.saturating_sub(entry.size_bytes);
            }
            removed.map(|_| (inner.entries.len(), inner.tracked_bytes))
        };

        match removed {
            Some((entries, bytes)) => {
                self.publish_gauges(entries, bytes);
                self.emit(CacheEvent::Remove { key: key.to_string() });
                true
            }
            None => false,
        }
    }

    /// Presence check, consistent with the read path's lazy expiry: an
    /// expired entry is deleted and reported absent. Does not refresh
    /// recency and does not count toward hit/miss statistics.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let probe = {
            let inner = self.inner.read();
            inner.entries.get(key).map(|e| e.expires_at > now)
        };
        match probe {
            Some(true) => return true,
            None => return false,
            Some(false) => {}
        }

        let mut inner = self.inner.write();
        let now = Instant::now();
        match inner.entries.get(key).map(|e| e.expires_at <= now) {
            Some(true) => {
                if let Some(removed) = inner.entries.remove(key) {
                    inner.tracked_bytes = inner.tracked_bytes.saturating_sub(removed.size_bytes);
                    self.expired_removed.fetch_add(1, Ordering::Relaxed);
                }
                false
            }
            Some(false) => true,
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.tracked_bytes = 0;
        drop(inner);
        self.publish_gauges(0, 0);
    }

    /// Eager expiry pass: delete every lapsed entry regardless of access
    /// pattern. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let (removed, remaining, tracked_bytes) = {
            let mut inner = self.inner.write();
            let now = Instant::now();
            let lapsed: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(key, _)| key.clone())
                .collect();

            for key in &lapsed {
                if let Some(entry) = inner.entries.remove(key) {
                    inner.tracked_bytes = inner.tracked_bytes.saturating_sub(entry.size_bytes);
                }
            }
            (lapsed.len(), inner.entries.len(), inner.tracked_bytes)
        };

        if removed > 0 {
            self.expired_removed.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, remaining, "cache sweep removed expired entries");
        }
        crate::metrics::record_cache_sweep(removed);
        self.publish_gauges(remaining, tracked_bytes);
        self.emit(CacheEvent::SweepCompleted { removed, remaining });
        removed
    }

    /// Current entry count (includes not-yet-swept expired entries).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Approximate bytes currently accounted against the memory ceiling.
    #[must_use]
    pub fn tracked_bytes(&self) -> usize {
        self.inner.read().tracked_bytes
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            entries: inner.entries.len(),
            tracked_bytes: inner.tracked_bytes,
        }
    }

    /// Start the periodic sweeper. The task stops accepting timer fires on
    /// shutdown, finishes an in-flight sweep, then returns.
    pub fn spawn_sweeper(self: &Arc<Self>) -> BackgroundHandle {
        let cache = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.config.sweep_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh cache
            // isn't swept at startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        trace!(removed, "scheduled cache sweep finished");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("cache sweeper stopping");
                            break;
                        }
                    }
                }
            }
        });

        BackgroundHandle::new("cache-sweeper", shutdown_tx, task)
    }

    /// Recency-ordered batch eviction under memory pressure. Frees at least
    /// a fifth of the ceiling (and enough for the incoming entry) or runs
    /// the cache empty. Caller holds the exclusive scope.
    fn evict_for_memory(&self, inner: &mut CacheInner<V>, incoming: usize, events: &mut Vec<CacheEvent>) {
        let ceiling = self.config.max_bytes;
        let hysteresis = ceiling / 5;

        let mut victims: Vec<(String, u64, u64, usize)> = inner
            .entries
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    entry.last_accessed_us.load(Ordering::Relaxed),
                    entry.seq,
                    entry.size_bytes,
                )
            })
            .collect();
        victims.sort_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)));

        let mut freed = 0usize;
        for (key, _, _, size_bytes) in victims {
            let within_ceiling = inner.tracked_bytes + incoming <= ceiling;
            if freed >= hysteresis && within_ceiling {
                break;
            }
            inner.entries.remove(&key);
            inner.tracked_bytes = inner.tracked_bytes.saturating_sub(size_bytes);
            freed += size_bytes;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_cache_eviction("memory_ceiling", size_bytes);
            events.push(CacheEvent::Evict {
                key,
                reason: EvictReason::MemoryCeiling,
            });
        }
    }

    /// Displace the single least-recently-used entry, ties broken by
    /// earliest insertion. Caller holds the exclusive scope.
    fn evict_one_lru(&self, inner: &mut CacheInner<V>, events: &mut Vec<CacheEvent>) {
        let victim = inner
            .entries
            .iter()
            .map(|(key, entry)| {
                (
                    entry.last_accessed_us.load(Ordering::Relaxed),
                    entry.seq,
                    key.clone(),
                )
            })
            .min();

        if let Some((_, _, key)) = victim {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.tracked_bytes = inner.tracked_bytes.saturating_sub(entry.size_bytes);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_eviction("capacity", entry.size_bytes);
                events.push(CacheEvent::Evict {
                    key,
                    reason: EvictReason::Capacity,
                });
            }
        }
    }
}
