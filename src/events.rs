//! Lifecycle event payloads and the observer seam.
//!
//! The cache and the memory monitor announce every state transition to a
//! listener set supplied at construction time. There is no global bus: the
//! host registers whatever operational sink it wants (a metrics exporter, a
//! log forwarder, a test recorder) and receives typed payloads.
//!
//! Listeners run inline on the emitting path and must not block.

use crate::pressure::PressureLevel;

/// Why a `get`/`has` probe missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// Key was never present (or already removed)
    Absent,
    /// Entry existed but its TTL had lapsed; it was removed as part of the call
    Expired,
}

/// Why an entry was evicted ahead of its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Entry-count ceiling reached; one LRU entry was displaced
    Capacity,
    /// Memory ceiling reached; recency-ordered batch eviction ran
    MemoryCeiling,
}

/// Cache state transition, carrying enough for an observer to compute
/// hit rate, eviction rate, and cleanup volume.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Hit { key: String },
    Miss { key: String, reason: MissReason },
    Insert { key: String, size_bytes: usize },
    Remove { key: String },
    Evict { key: String, reason: EvictReason },
    SweepCompleted { removed: usize, remaining: usize },
}

/// Memory monitor transition.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEvent {
    ThresholdCrossed {
        level: PressureLevel,
        heap_used: u64,
        heap_total: u64,
    },
    ReclaimCompleted {
        reason: String,
        freed_bytes: u64,
        duration_ms: u64,
    },
    /// The runtime does not expose a reclamation capability. Informational,
    /// not an error.
    ReclaimUnavailable { reason: String },
}

pub trait CacheEventListener: Send + Sync {
    fn on_cache_event(&self, event: &CacheEvent);
}

pub trait MemoryEventListener: Send + Sync {
    fn on_memory_event(&self, event: &MemoryEvent);
}
