// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process memory monitor.
//!
//! Samples heap usage on a timer, classifies pressure into staged levels,
//! and requests best-effort reclamation when pressure is sustained.
//! Reclamation is only ever invoked from the background loop (or an
//! explicit operator call) — never from the ingest path.

pub mod sample;

pub use sample::{MemorySample, MemoryTrend, ProcessMemoryCounters, TrendDirection};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::events::{MemoryEvent, MemoryEventListener};
use crate::pressure::PressureLevel;
use crate::record::now_millis;
use crate::tasks::BackgroundHandle;

/// Outcome of the most recent forced reclamation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReclaimStats {
    pub at_ms: i64,
    pub reason: String,
    pub rss_before: u64,
    pub rss_after: u64,
    pub freed_bytes: u64,
    pub duration_ms: u64,
}

/// Point-in-time summary for the operational-metrics collaborator.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub current: Option<MemorySample>,
    pub level: PressureLevel,
    pub warning_alerts: u64,
    pub critical_alerts: u64,
    pub emergency_alerts: u64,
    pub reclaim_count: u64,
    pub last_reclaim: Option<ReclaimStats>,
    pub trend: MemoryTrend,
}

impl std::fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.current {
            Some(s) => writeln!(
                f,
                "memory: {:.1}% of {} MB heap budget, rss {} MB [{}]",
                s.heap_usage_percent,
                s.heap_total / (1024 * 1024),
                s.rss / (1024 * 1024),
                self.level
            )?,
            None => writeln!(f, "memory: no samples yet [{}]", self.level)?,
        }
        writeln!(
            f,
            "alerts: {} warning, {} critical, {} emergency",
            self.warning_alerts, self.critical_alerts, self.emergency_alerts
        )?;
        match &self.last_reclaim {
            Some(r) => writeln!(
                f,
                "reclaims: {} (last freed {} KB in {} ms)",
                self.reclaim_count,
                r.freed_bytes / 1024,
                r.duration_ms
            )?,
            None => writeln!(f, "reclaims: {}", self.reclaim_count)?,
        }
        write!(
            f,
            "trend: {:?} at {:+.2} MB/min over {} samples",
            self.trend.direction, self.trend.mb_per_minute, self.trend.samples
        )
    }
}

/// Periodic sampler of process heap usage with staged pressure response.
pub struct MemoryMonitor {
    config: MonitorConfig,
    listeners: Vec<Arc<dyn MemoryEventListener>>,
    samples: RwLock<VecDeque<MemorySample>>,
    level: RwLock<PressureLevel>,
    warning_alerts: AtomicU64,
    critical_alerts: AtomicU64,
    emergency_alerts: AtomicU64,
    reclaim_count: AtomicU64,
    last_reclaim: RwLock<Option<ReclaimStats>>,
}

impl MemoryMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_listeners(config, Vec::new())
    }

    #[must_use]
    pub fn with_listeners(config: MonitorConfig, listeners: Vec<Arc<dyn MemoryEventListener>>) -> Self {
        Self {
            config,
            listeners,
            samples: RwLock::new(VecDeque::new()),
            level: RwLock::new(PressureLevel::Normal),
            warning_alerts: AtomicU64::new(0),
            critical_alerts: AtomicU64::new(0),
            emergency_alerts: AtomicU64::new(0),
            reclaim_count: AtomicU64::new(0),
            last_reclaim: RwLock::new(None),
        }
    }

    fn emit(&self, event: MemoryEvent) {
        for listener in &self.listeners {
            listener.on_memory_event(&event);
        }
    }

    /// Take one sample: read the process counters, append to the ring
    /// buffer (dropping the oldest at capacity), evaluate thresholds, and
    /// return the sample. Runs from the sampler task and on demand.
    pub fn sample(&self) -> MemorySample {
        let sample = MemorySample::capture(self.config.max_heap_bytes);
        self.observe(sample.clone());
        sample
    }

    /// Threshold evaluation shared by real and synthetic samples.
    fn observe(&self, sample: MemorySample) {
        {
            let mut samples = self.samples.write();
            if samples.len() >= self.config.max_samples {
                samples.pop_front();
            }
            samples.push_back(sample.clone());
        }

        let level = PressureLevel::from_ratio(sample.usage_ratio(), &self.config.thresholds);
        *self.level.write() = level;

        crate::metrics::set_heap_usage_ratio(sample.usage_ratio());
        crate::metrics::set_rss_bytes(sample.rss);

        if level.is_alert() {
            match level {
                PressureLevel::Warning => {
                    self.warning_alerts.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_memory_alert("warning");
                    warn!(
                        heap_percent = format_args!("{:.1}", sample.heap_usage_percent),
                        "memory usage above warning threshold"
                    );
                }
                PressureLevel::Critical => {
                    self.critical_alerts.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_memory_alert("critical");
                    warn!(
                        heap_percent = format_args!("{:.1}", sample.heap_usage_percent),
                        "memory usage critical"
                    );
                }
                PressureLevel::Emergency => {
                    self.emergency_alerts.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_memory_alert("emergency");
                    error!(
                        heap_percent = format_args!("{:.1}", sample.heap_usage_percent),
                        "memory usage at emergency level"
                    );
                }
                PressureLevel::Normal => {}
            }
            self.emit(MemoryEvent::ThresholdCrossed {
                level,
                heap_used: sample.heap_used,
                heap_total: sample.heap_total,
            });
        }
    }

    /// Pressure level of the most recent sample.
    #[must_use]
    pub fn current_level(&self) -> PressureLevel {
        *self.level.read()
    }

    /// Ask the runtime to return unreachable memory to the OS.
    ///
    /// Best effort, never a correctness requirement: returns false (with an
    /// informational event) when the capability is unavailable. Synchronous
    /// and may briefly pause the caller, so it belongs in the monitor loop,
    /// never on the hot ingest path.
    pub fn force_reclaim(&self, reason: &str) -> bool {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        {
            let before = sample::read_process_memory();
            let start = Instant::now();
            // SAFETY: malloc_trim has no preconditions; it only asks glibc
            // to release free heap pages back to the OS.
            unsafe {
                libc::malloc_trim(0);
            }
            let after = sample::read_process_memory();
            let duration = start.elapsed();
            let freed_bytes = before.rss.saturating_sub(after.rss);

            let stats = ReclaimStats {
                at_ms: now_millis(),
                reason: reason.to_string(),
                rss_before: before.rss,
                rss_after: after.rss,
                freed_bytes,
                duration_ms: duration.as_millis() as u64,
            };
            self.reclaim_count.fetch_add(1, Ordering::Relaxed);
            *self.last_reclaim.write() = Some(stats);

            crate::metrics::record_reclaim(freed_bytes, duration);
            info!(reason, freed_bytes, "forced memory reclamation completed");
            self.emit(MemoryEvent::ReclaimCompleted {
                reason: reason.to_string(),
                freed_bytes,
                duration_ms: duration.as_millis() as u64,
            });
            true
        }
        #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
        {
            let _ = Instant::now();
            crate::metrics::record_reclaim_unavailable();
            debug!(reason, "memory reclamation not available on this runtime");
            self.emit(MemoryEvent::ReclaimUnavailable {
                reason: reason.to_string(),
            });
            false
        }
    }

    /// Growth estimate over the most recent `last_n` samples.
    #[must_use]
    pub fn trend(&self, last_n: usize) -> MemoryTrend {
        let samples = self.samples.read();
        let start = samples.len().saturating_sub(last_n);
        let window: Vec<MemorySample> = samples.iter().skip(start).cloned().collect();
        sample::trend_of(&window)
    }

    /// Human-readable point-in-time summary.
    #[must_use]
    pub fn report(&self) -> MonitorReport {
        let current = self.samples.read().back().cloned();
        MonitorReport {
            current,
            level: self.current_level(),
            warning_alerts: self.warning_alerts.load(Ordering::Relaxed),
            critical_alerts: self.critical_alerts.load(Ordering::Relaxed),
            emergency_alerts: self.emergency_alerts.load(Ordering::Relaxed),
            reclaim_count: self.reclaim_count.load(Ordering::Relaxed),
            last_reclaim: self.last_reclaim.read().clone(),
            trend: self.trend(self.config.max_samples),
        }
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.read().len()
    }

    /// Start the periodic sampler. Critical and Emergency samples trigger
    /// forced reclamation from inside this loop.
    pub fn spawn_sampler(self: &Arc<Self>) -> BackgroundHandle {
        let monitor = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.config.sample_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = monitor.sample();
                        if monitor.current_level().should_force_reclaim() {
                            monitor.force_reclaim("memory-pressure");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("memory sampler stopping");
                            break;
                        }
                    }
                }
            }
        });

        BackgroundHandle::new("memory-sampler", shutdown_tx, task)
    }
}
