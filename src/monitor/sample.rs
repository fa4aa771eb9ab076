//! Process memory counters and trend math.

use crate::record::now_millis;

/// One immutable observation of process memory. Stored in a bounded ring
/// buffer; used only for trend computation and threshold checks.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySample {
    /// Epoch millis at capture time
    pub timestamp_ms: i64,
    /// Heap bytes in use (data segment on Linux)
    pub heap_used: u64,
    /// Heap budget the usage percentage is measured against
    pub heap_total: u64,
    /// Resident set size in bytes
    pub rss: u64,
    /// Non-heap resident bytes (program text and shared libraries)
    pub external: u64,
    /// Derived: `heap_used / heap_total * 100`
    pub heap_usage_percent: f64,
}

impl MemorySample {
    /// Capture the current process counters against a heap budget.
    #[must_use]
    pub fn capture(heap_total: u64) -> Self {
        let counters = read_process_memory();
        Self::from_counters(&counters, heap_total)
    }

    #[must_use]
    pub fn from_counters(counters: &ProcessMemoryCounters, heap_total: u64) -> Self {
        let heap_usage_percent = if heap_total == 0 {
            0.0
        } else {
            counters.heap_used as f64 / heap_total as f64 * 100.0
        };
        Self {
            timestamp_ms: now_millis(),
            heap_used: counters.heap_used,
            heap_total,
            rss: counters.rss,
            external: counters.external,
            heap_usage_percent,
        }
    }

    /// Usage as a 0.0–1.0 ratio for threshold classification.
    #[must_use]
    pub fn usage_ratio(&self) -> f64 {
        self.heap_usage_percent / 100.0
    }
}

/// Raw process counters. `available` is false on platforms without a
/// readable source; samples then carry zeros and never cross a threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemoryCounters {
    pub rss: u64,
    pub heap_used: u64,
    pub external: u64,
    pub available: bool,
}

/// Read current process memory counters.
#[must_use]
pub fn read_process_memory() -> ProcessMemoryCounters {
    #[cfg(target_os = "linux")]
    {
        read_proc_status().unwrap_or_default()
    }
    #[cfg(not(target_os = "linux"))]
    {
        ProcessMemoryCounters::default()
    }
}

/// Parse VmRSS/VmData/VmExe/VmLib out of /proc/self/status.
#[cfg(target_os = "linux")]
fn read_proc_status() -> Option<ProcessMemoryCounters> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let mut rss = 0u64;
    let mut data = 0u64;
    let mut exe = 0u64;
    let mut lib = 0u64;

    for line in status.lines() {
        if let Some(kb) = parse_kb(line, "VmRSS:") {
            rss = kb * 1024;
        } else if let Some(kb) = parse_kb(line, "VmData:") {
            data = kb * 1024;
        } else if let Some(kb) = parse_kb(line, "VmExe:") {
            exe = kb * 1024;
        } else if let Some(kb) = parse_kb(line, "VmLib:") {
            lib = kb * 1024;
        }
    }

    Some(ProcessMemoryCounters {
        rss,
        heap_used: data,
        external: exe + lib,
        available: true,
    })
}

#[cfg(target_os = "linux")]
fn parse_kb(line: &str, prefix: &str) -> Option<u64> {
    let rest = line.strip_prefix(prefix)?;
    rest.split_whitespace().next()?.parse().ok()
}

/// Heap growth direction over a sample window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Growing,
    Shrinking,
    Stable,
}

/// Linear estimate of heap growth rate. Used for alerting before a
/// threshold is crossed, never for triggering eviction directly.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTrend {
    pub direction: TrendDirection,
    pub mb_per_minute: f64,
    /// Number of samples the estimate was computed from
    pub samples: usize,
}

/// Rates inside ±this band count as stable.
const STABLE_BAND_MB_PER_MINUTE: f64 = 0.05;

/// Least-squares slope of `heap_used` over time.
#[must_use]
pub fn trend_of(samples: &[MemorySample]) -> MemoryTrend {
    if samples.len() < 2 {
        return MemoryTrend {
            direction: TrendDirection::Stable,
            mb_per_minute: 0.0,
            samples: samples.len(),
        };
    }

    let t0 = samples[0].timestamp_ms;
    let n = samples.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for s in samples {
        let x = (s.timestamp_ms - t0) as f64;
        let y = s.heap_used as f64;
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }

    let denom = n * sum_xx - sum_x * sum_x;
    let slope_bytes_per_ms = if denom.abs() < f64::EPSILON {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denom
    };

    let mb_per_minute = slope_bytes_per_ms * 60_000.0 / (1024.0 * 1024.0);
    let direction = if mb_per_minute > STABLE_BAND_MB_PER_MINUTE {
        TrendDirection::Growing
    } else if mb_per_minute < -STABLE_BAND_MB_PER_MINUTE {
        TrendDirection::Shrinking
    } else {
        TrendDirection::Stable
    };

    MemoryTrend {
        direction,
        mb_per_minute,
        samples: samples.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(t_ms: i64, heap_used: u64) -> MemorySample {
        MemorySample {
            timestamp_ms: t_ms,
            heap_used,
            heap_total: 512 * 1024 * 1024,
            rss: heap_used,
            external: 0,
            heap_usage_percent: 0.0,
        }
    }

    #[test]
    fn test_from_counters_derives_percent() {
        let counters = ProcessMemoryCounters {
            rss: 200,
            heap_used: 256,
            external: 10,
            available: true,
        };
        let sample = MemorySample::from_counters(&counters, 1_024);
        assert_eq!(sample.heap_used, 256);
        assert!((sample.heap_usage_percent - 25.0).abs() < 1e-9);
        assert!((sample.usage_ratio() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_zero_budget_yields_zero_percent() {
        let counters = ProcessMemoryCounters::default();
        let sample = MemorySample::from_counters(&counters, 0);
        assert_eq!(sample.heap_usage_percent, 0.0);
    }

    #[test]
    fn test_trend_needs_two_samples() {
        let trend = trend_of(&[sample_at(0, 100)]);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.mb_per_minute, 0.0);
        assert_eq!(trend.samples, 1);
    }

    #[test]
    fn test_trend_detects_growth() {
        // 1 MB per second of growth = 60 MB/min
        let mb = 1024 * 1024;
        let samples: Vec<_> = (0..10)
            .map(|i| sample_at(i * 1_000, (i as u64 + 1) * mb))
            .collect();

        let trend = trend_of(&samples);
        assert_eq!(trend.direction, TrendDirection::Growing);
        assert!((trend.mb_per_minute - 60.0).abs() < 0.5);
    }

    #[test]
    fn test_trend_detects_shrink() {
        let mb = 1024 * 1024;
        let samples: Vec<_> = (0..10)
            .map(|i| sample_at(i * 1_000, (20 - i as u64) * mb))
            .collect();

        let trend = trend_of(&samples);
        assert_eq!(trend.direction, TrendDirection::Shrinking);
        assert!(trend.mb_per_minute < 0.0);
    }

    #[test]
    fn test_trend_flat_is_stable() {
        let samples: Vec<_> = (0..10).map(|i| sample_at(i * 1_000, 64 * 1024 * 1024)).collect();
        let trend = trend_of(&samples);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_read_process_memory_on_linux() {
        let counters = read_process_memory();
        assert!(counters.available);
        assert!(counters.rss > 0, "a running test process has resident memory");
    }

    #[test]
    fn test_capture_is_monotonic_in_time() {
        let a = MemorySample::capture(1024);
        let b = MemorySample::capture(1024);
        assert!(b.timestamp_ms >= a.timestamp_ms);
    }
}
