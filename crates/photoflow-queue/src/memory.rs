//! Process memory probes.
//!
//! The monitored batch processor and the adaptive concurrency advisor
//! both compare against current memory usage. The probe is injected so
//! tests can force any reading.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of process memory readings.
pub trait MemoryProbe: Send + Sync + std::fmt::Debug {
    /// Resident memory currently used by the process, in bytes.
    fn used_bytes(&self) -> u64;

    /// Total memory available to the process, in bytes. Zero when unknown.
    fn total_bytes(&self) -> u64;

    /// Fraction of available memory in use, in `0.0..=1.0`.
    fn utilization(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / total as f64
    }
}

/// Probe backed by `/proc` on Linux.
#[derive(Debug, Clone, Default)]
pub struct ProcMemoryProbe;

impl ProcMemoryProbe {
    /// Create a new probe.
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "linux")]
    fn resident_bytes() -> u64 {
        let page_size = 4096u64;
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|s| {
                s.split_whitespace()
                    .nth(1)
                    .and_then(|pages| pages.parse::<u64>().ok())
            })
            .map(|pages| pages * page_size)
            .unwrap_or(0)
    }

    #[cfg(target_os = "linux")]
    fn system_total_bytes() -> u64 {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("MemTotal:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
            })
            .map(|kb| kb * 1024)
            .unwrap_or(0)
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_bytes() -> u64 {
        0
    }

    #[cfg(not(target_os = "linux"))]
    fn system_total_bytes() -> u64 {
        0
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn used_bytes(&self) -> u64 {
        Self::resident_bytes()
    }

    fn total_bytes(&self) -> u64 {
        Self::system_total_bytes()
    }
}

/// Probe returning fixed values, settable from tests.
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    used: AtomicU64,
    total: AtomicU64,
}

impl FixedMemoryProbe {
    /// Create a probe with the given readings.
    pub fn with_readings(used: u64, total: u64) -> Arc<Self> {
        Arc::new(Self {
            used: AtomicU64::new(used),
            total: AtomicU64::new(total),
        })
    }

    /// Update the used-bytes reading.
    pub fn set_used(&self, used: u64) {
        self.used.store(used, Ordering::SeqCst);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    fn total_bytes(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_is_a_fraction() {
        let probe = FixedMemoryProbe::with_readings(850, 1000);
        assert!((probe.utilization() - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_total_means_zero_utilization() {
        let probe = FixedMemoryProbe::with_readings(500, 0);
        assert_eq!(probe.utilization(), 0.0);
    }
}
