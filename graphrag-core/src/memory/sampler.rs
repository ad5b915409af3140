//! Memory samplers
//!
//! `SystemSampler` reads the OS counters through sysinfo.
//! `SimulatedSampler` is a synthetic counter with peak tracking that
//! batch generation drives through `reserve`/`release`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{Pid, ProcessesToUpdate, System};

use super::MIB;

/// One reading of memory counters, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub total_bytes: u64,
    pub available_bytes: u64,
    /// Resident memory attributed to this process
    pub process_bytes: u64,
}

impl MemorySample {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    pub fn usage_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.total_bytes as f64
    }
}

/// Source of memory readings
pub trait MemorySampler: Send + Sync {
    /// Take a reading. Never fails; implementations degrade to an estimate.
    fn sample(&self) -> MemorySample;

    /// Account for working memory about to be used by a batch.
    /// Real samplers observe the OS instead and ignore this.
    fn reserve(&self, _bytes: u64) {}

    /// Return memory previously passed to `reserve`
    fn release(&self, _bytes: u64) {}

    fn name(&self) -> &'static str;
}

/// Sampler backed by OS memory counters
pub struct SystemSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
    fallback_total_bytes: u64,
}

impl SystemSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                log::warn!("Process id unavailable, process memory will be estimated: {}", e);
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
            fallback_total_bytes: 4096 * MIB,
        }
    }

    /// Total assumed when the OS reports no memory at all
    pub fn with_fallback_total(mut self, bytes: u64) -> Self {
        self.fallback_total_bytes = bytes;
        self
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SystemSampler {
    fn sample(&self) -> MemorySample {
        let mut system = self.system.lock();
        system.refresh_memory();

        let process_bytes = match self.pid {
            Some(pid) => {
                system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                system.process(pid).map(|p| p.memory()).unwrap_or(0)
            }
            None => 0,
        };

        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            // Counters unavailable (restricted sandbox): assume a fixed
            // device size with only this process resident.
            let total_bytes = self.fallback_total_bytes;
            return MemorySample {
                total_bytes,
                available_bytes: total_bytes.saturating_sub(process_bytes),
                process_bytes,
            };
        }

        MemorySample {
            total_bytes,
            available_bytes: system.available_memory().min(total_bytes),
            process_bytes,
        }
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Deterministic synthetic memory counter
///
/// Usage is `baseline + reserved`; the highest value ever reached is
/// kept for assertions.
pub struct SimulatedSampler {
    total_bytes: u64,
    baseline_bytes: AtomicU64,
    reserved_bytes: AtomicU64,
    peak_bytes: AtomicU64,
}

impl SimulatedSampler {
    pub fn new(total_bytes: u64, baseline_bytes: u64) -> Self {
        Self {
            total_bytes,
            baseline_bytes: AtomicU64::new(baseline_bytes),
            reserved_bytes: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(baseline_bytes),
        }
    }

    /// Replace the baseline, e.g. to push the monitor into a pressure level
    pub fn set_baseline(&self, bytes: u64) {
        self.baseline_bytes.store(bytes, Ordering::SeqCst);
        self.track_peak();
    }

    pub fn current_bytes(&self) -> u64 {
        self.baseline_bytes.load(Ordering::SeqCst) + self.reserved_bytes.load(Ordering::SeqCst)
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes.load(Ordering::SeqCst)
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes.load(Ordering::SeqCst)
    }

    fn track_peak(&self) {
        self.peak_bytes
            .fetch_max(self.current_bytes(), Ordering::SeqCst);
    }
}

impl MemorySampler for SimulatedSampler {
    fn sample(&self) -> MemorySample {
        let used = self.current_bytes().min(self.total_bytes);
        MemorySample {
            total_bytes: self.total_bytes,
            available_bytes: self.total_bytes - used,
            process_bytes: used,
        }
    }

    fn reserve(&self, bytes: u64) {
        self.reserved_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.track_peak();
    }

    fn release(&self, bytes: u64) {
        // Saturating: releasing more than was reserved clamps at zero
        let _ = self
            .reserved_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
