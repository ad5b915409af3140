//! Memory accounting and pressure monitoring
//!
//! The monitor is the single source of truth for admission decisions.
//! Samplers are injectable so batch-memory behaviour can be tested
//! against a deterministic synthetic counter.

mod monitor;
mod sampler;

pub use monitor::{MemoryMonitor, MemoryStatus, MonitorConfig, PressureLevel};
pub use sampler::{MemorySample, MemorySampler, SimulatedSampler, SystemSampler};

/// Bytes in one mebibyte
pub const MIB: u64 = 1024 * 1024;
