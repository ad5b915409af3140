//! Memory pressure monitor
//!
//! Periodically samples memory, classifies it into a pressure level and
//! publishes the result on a watch channel.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::sampler::{MemorySample, MemorySampler};
use super::MIB;
use crate::error::{GraphRagError, Result};

/// Coarse memory headroom classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Normal,
    Moderate,
    High,
    Critical,
}

impl PressureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling period of the background loop
    pub interval_ms: u64,
    /// Minimum available memory for inference to be admitted
    pub safety_buffer_mb: u64,
    pub moderate_threshold: f64,
    pub high_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            safety_buffer_mb: 500,
            moderate_threshold: 0.70,
            high_threshold: 0.85,
            critical_threshold: 0.95,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 < self.moderate_threshold
            && self.moderate_threshold < self.high_threshold
            && self.high_threshold < self.critical_threshold
            && self.critical_threshold <= 1.0;
        if !ordered {
            return Err(GraphRagError::configuration(format!(
                "pressure thresholds must increase within (0, 1]: {} / {} / {}",
                self.moderate_threshold, self.high_threshold, self.critical_threshold
            )));
        }
        if self.interval_ms == 0 {
            return Err(GraphRagError::configuration("monitor interval must be positive"));
        }
        Ok(())
    }

    /// Classify a usage fraction of total memory
    pub fn classify(&self, usage_fraction: f64) -> PressureLevel {
        if usage_fraction >= self.critical_threshold {
            PressureLevel::Critical
        } else if usage_fraction >= self.high_threshold {
            PressureLevel::High
        } else if usage_fraction >= self.moderate_threshold {
            PressureLevel::Moderate
        } else {
            PressureLevel::Normal
        }
    }
}

/// A classified memory reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatus {
    pub total_memory: u64,
    pub available_memory: u64,
    pub used_memory: u64,
    pub process_memory: u64,
    pub pressure_level: PressureLevel,
    pub can_perform_inference: bool,
    pub last_updated: DateTime<Utc>,
}

impl MemoryStatus {
    pub fn usage_fraction(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        self.used_memory as f64 / self.total_memory as f64
    }
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic memory sampler and admission gate
pub struct MemoryMonitor {
    sampler: Arc<dyn MemorySampler>,
    config: MonitorConfig,
    status: watch::Sender<MemoryStatus>,
    task: Mutex<Option<MonitorTask>>,
}

impl MemoryMonitor {
    pub fn new(sampler: Arc<dyn MemorySampler>, config: MonitorConfig) -> Self {
        let initial = evaluate(&config, sampler.sample());
        log::debug!(
            "MemoryMonitor using {} sampler, initial pressure {}",
            sampler.name(),
            initial.pressure_level
        );
        let (status, _) = watch::channel(initial);
        Self {
            sampler,
            config,
            status,
            task: Mutex::new(None),
        }
    }

    pub fn sampler(&self) -> &Arc<dyn MemorySampler> {
        &self.sampler
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start the periodic sampling loop. No-op if already running, or
    /// when called outside a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime; memory monitoring not started");
            return;
        };

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = Arc::downgrade(self);
        let period = self.config.interval();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(monitor) = monitor.upgrade() else { break };
                        monitor.current_status();
                    }
                }
            }
        });

        log::info!("Memory monitoring started ({}ms interval)", self.config.interval_ms);
        *task = Some(MonitorTask { cancel, handle });
    }

    /// Stop the sampling loop. No-op if not running.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel.cancel();
            log::info!("Memory monitoring stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Take a fresh sample, publish it and return it
    pub fn current_status(&self) -> MemoryStatus {
        let status = evaluate(&self.config, self.sampler.sample());
        let previous = self.status.send_replace(status.clone());
        if previous.pressure_level != status.pressure_level {
            log_transition(previous.pressure_level, &status);
        }
        status
    }

    /// Most recently published status, without resampling
    pub fn latest(&self) -> MemoryStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every published status
    pub fn subscribe(&self) -> watch::Receiver<MemoryStatus> {
        self.status.subscribe()
    }

    /// Fresh admission decision for model-backed inference
    pub fn can_perform_inference(&self) -> bool {
        self.current_status().can_perform_inference
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

fn evaluate(config: &MonitorConfig, sample: MemorySample) -> MemoryStatus {
    let usage = sample.usage_fraction();
    let pressure_level = config.classify(usage);
    let can_perform_inference = sample.available_bytes >= config.safety_buffer_mb * MIB
        && pressure_level != PressureLevel::Critical
        && usage < config.critical_threshold;

    MemoryStatus {
        total_memory: sample.total_bytes,
        available_memory: sample.available_bytes,
        used_memory: sample.used_bytes(),
        process_memory: sample.process_bytes,
        pressure_level,
        can_perform_inference,
        last_updated: Utc::now(),
    }
}

fn log_transition(from: PressureLevel, status: &MemoryStatus) {
    let available_mb = status.available_memory / MIB;
    if status.pressure_level >= PressureLevel::High {
        log::warn!(
            "Memory pressure {} -> {} ({}MB available, inference {})",
            from,
            status.pressure_level,
            available_mb,
            if status.can_perform_inference { "allowed" } else { "blocked" }
        );
    } else {
        log::info!(
            "Memory pressure {} -> {} ({}MB available)",
            from,
            status.pressure_level,
            available_mb
        );
    }
}
