//! Generator performance counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::strategy::{DeploymentMode, LoadStats};

/// Live counters, updated lock-free
#[derive(Debug, Default)]
pub(crate) struct EmbeddingCounters {
    generated: AtomicU64,
    total_micros: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
    budget_overruns: AtomicU64,
    peak_batch_bytes: AtomicU64,
}

impl EmbeddingCounters {
    pub fn record_generated(&self, elapsed: Duration) {
        self.generated.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_budget_overrun(&self) {
        self.budget_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_batch_memory(&self, bytes: u64) {
        self.peak_batch_bytes.fetch_max(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self, load: LoadStats) -> PerformanceMetrics {
        let generated = self.generated.load(Ordering::Relaxed);
        let total_micros = self.total_micros.load(Ordering::Relaxed);
        let average_embedding_ms = if generated == 0 {
            0.0
        } else {
            total_micros as f64 / generated as f64 / 1000.0
        };

        PerformanceMetrics {
            total_generated: generated,
            average_embedding_ms,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            budget_overruns: self.budget_overruns.load(Ordering::Relaxed),
            model_loads: load.loads,
            last_model_load_ms: load.last_load_ms,
            peak_batch_memory_bytes: self.peak_batch_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time generator metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Embeddings computed (cache hits excluded)
    pub total_generated: u64,
    pub average_embedding_ms: f64,
    pub cache_hits: u64,
    pub fallbacks: u64,
    pub budget_overruns: u64,
    pub model_loads: u64,
    pub last_model_load_ms: Option<u64>,
    /// Highest projected usage seen by a batch memory check
    pub peak_batch_memory_bytes: u64,
}

/// Description of the active model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub dimension: usize,
    pub max_tokens: usize,
    pub mode: DeploymentMode,
    pub model_loaded: bool,
}
