//! Embedding generator
//!
//! Wraps the selected strategy with preprocessing, the per-item latency
//! budget, domain post-processing, caching and memory-bounded batching.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::metrics::{EmbeddingCounters, ModelInfo, PerformanceMetrics};
use super::mock::{apply_domain_bias, l2_normalize_in_place};
use super::model::ModelLoader;
use super::preprocess::prepare;
use super::strategy::{select_strategy, DeploymentMode, EmbeddingSource, EmbeddingStrategy, ModePreference};
use crate::error::{GraphRagError, Result};
use crate::memory::{MemoryMonitor, MemorySampler, PressureLevel, MIB};
use crate::record::{EmbeddingDomain, EMBEDDING_DIMENSION, MAX_TOKEN_LENGTH};

/// Embedding generator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: ModePreference,
    /// Directory name used by model discovery
    pub model_name: String,
    pub model_path: Option<PathBuf>,
    pub idle_unload_secs: u64,
    /// Wall-clock budget for one embedding
    pub embedding_budget_ms: u64,
    pub sub_batch_size: usize,
    /// Batch generation fails rather than exceed this
    pub memory_ceiling_mb: u64,
    /// Cached vectors; 0 disables the cache
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: ModePreference::Auto,
            model_name: "bge-base-en-v1.5".to_string(),
            model_path: None,
            idle_unload_secs: 300,
            embedding_budget_ms: 2000,
            sub_batch_size: 50,
            memory_ceiling_mb: 800,
            cache_capacity: 1024,
        }
    }
}

impl EmbeddingConfig {
    pub fn idle_unload(&self) -> Duration {
        Duration::from_secs(self.idle_unload_secs)
    }

    pub fn embedding_budget(&self) -> Duration {
        Duration::from_millis(self.embedding_budget_ms)
    }

    pub fn memory_ceiling_bytes(&self) -> u64 {
        self.memory_ceiling_mb * MIB
    }

    pub fn validate(&self) -> Result<()> {
        if self.sub_batch_size == 0 {
            return Err(GraphRagError::configuration("sub_batch_size must be positive"));
        }
        if self.embedding_budget_ms == 0 {
            return Err(GraphRagError::configuration("embedding_budget_ms must be positive"));
        }
        if self.memory_ceiling_mb == 0 {
            return Err(GraphRagError::configuration("memory_ceiling_mb must be positive"));
        }
        Ok(())
    }
}

/// Working-set bytes charged per item; larger batches amortize more
pub fn per_item_cost(batch_len: usize) -> u64 {
    match batch_len {
        0..=100 => 2 * MIB,
        101..=500 => MIB,
        _ => MIB / 2,
    }
}

/// Bytes a finished vector keeps alive until the batch returns
const VECTOR_BYTES: u64 = (EMBEDDING_DIMENSION * std::mem::size_of::<f32>()) as u64;

/// Memory accounted with the sampler for as long as this lives
struct Reservation {
    sampler: Arc<dyn MemorySampler>,
    bytes: u64,
}

impl Reservation {
    fn new(sampler: Arc<dyn MemorySampler>, bytes: u64) -> Self {
        sampler.reserve(bytes);
        Self { sampler, bytes }
    }

    fn grow(&mut self, bytes: u64) {
        self.sampler.reserve(bytes);
        self.bytes += bytes;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.sampler.release(self.bytes);
    }
}

type CacheKey = (EmbeddingDomain, String);

/// Text-to-vector service shared by ingestion and search
pub struct EmbeddingGenerator {
    strategy: Arc<dyn EmbeddingStrategy>,
    monitor: Arc<MemoryMonitor>,
    config: EmbeddingConfig,
    cache: Option<Mutex<LruCache<CacheKey, Vec<f32>>>>,
    counters: EmbeddingCounters,
}

impl EmbeddingGenerator {
    /// Select a strategy from configuration and on-disk model availability
    pub fn new(config: EmbeddingConfig, monitor: Arc<MemoryMonitor>) -> Result<Self> {
        config.validate()?;
        let strategy = select_strategy(&config, None)?;
        Self::with_strategy(config, monitor, strategy)
    }

    /// Like `new`, but loading models through `loader` instead of discovery
    pub fn with_loader(
        config: EmbeddingConfig,
        monitor: Arc<MemoryMonitor>,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<Self> {
        config.validate()?;
        let strategy = select_strategy(&config, Some(loader))?;
        Self::with_strategy(config, monitor, strategy)
    }

    /// Build around an already chosen strategy
    ///
    /// # Errors
    /// Returns `Configuration` when `config` does not validate.
    pub fn with_strategy(
        config: EmbeddingConfig,
        monitor: Arc<MemoryMonitor>,
        strategy: Arc<dyn EmbeddingStrategy>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = NonZeroUsize::new(config.cache_capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Ok(Self {
            strategy,
            monitor,
            config,
            cache,
            counters: EmbeddingCounters::default(),
        })
    }

    pub fn mode(&self) -> DeploymentMode {
        self.strategy.mode()
    }

    pub fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn is_model_loaded(&self) -> bool {
        self.strategy.is_model_loaded()
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.strategy.model_name().to_string(),
            dimension: EMBEDDING_DIMENSION,
            max_tokens: MAX_TOKEN_LENGTH,
            mode: self.mode(),
            model_loaded: self.is_model_loaded(),
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.counters.snapshot(self.strategy.load_stats())
    }

    pub fn cache_size(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.lock().len())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    /// Shed memory for the given pressure level
    pub fn relieve_memory_pressure(&self, level: PressureLevel) {
        if level >= PressureLevel::High && self.cache_size() > 0 {
            log::info!("Clearing embedding cache under {} memory pressure", level);
            self.clear_cache();
        }
        if level >= PressureLevel::Critical && self.strategy.is_model_loaded() {
            self.strategy.release_model();
        }
    }

    /// Embed one text for a domain.
    ///
    /// The result always has `EMBEDDING_DIMENSION` entries and unit
    /// length. Exceeding the latency budget yields `BudgetExceeded`.
    pub async fn generate_embedding(&self, text: &str, domain: EmbeddingDomain) -> Result<Vec<f32>> {
        let prepared = prepare(text);
        let key = (domain, prepared.text.clone());

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(&key) {
                self.counters.record_cache_hit();
                return Ok(hit.clone());
            }
        }

        let admitted = match self.strategy.mode() {
            DeploymentMode::MockOnly => true,
            _ => {
                let status = self.monitor.latest();
                if status.pressure_level >= PressureLevel::High {
                    self.relieve_memory_pressure(status.pressure_level);
                }
                status.can_perform_inference
            }
        };

        let started = Instant::now();
        let budget = self.config.embedding_budget();
        let strategy = self.strategy.clone();
        let job = tokio::task::spawn_blocking(move || strategy.embed(&prepared, admitted));

        let raw = match tokio::time::timeout(budget, job).await {
            Err(_) => {
                self.counters.record_budget_overrun();
                log::warn!(
                    "Embedding exceeded its {}ms budget ({})",
                    self.config.embedding_budget_ms,
                    domain
                );
                return Err(GraphRagError::BudgetExceeded {
                    budget_ms: self.config.embedding_budget_ms,
                });
            }
            Ok(Err(join_error)) => {
                return Err(GraphRagError::embedding(format!(
                    "embedding task failed: {join_error}"
                )))
            }
            Ok(Ok(result)) => result?,
        };

        let vector = finalize(raw.vector, domain)?;
        self.counters.record_generated(started.elapsed());

        match raw.source {
            EmbeddingSource::MockFallback => self.counters.record_fallback(),
            EmbeddingSource::Mock | EmbeddingSource::Model => {
                if let Some(cache) = &self.cache {
                    cache.lock().put(key, vector.clone());
                }
            }
        }

        Ok(vector)
    }

    /// Embed many texts, preserving input order
    pub async fn generate_batch<S>(&self, texts: &[S], domain: EmbeddingDomain) -> Result<Vec<Vec<f32>>>
    where
        S: AsRef<str> + Sync,
    {
        self.generate_batch_cancellable(texts, domain, &CancellationToken::new())
            .await
    }

    /// Embed many texts in sub-batches.
    ///
    /// Before each sub-batch the projected memory (current usage plus the
    /// sub-batch working set) is checked against the ceiling; breaching it
    /// fails the whole call. Cancellation is honoured between sub-batches.
    /// A failing item aborts the batch and reports its index.
    pub async fn generate_batch_cancellable<S>(
        &self,
        texts: &[S],
        domain: EmbeddingDomain,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>>
    where
        S: AsRef<str> + Sync,
    {
        let mut output = Vec::with_capacity(texts.len());
        self.generate_batch_with(texts, domain, cancel, |_, vectors| {
            output.extend(vectors);
            Ok(())
        })
        .await?;
        Ok(output)
    }

    /// Embed `texts` in sub-batches, handing each finished sub-batch to
    /// `sink` with the index of its first item.
    ///
    /// The per-item cost tier is chosen from the full length of `texts`,
    /// so a caller that persists as it goes still gets the large-batch
    /// rate. Sub-batches already passed to `sink` are not revisited when a
    /// later one fails or the token is cancelled. An error from `sink`
    /// aborts the batch unchanged.
    pub async fn generate_batch_with<S, F>(
        &self,
        texts: &[S],
        domain: EmbeddingDomain,
        cancel: &CancellationToken,
        mut sink: F,
    ) -> Result<()>
    where
        S: AsRef<str> + Sync,
        F: FnMut(usize, Vec<Vec<f32>>) -> Result<()>,
    {
        if texts.is_empty() {
            return Ok(());
        }

        let total = texts.len();
        let sub_batch = self.config.sub_batch_size;
        let ceiling = self.config.memory_ceiling_bytes();
        let item_cost = per_item_cost(total);
        let sampler = self.monitor.sampler().clone();

        let mut completed = 0;
        let mut retained = Reservation::new(sampler.clone(), 0);

        for (chunk_no, chunk) in texts.chunks(sub_batch).enumerate() {
            if cancel.is_cancelled() {
                log::info!("Batch cancelled after {}/{} embeddings", completed, total);
                return Err(GraphRagError::Cancelled { completed });
            }

            let status = self.monitor.current_status();
            if self.strategy.mode() == DeploymentMode::RealOnly && !status.can_perform_inference {
                return Err(GraphRagError::InferenceNotAdmitted(format!(
                    "{} memory pressure at {}/{} embeddings",
                    status.pressure_level, completed, total
                )));
            }

            let chunk_cost = item_cost * chunk.len() as u64;
            let projected = status.process_memory + chunk_cost;
            self.counters.observe_batch_memory(projected);
            if projected > ceiling {
                log::warn!(
                    "Batch aborted at {}/{}: projected {}MB exceeds {}MB ceiling",
                    completed,
                    total,
                    projected / MIB,
                    ceiling / MIB
                );
                return Err(GraphRagError::MemoryLimitExceeded {
                    projected_bytes: projected,
                    ceiling_bytes: ceiling,
                });
            }

            let first = chunk_no * sub_batch;
            let working_set = Reservation::new(sampler.clone(), chunk_cost);
            let mut vectors = Vec::with_capacity(chunk.len());
            for (offset, text) in chunk.iter().enumerate() {
                let index = first + offset;
                let vector = self
                    .generate_embedding(text.as_ref(), domain)
                    .await
                    .map_err(|e| GraphRagError::batch_item(index, e))?;
                vectors.push(vector);
                retained.grow(VECTOR_BYTES);

                if (index + 1) % 10 == 0 {
                    log::debug!("Generated {}/{} {} embeddings", index + 1, total, domain);
                }
            }
            drop(working_set);

            completed += vectors.len();
            sink(first, vectors)?;

            tokio::task::yield_now().await;
        }

        Ok(())
    }
}

/// Validate strategy output and apply the domain bias
fn finalize(mut vector: Vec<f32>, domain: EmbeddingDomain) -> Result<Vec<f32>> {
    if vector.len() != EMBEDDING_DIMENSION {
        return Err(GraphRagError::DimensionMismatch {
            expected: EMBEDDING_DIMENSION,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(GraphRagError::InvalidEmbedding(
            "non-finite values in model output".to_string(),
        ));
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return Err(GraphRagError::InvalidEmbedding(
            "zero-magnitude model output".to_string(),
        ));
    }

    l2_normalize_in_place(&mut vector);
    apply_domain_bias(&mut vector, domain);
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::strategy::tests::FakeLoader;
    use crate::embedding::preprocess::PreparedText;
    use crate::embedding::strategy::{LazyHybridStrategy, MockStrategy, RawEmbedding};
    use crate::error::ErrorKind;
    use crate::memory::{MonitorConfig, SimulatedSampler};

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    fn simulated_monitor(baseline_mb: u64) -> (Arc<SimulatedSampler>, Arc<MemoryMonitor>) {
        let sampler = Arc::new(SimulatedSampler::new(8192 * MIB, baseline_mb * MIB));
        let monitor = Arc::new(MemoryMonitor::new(sampler.clone(), MonitorConfig::default()));
        (sampler, monitor)
    }

    fn mock_generator() -> EmbeddingGenerator {
        let (_, monitor) = simulated_monitor(200);
        EmbeddingGenerator::with_strategy(EmbeddingConfig::default(), monitor, Arc::new(MockStrategy))
            .unwrap()
    }

    #[tokio::test]
    async fn test_embeddings_are_unit_length() {
        let generator = mock_generator();
        let long = "regulation ".repeat(2000);
        for text in ["", "   ", "FAR 15.404 proposal analysis", long.as_str()] {
            for domain in EmbeddingDomain::ALL {
                let v = generator.generate_embedding(text, domain).await.unwrap();
                assert_eq!(v.len(), EMBEDDING_DIMENSION);
                assert!((norm(&v) - 1.0).abs() < 1e-4);
            }
        }
    }

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let a = mock_generator()
            .generate_embedding("x", EmbeddingDomain::Regulations)
            .await
            .unwrap();
        let b = mock_generator()
            .generate_embedding("x", EmbeddingDomain::Regulations)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_domains_are_separated() {
        let generator = mock_generator();
        let regulations = generator
            .generate_embedding("x", EmbeddingDomain::Regulations)
            .await
            .unwrap();
        let records = generator
            .generate_embedding("x", EmbeddingDomain::UserRecords)
            .await
            .unwrap();
        assert_ne!(regulations, records);
    }

    #[tokio::test]
    async fn test_cache_serves_repeats() {
        let generator = mock_generator();
        generator
            .generate_embedding(" contract ", EmbeddingDomain::Regulations)
            .await
            .unwrap();
        generator
            .generate_embedding("contract", EmbeddingDomain::Regulations)
            .await
            .unwrap();

        let metrics = generator.metrics();
        assert_eq!(metrics.total_generated, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(generator.cache_size(), 1);

        generator.relieve_memory_pressure(PressureLevel::High);
        assert_eq!(generator.cache_size(), 0);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let generator = mock_generator();
        let texts: Vec<String> = (0..120).map(|i| format!("workflow step {i}")).collect();
        let batch = generator
            .generate_batch(&texts, EmbeddingDomain::UserRecords)
            .await
            .unwrap();
        assert_eq!(batch.len(), texts.len());

        for i in [0, 49, 50, 119] {
            let single = generator
                .generate_embedding(&texts[i], EmbeddingDomain::UserRecords)
                .await
                .unwrap();
            assert_eq!(batch[i], single);
        }
    }

    #[tokio::test]
    async fn test_batch_memory_stays_under_ceiling() {
        let (sampler, monitor) = simulated_monitor(200);
        let generator =
            EmbeddingGenerator::with_strategy(EmbeddingConfig::default(), monitor, Arc::new(MockStrategy))
                .unwrap();

        let texts: Vec<String> = (0..1000)
            .map(|i| format!("synthetic acquisition record number {i} for testing"))
            .collect();
        let vectors = generator
            .generate_batch(&texts, EmbeddingDomain::Regulations)
            .await
            .unwrap();

        assert_eq!(vectors.len(), 1000);
        let overhead_allowance = 50 * MIB;
        assert!(sampler.peak_bytes() <= 800 * MIB + overhead_allowance);
        // Everything reserved during the batch is given back
        assert_eq!(sampler.reserved_bytes(), 0);
        assert!(generator.metrics().peak_batch_memory_bytes <= 800 * MIB);
    }

    #[tokio::test]
    async fn test_batch_fails_when_ceiling_would_be_breached() {
        let (sampler, monitor) = simulated_monitor(790);
        let generator =
            EmbeddingGenerator::with_strategy(EmbeddingConfig::default(), monitor, Arc::new(MockStrategy))
                .unwrap();

        let texts: Vec<String> = (0..200).map(|i| format!("text {i}")).collect();
        let err = generator
            .generate_batch(&texts, EmbeddingDomain::Regulations)
            .await
            .unwrap_err();

        assert!(matches!(err, GraphRagError::MemoryLimitExceeded { .. }));
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert_eq!(sampler.reserved_bytes(), 0);
    }

    #[tokio::test]
    async fn test_batch_honours_cancellation() {
        let generator = mock_generator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let texts = vec!["a".to_string(); 10];
        let err = generator
            .generate_batch_cancellable(&texts, EmbeddingDomain::Regulations, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphRagError::Cancelled { completed: 0 }));
    }

    /// Mock embeddings that cancel `token` when `trigger` is embedded
    struct CancelOnText {
        trigger: String,
        token: CancellationToken,
    }

    impl EmbeddingStrategy for CancelOnText {
        fn mode(&self) -> DeploymentMode {
            DeploymentMode::MockOnly
        }

        fn embed(&self, prepared: &PreparedText, admitted: bool) -> Result<RawEmbedding> {
            if prepared.text == self.trigger {
                self.token.cancel();
            }
            MockStrategy.embed(prepared, admitted)
        }

        fn model_name(&self) -> &str {
            "cancel-on-text"
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_sub_batches() {
        let (sampler, monitor) = simulated_monitor(200);
        let cancel = CancellationToken::new();
        let strategy = Arc::new(CancelOnText {
            trigger: "text 7".to_string(),
            token: cancel.clone(),
        });
        let config = EmbeddingConfig {
            sub_batch_size: 5,
            ..Default::default()
        };
        let generator = EmbeddingGenerator::with_strategy(config, monitor, strategy).unwrap();

        let texts: Vec<String> = (0..12).map(|i| format!("text {i}")).collect();
        let mut delivered = Vec::new();
        let err = generator
            .generate_batch_with(&texts, EmbeddingDomain::UserRecords, &cancel, |first, vectors| {
                delivered.push((first, vectors.len()));
                Ok(())
            })
            .await
            .unwrap_err();

        // Item 7 sits in the second sub-batch, which still runs to the end
        assert!(matches!(err, GraphRagError::Cancelled { completed: 10 }));
        assert_eq!(delivered, vec![(0, 5), (5, 5)]);
        assert_eq!(sampler.reserved_bytes(), 0);
    }

    #[tokio::test]
    async fn test_sink_batches_use_full_length_cost() {
        // 760MB baseline: a 50-item sub-batch costed at the small-batch
        // rate would breach the 800MB ceiling, at the 1000-item rate it fits
        let (_, monitor) = simulated_monitor(760);
        let generator =
            EmbeddingGenerator::with_strategy(EmbeddingConfig::default(), monitor, Arc::new(MockStrategy))
                .unwrap();

        let texts: Vec<String> = (0..1000).map(|i| format!("record {i}")).collect();
        let mut stored = 0;
        generator
            .generate_batch_with(&texts, EmbeddingDomain::UserRecords, &CancellationToken::new(), |_, vectors| {
                stored += vectors.len();
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(stored, 1000);
    }

    #[tokio::test]
    async fn test_sink_error_aborts_batch() {
        let generator = mock_generator();
        let texts = vec!["a", "b", "c"];
        let err = generator
            .generate_batch_with(&texts, EmbeddingDomain::Regulations, &CancellationToken::new(), |_, _| {
                Err(GraphRagError::batch_item(1, GraphRagError::embedding("store failed")))
            })
            .await
            .unwrap_err();
        assert_eq!(err.failed_index(), Some(1));
    }

    #[test]
    fn test_zero_sub_batch_size_rejected() {
        let (_, monitor) = simulated_monitor(200);
        let config = EmbeddingConfig {
            sub_batch_size: 0,
            ..Default::default()
        };
        let err = EmbeddingGenerator::with_strategy(config, monitor, Arc::new(MockStrategy))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_reports_item_index() {
        let (_, monitor) = simulated_monitor(200);
        let loader = FakeLoader {
            dimension: 384,
            ..FakeLoader::working()
        };
        let strategy = Arc::new(LazyHybridStrategy::new(
            Arc::new(loader),
            "fake",
            Duration::from_secs(300),
        ));
        let generator =
            EmbeddingGenerator::with_strategy(EmbeddingConfig::default(), monitor, strategy).unwrap();

        let err = generator
            .generate_batch(&["first", "second"], EmbeddingDomain::Regulations)
            .await
            .unwrap_err();
        assert_eq!(err.failed_index(), Some(0));
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[tokio::test]
    async fn test_budget_overrun_is_reported() {
        let (_, monitor) = simulated_monitor(200);
        let loader = FakeLoader {
            delay: Duration::from_millis(300),
            ..FakeLoader::working()
        };
        let config = EmbeddingConfig {
            embedding_budget_ms: 50,
            ..Default::default()
        };
        let generator = EmbeddingGenerator::with_loader(config, monitor, Arc::new(loader)).unwrap();
        assert_eq!(generator.mode(), DeploymentMode::LazyHybrid);

        let err = generator
            .generate_embedding("slow text", EmbeddingDomain::UserRecords)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphRagError::BudgetExceeded { budget_ms: 50 }));
        assert!(err.is_retryable());
        assert_eq!(generator.metrics().budget_overruns, 1);
    }

    #[tokio::test]
    async fn test_lazy_hybrid_fallback_matches_mock() {
        let (_, monitor) = simulated_monitor(200);
        let generator =
            EmbeddingGenerator::with_loader(EmbeddingConfig::default(), monitor, Arc::new(FakeLoader::failing()))
                .unwrap();

        let fallback = generator
            .generate_embedding("contract", EmbeddingDomain::Regulations)
            .await
            .unwrap();
        let mock = mock_generator()
            .generate_embedding("contract", EmbeddingDomain::Regulations)
            .await
            .unwrap();

        assert_eq!(fallback, mock);
        assert_eq!(generator.metrics().fallbacks, 1);
        // Fallback vectors are not cached, so the next call retries the model
        assert_eq!(generator.cache_size(), 0);
    }

    #[tokio::test]
    async fn test_critical_pressure_releases_model() {
        let (sampler, monitor) = simulated_monitor(200);
        let generator =
            EmbeddingGenerator::with_loader(EmbeddingConfig::default(), monitor.clone(), Arc::new(FakeLoader::working()))
                .unwrap();

        generator
            .generate_embedding("contract", EmbeddingDomain::Regulations)
            .await
            .unwrap();
        assert!(generator.is_model_loaded());
        assert_eq!(generator.model_info().mode, DeploymentMode::LazyHybrid);

        sampler.set_baseline(8000 * MIB);
        monitor.current_status();
        generator
            .generate_embedding("award", EmbeddingDomain::Regulations)
            .await
            .unwrap();
        assert!(!generator.is_model_loaded());
        assert_eq!(generator.metrics().fallbacks, 1);
    }

    #[test]
    fn test_per_item_cost_amortizes() {
        assert!(per_item_cost(50) > per_item_cost(300));
        assert!(per_item_cost(300) > per_item_cost(1000));
    }

    #[test]
    fn test_finalize_rejects_bad_vectors() {
        let err = finalize(vec![0.5; 3], EmbeddingDomain::Regulations).unwrap_err();
        assert!(matches!(err, GraphRagError::DimensionMismatch { expected: 768, actual: 3 }));

        let err = finalize(vec![0.0; EMBEDDING_DIMENSION], EmbeddingDomain::Regulations).unwrap_err();
        assert!(matches!(err, GraphRagError::InvalidEmbedding(_)));

        let mut nan = vec![0.1; EMBEDDING_DIMENSION];
        nan[5] = f32::NAN;
        assert!(finalize(nan, EmbeddingDomain::UserRecords).is_err());
    }
}
