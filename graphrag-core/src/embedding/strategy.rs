//! Generation strategies
//!
//! One strategy is chosen when the generator is built and never changes:
//!
//! - `MockStrategy`: deterministic hashed embeddings, no model
//! - `LazyHybridStrategy`: loads the model on first use, unloads it after
//!   an idle window, and falls back to mock when loading fails
//! - `RealOnlyStrategy`: model loaded up front; never falls back

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::discovery::find_model_path;
use super::mock::mock_embedding;
use super::model::{InferenceModel, ModelLoader, OnnxModelLoader};
use super::preprocess::PreparedText;
use super::EmbeddingConfig;
use crate::error::{GraphRagError, Result};

/// Deployment mode, fixed for the life of the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    MockOnly,
    LazyHybrid,
    RealOnly,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MockOnly => "mock-only",
            Self::LazyHybrid => "lazy-hybrid",
            Self::RealOnly => "real-only",
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a raw vector came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    Mock,
    Model,
    /// Mock output served because the model was unavailable
    MockFallback,
}

/// Strategy output before domain post-processing
#[derive(Debug, Clone)]
pub struct RawEmbedding {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
}

/// Model load bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loads: u64,
    pub last_load_ms: Option<u64>,
}

/// A way of turning prepared text into a raw vector
pub trait EmbeddingStrategy: Send + Sync {
    fn mode(&self) -> DeploymentMode;

    /// `admitted` is the memory monitor's inference decision; strategies
    /// that use a model must respect it.
    fn embed(&self, prepared: &PreparedText, admitted: bool) -> Result<RawEmbedding>;

    fn model_name(&self) -> &str;

    fn is_model_loaded(&self) -> bool {
        false
    }

    /// Drop a loaded model to reclaim memory. No-op where not applicable.
    fn release_model(&self) {}

    fn load_stats(&self) -> LoadStats {
        LoadStats::default()
    }
}

/// Deterministic hashed embeddings
#[derive(Debug, Default)]
pub struct MockStrategy;

impl EmbeddingStrategy for MockStrategy {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::MockOnly
    }

    fn embed(&self, prepared: &PreparedText, _admitted: bool) -> Result<RawEmbedding> {
        Ok(RawEmbedding {
            vector: mock_embedding(prepared),
            source: EmbeddingSource::Mock,
        })
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Shared state behind `LazyHybridStrategy`, referenced weakly by the
/// idle-unload timer.
struct LazyModel {
    loader: Arc<dyn ModelLoader>,
    name: String,
    idle_unload: Duration,
    slot: Mutex<Option<Arc<dyn InferenceModel>>>,
    // Held across the load itself, so concurrent first requests load once
    // while readers of `slot` are never blocked behind a load
    load_lock: Mutex<()>,
    unload_timer: Mutex<Option<JoinHandle<()>>>,
    stats: Mutex<LoadStats>,
    load_failing: AtomicBool,
}

impl LazyModel {
    fn ensure_loaded(&self) -> Result<Arc<dyn InferenceModel>> {
        if let Some(model) = self.slot.lock().clone() {
            return Ok(model);
        }

        let _loading = self.load_lock.lock();
        if let Some(model) = self.slot.lock().clone() {
            return Ok(model);
        }

        let started = Instant::now();
        let model = self.loader.load()?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.lock();
            stats.loads += 1;
            stats.last_load_ms = Some(elapsed_ms);
        }
        if self.load_failing.swap(false, Ordering::Relaxed) {
            log::info!("Embedding model available again");
        }
        log::info!(
            "Loaded embedding model {} from {} in {}ms",
            self.name,
            self.loader.describe(),
            elapsed_ms
        );

        *self.slot.lock() = Some(model.clone());
        Ok(model)
    }

    fn unload(&self, reason: &str) {
        if self.slot.lock().take().is_some() {
            log::info!("Unloaded embedding model {} ({})", self.name, reason);
        }
    }

    fn cancel_pending_unload(&self) {
        if let Some(timer) = self.unload_timer.lock().take() {
            timer.abort();
        }
    }

    fn schedule_unload(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("No async runtime; idle unload not scheduled");
            return;
        };

        let model: Weak<Self> = Arc::downgrade(self);
        let idle = self.idle_unload;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            if let Some(model) = model.upgrade() {
                model.unload("idle timeout");
            }
        });

        if let Some(previous) = self.unload_timer.lock().replace(timer) {
            previous.abort();
        }
    }
}

/// Loads the model on first use and releases it when idle
pub struct LazyHybridStrategy {
    inner: Arc<LazyModel>,
}

impl LazyHybridStrategy {
    pub fn new(loader: Arc<dyn ModelLoader>, name: impl Into<String>, idle_unload: Duration) -> Self {
        Self {
            inner: Arc::new(LazyModel {
                loader,
                name: name.into(),
                idle_unload,
                slot: Mutex::new(None),
                load_lock: Mutex::new(()),
                unload_timer: Mutex::new(None),
                stats: Mutex::new(LoadStats::default()),
                load_failing: AtomicBool::new(false),
            }),
        }
    }

    fn fallback(prepared: &PreparedText) -> RawEmbedding {
        RawEmbedding {
            vector: mock_embedding(prepared),
            source: EmbeddingSource::MockFallback,
        }
    }
}

impl EmbeddingStrategy for LazyHybridStrategy {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::LazyHybrid
    }

    fn embed(&self, prepared: &PreparedText, admitted: bool) -> Result<RawEmbedding> {
        self.inner.cancel_pending_unload();

        if !admitted {
            self.inner.unload("memory pressure");
            log::debug!("Inference not admitted, serving mock embedding");
            return Ok(Self::fallback(prepared));
        }

        let model = match self.inner.ensure_loaded() {
            Ok(model) => model,
            Err(e) => {
                if !self.inner.load_failing.swap(true, Ordering::Relaxed) {
                    log::warn!("Embedding model load failed, using mock embeddings: {}", e);
                } else {
                    log::debug!("Embedding model still unavailable: {}", e);
                }
                return Ok(Self::fallback(prepared));
            }
        };

        let result = model.embed(&prepared.text);
        self.inner.schedule_unload();

        Ok(RawEmbedding {
            vector: result?,
            source: EmbeddingSource::Model,
        })
    }

    fn model_name(&self) -> &str {
        &self.inner.name
    }

    fn is_model_loaded(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    fn release_model(&self) {
        self.inner.cancel_pending_unload();
        self.inner.unload("released");
    }

    fn load_stats(&self) -> LoadStats {
        *self.inner.stats.lock()
    }
}

impl Drop for LazyHybridStrategy {
    fn drop(&mut self) {
        self.inner.cancel_pending_unload();
    }
}

/// Always uses the model; loading happens at construction
pub struct RealOnlyStrategy {
    model: Arc<dyn InferenceModel>,
    name: String,
    stats: LoadStats,
}

impl RealOnlyStrategy {
    /// Load the model now. Failure is a configuration error.
    pub fn load(loader: &dyn ModelLoader, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let started = Instant::now();
        let model = loader.load().map_err(|e| {
            GraphRagError::configuration(format!("real-only mode requires a loadable model: {e}"))
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        log::info!("Loaded embedding model {} in {}ms (real-only)", name, elapsed_ms);

        Ok(Self {
            model,
            name,
            stats: LoadStats {
                loads: 1,
                last_load_ms: Some(elapsed_ms),
            },
        })
    }
}

impl EmbeddingStrategy for RealOnlyStrategy {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::RealOnly
    }

    fn embed(&self, prepared: &PreparedText, admitted: bool) -> Result<RawEmbedding> {
        if !admitted {
            return Err(GraphRagError::InferenceNotAdmitted(
                "real-only mode cannot fall back".to_string(),
            ));
        }
        Ok(RawEmbedding {
            vector: self.model.embed(&prepared.text)?,
            source: EmbeddingSource::Model,
        })
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn is_model_loaded(&self) -> bool {
        true
    }

    fn load_stats(&self) -> LoadStats {
        self.stats
    }
}

/// Requested mode in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModePreference {
    /// Lazy-hybrid when a model is resolvable, mock otherwise
    #[default]
    Auto,
    /// Never use a model
    Mock,
    /// Model required
    RealOnly,
}

impl std::str::FromStr for ModePreference {
    type Err = GraphRagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "lazy-hybrid" | "lazy_hybrid" => Ok(Self::Auto),
            "mock" | "mock-only" | "mock_only" => Ok(Self::Mock),
            "real-only" | "real_only" | "real" => Ok(Self::RealOnly),
            other => Err(GraphRagError::configuration(format!(
                "unknown embedding mode '{other}' (expected auto, mock or real-only)"
            ))),
        }
    }
}

/// Pick the strategy for this process.
///
/// `loader` replaces model discovery when given.
pub fn select_strategy(
    config: &EmbeddingConfig,
    loader: Option<Arc<dyn ModelLoader>>,
) -> Result<Arc<dyn EmbeddingStrategy>> {
    if config.mode == ModePreference::Mock {
        log::info!("Embedding mode: mock-only (real inference disabled)");
        return Ok(Arc::new(MockStrategy));
    }

    let loader = match loader {
        Some(loader) => loader,
        None => match find_model_path(config.model_path.as_deref(), &config.model_name) {
            Ok(path) => Arc::new(OnnxModelLoader::new(path, config.model_name.clone())),
            Err(e) if config.mode == ModePreference::RealOnly => {
                return Err(GraphRagError::configuration(format!(
                    "real-only mode but no model is resolvable: {e}"
                )));
            }
            Err(_) => {
                log::info!("Embedding mode: mock-only (no model artifact found)");
                return Ok(Arc::new(MockStrategy));
            }
        },
    };

    if config.mode == ModePreference::RealOnly {
        let strategy = RealOnlyStrategy::load(loader.as_ref(), config.model_name.clone())?;
        log::info!("Embedding mode: real-only");
        return Ok(Arc::new(strategy));
    }

    log::info!(
        "Embedding mode: lazy-hybrid ({}, idle unload {}s)",
        loader.describe(),
        config.idle_unload_secs
    );
    Ok(Arc::new(LazyHybridStrategy::new(
        loader,
        config.model_name.clone(),
        config.idle_unload(),
    )))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embedding::preprocess::prepare;
    use crate::record::EMBEDDING_DIMENSION;
    use std::sync::atomic::AtomicU64;

    /// Model that echoes a deterministic vector, optionally slowly or
    /// with the wrong dimension.
    pub(crate) struct FakeModel {
        pub dimension: usize,
        pub delay: Duration,
    }

    impl InferenceModel for FakeModel {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let mut v = mock_embedding(&prepare(&format!("model {text}")));
            v.resize(self.dimension, 0.01);
            Ok(v)
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Loader counting its calls; fails when `fail` is set
    pub(crate) struct FakeLoader {
        pub fail: bool,
        pub dimension: usize,
        pub delay: Duration,
        pub load_delay: Duration,
        pub calls: AtomicU64,
    }

    impl FakeLoader {
        pub(crate) fn working() -> Self {
            Self {
                fail: false,
                dimension: EMBEDDING_DIMENSION,
                delay: Duration::ZERO,
                load_delay: Duration::ZERO,
                calls: AtomicU64::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::working()
            }
        }
    }

    impl ModelLoader for FakeLoader {
        fn load(&self) -> Result<Arc<dyn InferenceModel>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.load_delay.is_zero() {
                std::thread::sleep(self.load_delay);
            }
            if self.fail {
                return Err(GraphRagError::model("fake model missing"));
            }
            Ok(Arc::new(FakeModel {
                dimension: self.dimension,
                delay: self.delay,
            }))
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    #[test]
    fn test_mode_preference_parse() {
        assert_eq!("auto".parse::<ModePreference>().unwrap(), ModePreference::Auto);
        assert_eq!("MOCK".parse::<ModePreference>().unwrap(), ModePreference::Mock);
        assert_eq!(
            "real-only".parse::<ModePreference>().unwrap(),
            ModePreference::RealOnly
        );
        assert!("turbo".parse::<ModePreference>().is_err());
    }

    #[test]
    fn test_select_mock_when_disabled() {
        let config = EmbeddingConfig {
            mode: ModePreference::Mock,
            ..Default::default()
        };
        let strategy = select_strategy(&config, Some(Arc::new(FakeLoader::working()))).unwrap();
        assert_eq!(strategy.mode(), DeploymentMode::MockOnly);
    }

    #[test]
    fn test_select_lazy_hybrid_with_loader() {
        let loader = Arc::new(FakeLoader::working());
        let strategy = select_strategy(&EmbeddingConfig::default(), Some(loader.clone())).unwrap();
        assert_eq!(strategy.mode(), DeploymentMode::LazyHybrid);
        // Nothing is loaded until first use
        assert!(!strategy.is_model_loaded());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_real_only_fails_hard() {
        let config = EmbeddingConfig {
            mode: ModePreference::RealOnly,
            ..Default::default()
        };
        let err = select_strategy(&config, Some(Arc::new(FakeLoader::failing())))
            .err()
            .unwrap();
        assert!(matches!(err, GraphRagError::Configuration(_)));
    }

    #[test]
    fn test_real_only_refuses_without_admission() {
        let strategy = RealOnlyStrategy::load(&FakeLoader::working(), "fake").unwrap();
        let err = strategy.embed(&prepare("x"), false).unwrap_err();
        assert!(matches!(err, GraphRagError::InferenceNotAdmitted(_)));
        assert_eq!(strategy.embed(&prepare("x"), true).unwrap().source, EmbeddingSource::Model);
    }

    #[test]
    fn test_lazy_hybrid_falls_back_on_load_failure() {
        let loader = Arc::new(FakeLoader::failing());
        let strategy = LazyHybridStrategy::new(loader.clone(), "fake", Duration::from_secs(300));

        let raw = strategy.embed(&prepare("contract"), true).unwrap();
        assert_eq!(raw.source, EmbeddingSource::MockFallback);
        assert_eq!(raw.vector, mock_embedding(&prepare("contract")));
        assert!(!strategy.is_model_loaded());

        // Every request retries the load
        strategy.embed(&prepare("contract"), true).unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lazy_hybrid_loads_once() {
        let loader = Arc::new(FakeLoader::working());
        let strategy = LazyHybridStrategy::new(loader.clone(), "fake", Duration::from_secs(300));

        for _ in 0..3 {
            let raw = strategy.embed(&prepare("contract"), true).unwrap();
            assert_eq!(raw.source, EmbeddingSource::Model);
        }
        assert!(strategy.is_model_loaded());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.load_stats().loads, 1);

        strategy.release_model();
        assert!(!strategy.is_model_loaded());
    }

    #[test]
    fn test_loaded_check_does_not_wait_for_load() {
        let loader = Arc::new(FakeLoader {
            load_delay: Duration::from_millis(500),
            ..FakeLoader::working()
        });
        let strategy = Arc::new(LazyHybridStrategy::new(loader, "fake", Duration::from_secs(300)));

        let loading = {
            let strategy = strategy.clone();
            std::thread::spawn(move || strategy.embed(&prepare("contract"), true))
        };
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        assert!(!strategy.is_model_loaded());
        strategy.release_model();
        assert!(started.elapsed() < Duration::from_millis(250));

        let raw = loading.join().unwrap().unwrap();
        assert_eq!(raw.source, EmbeddingSource::Model);
        assert!(strategy.is_model_loaded());
    }

    #[test]
    fn test_lazy_hybrid_unloads_when_not_admitted() {
        let strategy =
            LazyHybridStrategy::new(Arc::new(FakeLoader::working()), "fake", Duration::from_secs(300));
        strategy.embed(&prepare("x"), true).unwrap();
        assert!(strategy.is_model_loaded());

        let raw = strategy.embed(&prepare("x"), false).unwrap();
        assert_eq!(raw.source, EmbeddingSource::MockFallback);
        assert!(!strategy.is_model_loaded());
    }

    #[tokio::test]
    async fn test_idle_unload_and_reset() {
        let loader = Arc::new(FakeLoader::working());
        let strategy = LazyHybridStrategy::new(loader.clone(), "fake", Duration::from_millis(200));

        strategy.embed(&prepare("a"), true).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        // A new request cancels the pending unload and restarts the window
        strategy.embed(&prepare("b"), true).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(strategy.is_model_loaded());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!strategy.is_model_loaded());

        // Next request reloads
        strategy.embed(&prepare("c"), true).unwrap();
        assert!(strategy.is_model_loaded());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }
}
