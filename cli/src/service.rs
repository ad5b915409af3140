//! Retrieval service for the application layer
//!
//! Builds the engine components once and hands out shared references.
//! Every operation fails with "Vector store not initialized" until
//! `initialize` has completed.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use graphrag_core::{
    EmbeddingGenerator, EngineConfig, GraphRagError, IndexStats, IngestReport, Ingestor,
    MemoryMonitor, MemorySampler, MemoryStatus, ModelInfo, PerformanceMetrics, Result,
    SearchDomain, SearchResult, SystemSampler, UnifiedSearch, UserSearchContext, VectorIndex,
    WorkflowStep,
};

use crate::feeds::RegulationDocument;

/// The wired engine components
pub struct Engine {
    pub monitor: Arc<MemoryMonitor>,
    pub generator: Arc<EmbeddingGenerator>,
    pub index: Arc<VectorIndex>,
    pub search: UnifiedSearch,
    pub ingestor: Ingestor,
}

/// Ranked results, or no results and the reason
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    fn from_result(result: Result<Vec<SearchResult>>) -> Self {
        match result {
            Ok(results) => Self {
                results,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Search failed: {}", e);
                Self {
                    results: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot of engine health for `graphrag status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub memory: MemoryStatus,
    pub model: ModelInfo,
    pub metrics: PerformanceMetrics,
    pub index: IndexStats,
}

/// Composition root for the retrieval engine
pub struct RetrievalService {
    engine: Arc<RwLock<Option<Arc<Engine>>>>,
    config: EngineConfig,
    sampler: Arc<dyn MemorySampler>,
}

impl RetrievalService {
    /// Create a service sampling real process memory
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sampler(config, Arc::new(SystemSampler::new()))
    }

    pub fn with_sampler(config: EngineConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        Self {
            engine: Arc::new(RwLock::new(None)),
            config,
            sampler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the engine, restoring the index from `snapshot` when the
    /// file exists.
    ///
    /// # Errors
    /// Returns error on invalid configuration, a real-only model that
    /// cannot be loaded, or an unreadable snapshot.
    pub async fn initialize(&self, snapshot: Option<&Path>) -> Result<()> {
        self.config.validate()?;

        let monitor = Arc::new(MemoryMonitor::new(
            self.sampler.clone(),
            self.config.monitor.clone(),
        ));
        monitor.start();

        let generator = Arc::new(EmbeddingGenerator::new(
            self.config.embedding.clone(),
            monitor.clone(),
        )?);
        tracing::info!("Embedding mode: {:?}", generator.mode());

        let index = match snapshot.filter(|p| p.exists()) {
            Some(path) => {
                let index = VectorIndex::load_snapshot(path, &self.config.index)?;
                tracing::info!("Restored index from {:?}", path);
                index
            }
            None => VectorIndex::new(&self.config.index),
        };
        let index = Arc::new(index);

        let engine = Engine {
            search: UnifiedSearch::new(generator.clone(), index.clone(), self.config.search.clone()),
            ingestor: Ingestor::new(generator.clone(), index.clone()),
            monitor,
            generator,
            index,
        };

        *self.engine.write().await = Some(Arc::new(engine));
        tracing::info!("Retrieval service initialized");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.engine.read().await.is_some()
    }

    /// Search with an optional domain hint; the router decides otherwise
    pub async fn search(
        &self,
        text: &str,
        hint: Option<SearchDomain>,
        limit: usize,
    ) -> SearchResponse {
        let result = match self.get_engine().await {
            Ok(engine) => engine.search.search_with_hint(text, hint, limit).await,
            Err(e) => Err(e),
        };
        SearchResponse::from_result(result)
    }

    pub async fn search_personalized(
        &self,
        text: &str,
        context: &UserSearchContext,
        limit: usize,
    ) -> SearchResponse {
        let result = match self.get_engine().await {
            Ok(engine) => engine.search.search_personalized(text, context, limit).await,
            Err(e) => Err(e),
        };
        SearchResponse::from_result(result)
    }

    pub async fn record_user_context(&self, context: UserSearchContext) -> Result<()> {
        let engine = self.get_engine().await?;
        engine.search.record_user_context(context);
        Ok(())
    }

    /// Ingest every regulation document, stopping at the first failure or
    /// on cancellation.
    pub async fn ingest_regulations(
        &self,
        documents: &[RegulationDocument],
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let engine = self.get_engine().await?;
        let mut report = IngestReport::default();

        for document in documents {
            let partial = engine
                .ingestor
                .ingest_regulation_chunks(&document.chunks, &document.metadata, cancel)
                .await?;
            report.stored.extend(partial.stored);
            if partial.cancelled {
                report.cancelled = true;
                break;
            }
        }

        Ok(report)
    }

    pub async fn ingest_workflows(
        &self,
        steps: &[WorkflowStep],
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let engine = self.get_engine().await?;
        engine.ingestor.ingest_workflow_steps(steps, cancel).await
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let engine = self.get_engine().await?;
        Ok(ServiceStatus {
            memory: engine.monitor.current_status(),
            model: engine.generator.model_info(),
            metrics: engine.generator.metrics(),
            index: engine.index.stats(),
        })
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let engine = self.get_engine().await?;
        engine.index.save_snapshot(path)
    }

    /// Stop background work and drop the engine
    pub async fn shutdown(&self) {
        if let Some(engine) = self.engine.write().await.take() {
            engine.monitor.stop();
            tracing::info!("Retrieval service shut down");
        }
    }

    /// Get the engine, returning error if not initialized
    async fn get_engine(&self) -> Result<Arc<Engine>> {
        self.engine
            .read()
            .await
            .clone()
            .ok_or(GraphRagError::StoreNotInitialized)
    }
}
