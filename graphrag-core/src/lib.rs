//! GraphRAG Core
//!
//! On-device embedding and vector retrieval for acquisition work: a
//! memory-aware embedding generator, a two-namespace vector index
//! (regulations and the user's own workflow history) and a search router
//! that decides which namespace a query belongs to and blends the results.
//!
//! ## Features
//!
//! - **Three embedding modes** - deterministic mock, lazily loaded model with
//!   mock fallback, or model-only
//! - **Memory admission** - inference is refused under critical pressure and
//!   batches never exceed the configured ceiling
//! - **Dual namespaces** - regulations and user records never mix in storage
//! - **Routed search** - keyword routing, semantic + lexical blending and
//!   per-user personalization
//!
//! ## Example
//!
//! ```ignore
//! use graphrag_core::{EngineConfig, EmbeddingGenerator, MemoryMonitor, SystemSampler};
//!
//! let config = EngineConfig::default();
//! let monitor = Arc::new(MemoryMonitor::new(Arc::new(SystemSampler::new()), config.monitor.clone()));
//! let generator = Arc::new(EmbeddingGenerator::new(config.embedding.clone(), monitor)?);
//! let index = Arc::new(VectorIndex::new(&config.index));
//!
//! Ingestor::new(generator.clone(), index.clone())
//!     .ingest_workflow_step(&step)
//!     .await?;
//!
//! let search = UnifiedSearch::new(generator, index, config.search.clone());
//! let results = search.search_with_hint("contract", None, 10).await?;
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod record;
pub mod search;

// Re-exports for convenience
pub use config::EngineConfig;
pub use embedding::{
    DeploymentMode, EmbeddingConfig, EmbeddingGenerator, ModePreference, ModelInfo,
    PerformanceMetrics,
};
pub use error::{ErrorKind, GraphRagError, Result};
pub use index::{IndexConfig, IndexStats, SimilarRecord, VectorIndex};
pub use ingest::{IngestReport, Ingestor, RegulationChunk, RegulationMetadata, WorkflowStep};
pub use memory::{
    MemoryMonitor, MemorySampler, MemoryStatus, MonitorConfig, PressureLevel, SimulatedSampler,
    SystemSampler,
};
pub use record::{
    EmbeddingDomain, RecordId, RegulationRecord, ResultMetadata, SearchDomain, SearchResult,
    StoredRecord, UserSearchContext, WorkflowRecord, EMBEDDING_DIMENSION,
};
pub use search::{QueryRouter, RoutingDecision, SearchConfig, UnifiedSearch};
