//! Embedding generation
//!
//! Text is preprocessed, embedded by the strategy chosen at startup
//! (mock, lazy-hybrid or real-only), biased per domain and normalized.

mod discovery;
mod generator;
mod metrics;
mod mock;
mod model;
mod preprocess;
mod strategy;

pub use discovery::{find_model_path, is_model_dir, MODEL_PATH_ENV};
pub use generator::{per_item_cost, EmbeddingConfig, EmbeddingGenerator};
pub use metrics::{ModelInfo, PerformanceMetrics};
pub use mock::{apply_domain_bias, l2_normalize_in_place, mock_embedding};
pub use model::{InferenceModel, ModelLoader, OnnxModelLoader};
pub use preprocess::{prepare, PreparedText};
pub use strategy::{
    select_strategy, DeploymentMode, EmbeddingSource, EmbeddingStrategy, LazyHybridStrategy,
    LoadStats, MockStrategy, ModePreference, RawEmbedding, RealOnlyStrategy,
};
