//! Error types for graphrag-core

use thiserror::Error;

/// Coarse classification of an error, used by callers to decide whether
/// to retry, skip or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable generation strategy, or invalid settings
    Configuration,
    /// Memory budget would be breached
    Capacity,
    /// Latency budget exceeded
    Performance,
    /// Malformed vectors or snapshots
    Data,
    /// A required component is not ready
    Availability,
    /// Work stopped on request
    Cancelled,
    /// Anything else (I/O, model runtime)
    Internal,
}

/// Errors that can occur in the retrieval engine
#[derive(Debug, Error)]
pub enum GraphRagError {
    /// Invalid configuration or no usable generation strategy
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Batch generation would push memory past the ceiling
    #[error("Memory limit exceeded: projected {projected_bytes} bytes, ceiling {ceiling_bytes} bytes")]
    MemoryLimitExceeded {
        projected_bytes: u64,
        ceiling_bytes: u64,
    },

    /// The memory monitor refused a model-backed inference
    #[error("Inference not admitted under current memory pressure ({0})")]
    InferenceNotAdmitted(String),

    /// A single embedding took longer than its budget
    #[error("Embedding exceeded its {budget_ms}ms budget")]
    BudgetExceeded { budget_ms: u64 },

    /// Vector length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector contains non-finite values or has no magnitude
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Vector store used before it was initialized
    #[error("Vector store not initialized")]
    StoreNotInitialized,

    /// Model loading or inference error
    #[error("Model error: {0}")]
    Model(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Batch work was cancelled between sub-batches
    #[error("Cancelled after {completed} items")]
    Cancelled { completed: usize },

    /// An item inside a batch failed; the batch was aborted
    #[error("Batch item {index} failed: {source}")]
    BatchItemFailed {
        index: usize,
        #[source]
        source: Box<GraphRagError>,
    },

    /// Snapshot written by an incompatible version or for another dimension
    #[error("Incompatible snapshot: {0}")]
    IncompatibleSnapshot(String),

    /// Snapshot encoding error
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphRagError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Wrap an item failure with its position in the batch
    pub fn batch_item(index: usize, source: GraphRagError) -> Self {
        Self::BatchItemFailed {
            index,
            source: Box::new(source),
        }
    }

    /// Taxonomy class of this error. Batch failures report the class of
    /// the underlying item error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::MemoryLimitExceeded { .. } | Self::InferenceNotAdmitted(_) => ErrorKind::Capacity,
            Self::BudgetExceeded { .. } => ErrorKind::Performance,
            Self::DimensionMismatch { .. }
            | Self::InvalidEmbedding(_)
            | Self::IncompatibleSnapshot(_)
            | Self::Snapshot(_) => ErrorKind::Data,
            Self::StoreNotInitialized => ErrorKind::Availability,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::BatchItemFailed { source, .. } => source.kind(),
            Self::Model(_) | Self::Embedding(_) | Self::Json(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the caller may reasonably try the same work again later
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Performance | ErrorKind::Capacity)
    }

    /// Index of the first failed item, for batch failures
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            Self::BatchItemFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, GraphRagError>;
