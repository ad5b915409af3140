//! GraphRAG CLI Library
//!
//! Composition root for the on-device retrieval engine: wires the memory
//! monitor, embedding generator, vector index and search router together
//! and reads the ingestion feeds.

pub mod error;
pub mod feeds;
pub mod service;

pub use error::{CliError, CliResult};
pub use feeds::{read_regulations, read_workflow_steps, RegulationDocument};
pub use service::{Engine, RetrievalService, SearchResponse, ServiceStatus};
