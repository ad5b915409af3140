//! Ingestion of the two input feeds
//!
//! Regulation chunks arrive from the document preprocessor with shared
//! regulation metadata; workflow steps arrive from the workflow tracker
//! as already-decrypted text. Both are embedded and appended to their
//! namespace.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::embedding::EmbeddingGenerator;
use crate::error::{GraphRagError, Result};
use crate::index::VectorIndex;
use crate::record::{EmbeddingDomain, RecordId, RegulationRecord, StoredRecord, WorkflowRecord};

/// One preprocessed regulation chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegulationChunk {
    pub content: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub section_title: Option<String>,
}

/// Metadata shared by every chunk of one regulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegulationMetadata {
    pub regulation_number: String,
    pub title: String,
    #[serde(default)]
    pub subpart: Option<String>,
    #[serde(default)]
    pub supplement: Option<String>,
}

/// One recorded workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub content: String,
    pub document_type: String,
}

/// Outcome of a batch ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Records appended, in input order
    pub stored: Vec<RecordId>,
    /// Stopped early on request; `stored` holds what completed
    pub cancelled: bool,
}

impl IngestReport {
    pub fn stored_count(&self) -> usize {
        self.stored.len()
    }
}

/// Embeds feed items and appends them to the index
pub struct Ingestor {
    generator: Arc<EmbeddingGenerator>,
    index: Arc<VectorIndex>,
}

impl Ingestor {
    pub fn new(generator: Arc<EmbeddingGenerator>, index: Arc<VectorIndex>) -> Self {
        Self { generator, index }
    }

    pub async fn ingest_regulation_chunk(
        &self,
        chunk: &RegulationChunk,
        metadata: &RegulationMetadata,
    ) -> Result<RecordId> {
        let embedding = self
            .generator
            .generate_embedding(&chunk.content, EmbeddingDomain::Regulations)
            .await?;
        self.index.store(regulation_record(chunk, metadata, embedding))
    }

    pub async fn ingest_workflow_step(&self, step: &WorkflowStep) -> Result<RecordId> {
        let embedding = self
            .generator
            .generate_embedding(&step.content, EmbeddingDomain::UserRecords)
            .await?;
        self.index.store(workflow_record(step, embedding))
    }

    /// Ingest chunks in sub-batches.
    ///
    /// Sub-batches already stored stay stored when a later one fails or
    /// the token is cancelled. Failures carry the index of the first
    /// failed chunk within `chunks`.
    pub async fn ingest_regulation_chunks(
        &self,
        chunks: &[RegulationChunk],
        metadata: &RegulationMetadata,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let report = self
            .ingest_batched(chunks, EmbeddingDomain::Regulations, cancel, |chunk, embedding| {
                regulation_record(chunk, metadata, embedding).into()
            })
            .await?;
        log::info!(
            "Ingested {}/{} chunks of {}{}",
            report.stored_count(),
            chunks.len(),
            metadata.regulation_number,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    /// Ingest workflow steps in sub-batches; same semantics as
    /// `ingest_regulation_chunks`.
    pub async fn ingest_workflow_steps(
        &self,
        steps: &[WorkflowStep],
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let report = self
            .ingest_batched(steps, EmbeddingDomain::UserRecords, cancel, |step, embedding| {
                workflow_record(step, embedding).into()
            })
            .await?;
        log::info!(
            "Ingested {}/{} workflow steps{}",
            report.stored_count(),
            steps.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    async fn ingest_batched<T, F>(
        &self,
        items: &[T],
        domain: EmbeddingDomain,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<IngestReport>
    where
        T: FeedItem + Sync,
        F: Fn(&T, Vec<f32>) -> StoredRecord,
    {
        let texts: Vec<&str> = items.iter().map(FeedItem::text).collect();
        let mut report = IngestReport::default();

        let outcome = self
            .generator
            .generate_batch_with(&texts, domain, cancel, |first, embeddings| {
                for (position, (item, embedding)) in items[first..].iter().zip(embeddings).enumerate() {
                    let id = self
                        .index
                        .store(build(item, embedding))
                        .map_err(|e| GraphRagError::batch_item(first + position, e))?;
                    report.stored.push(id);
                }
                Ok(())
            })
            .await;

        match outcome {
            Ok(()) => {}
            Err(GraphRagError::Cancelled { .. }) => report.cancelled = true,
            Err(e) => return Err(e),
        }
        Ok(report)
    }
}

/// Text of a feed item
trait FeedItem {
    fn text(&self) -> &str;
}

impl FeedItem for RegulationChunk {
    fn text(&self) -> &str {
        &self.content
    }
}

impl FeedItem for WorkflowStep {
    fn text(&self) -> &str {
        &self.content
    }
}

fn regulation_record(
    chunk: &RegulationChunk,
    metadata: &RegulationMetadata,
    embedding: Vec<f32>,
) -> RegulationRecord {
    RegulationRecord {
        id: RecordId::new(),
        content: chunk.content.clone(),
        embedding,
        regulation_number: metadata.regulation_number.clone(),
        title: chunk
            .section_title
            .clone()
            .unwrap_or_else(|| metadata.title.clone()),
        subpart: metadata.subpart.clone(),
        supplement: metadata.supplement.clone(),
        timestamp: Utc::now(),
    }
}

fn workflow_record(step: &WorkflowStep, embedding: Vec<f32>) -> WorkflowRecord {
    WorkflowRecord {
        id: RecordId::new(),
        content: step.content.clone(),
        embedding,
        document_type: step.document_type.clone(),
        timestamp: Utc::now(),
    }
}
