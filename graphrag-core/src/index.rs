//! Dual-namespace vector index
//!
//! Append-only in-memory storage of regulation and workflow records with
//! brute-force cosine top-K retrieval. Each namespace sits behind its own
//! lock; writers are serialized, readers run concurrently.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{GraphRagError, Result};
use crate::record::{
    EmbeddingDomain, RecordId, RegulationRecord, StoredRecord, WorkflowRecord, EMBEDDING_DIMENSION,
};

/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 1;

/// Index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Required length of every stored and query vector
    pub dimension: usize,
    /// Where the CLI keeps the index between runs
    pub snapshot_path: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: EMBEDDING_DIMENSION,
            snapshot_path: None,
        }
    }
}

/// A record matched by `find_similar`
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarRecord {
    pub record: StoredRecord,
    pub similarity: f32,
}

/// Record counts and approximate footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub regulation_count: usize,
    pub workflow_count: usize,
    pub approximate_bytes: usize,
}

impl IndexStats {
    pub fn total_records(&self) -> usize {
        self.regulation_count + self.workflow_count
    }
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    dimension: u32,
    regulations: Vec<RegulationRecord>,
    workflows: Vec<WorkflowRecord>,
}

/// In-memory dual-namespace vector store
pub struct VectorIndex {
    dimension: usize,
    regulations: RwLock<Vec<StoredRecord>>,
    workflows: RwLock<Vec<StoredRecord>>,
}

impl VectorIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self::with_dimension(config.dimension)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            regulations: RwLock::new(Vec::new()),
            workflows: RwLock::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn namespace(&self, domain: EmbeddingDomain) -> &RwLock<Vec<StoredRecord>> {
        match domain {
            EmbeddingDomain::Regulations => &self.regulations,
            EmbeddingDomain::UserRecords => &self.workflows,
        }
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(GraphRagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(GraphRagError::InvalidEmbedding(
                "vector contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    /// Append a record to its namespace. Duplicates are allowed.
    pub fn store(&self, record: impl Into<StoredRecord>) -> Result<RecordId> {
        let record = record.into();
        self.check_vector(record.embedding())?;
        let id = record.id();
        self.namespace(record.domain()).write().push(record);
        Ok(id)
    }

    /// Cosine top-K over one namespace.
    ///
    /// Keeps records with `similarity >= threshold`, sorted descending;
    /// equal scores keep insertion order.
    pub fn find_similar(
        &self,
        domain: EmbeddingDomain,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarRecord>> {
        self.check_vector(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<SimilarRecord> = self
            .namespace(domain)
            .read()
            .iter()
            .filter_map(|record| {
                let similarity = cosine_similarity(query, record.embedding());
                (similarity >= threshold).then(|| SimilarRecord {
                    record: record.clone(),
                    similarity,
                })
            })
            .collect();

        // sort_by is stable, which gives the insertion-order tie-break
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    pub fn len(&self, domain: EmbeddingDomain) -> usize {
        self.namespace(domain).read().len()
    }

    pub fn is_empty(&self) -> bool {
        EmbeddingDomain::ALL.iter().all(|d| self.len(*d) == 0)
    }

    pub fn stats(&self) -> IndexStats {
        let size = |records: &[StoredRecord]| -> usize {
            records.iter().map(StoredRecord::approximate_size).sum()
        };
        let regulations = self.regulations.read();
        let workflows = self.workflows.read();

        IndexStats {
            regulation_count: regulations.len(),
            workflow_count: workflows.len(),
            approximate_bytes: size(&regulations) + size(&workflows),
        }
    }

    /// Drop every record in one namespace, or everywhere when `None`.
    /// Irreversible.
    pub fn clear(&self, domain: Option<EmbeddingDomain>) {
        let domains: &[EmbeddingDomain] = match &domain {
            Some(d) => std::slice::from_ref(d),
            None => &EmbeddingDomain::ALL,
        };
        for d in domains {
            let removed = {
                let mut records = self.namespace(*d).write();
                let removed = records.len();
                records.clear();
                removed
            };
            log::info!("Cleared {} records from {} namespace", removed, d);
        }
    }

    /// Write every record to `path` (replaced atomically)
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = IndexSnapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension as u32,
            regulations: collect_records(&self.regulations.read(), |r| match r {
                StoredRecord::Regulation(r) => Some(r.clone()),
                StoredRecord::Workflow(_) => None,
            }),
            workflows: collect_records(&self.workflows.read(), |r| match r {
                StoredRecord::Workflow(r) => Some(r.clone()),
                StoredRecord::Regulation(_) => None,
            }),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        log::info!(
            "Saved index snapshot ({} regulations, {} workflows) to {}",
            snapshot.regulations.len(),
            snapshot.workflows.len(),
            path.display()
        );
        Ok(())
    }

    /// Rebuild an index from a snapshot, validating every vector
    pub fn load_snapshot(path: &Path, config: &IndexConfig) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: IndexSnapshot = bincode::deserialize_from(reader)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GraphRagError::IncompatibleSnapshot(format!(
                "version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        if snapshot.dimension as usize != config.dimension {
            return Err(GraphRagError::IncompatibleSnapshot(format!(
                "dimension {} (expected {})",
                snapshot.dimension, config.dimension
            )));
        }

        let index = Self::new(config);
        let (regulations, workflows) = (snapshot.regulations.len(), snapshot.workflows.len());
        for record in snapshot.regulations {
            index.store(record)?;
        }
        for record in snapshot.workflows {
            index.store(record)?;
        }

        log::info!(
            "Loaded index snapshot ({} regulations, {} workflows) from {}",
            regulations,
            workflows,
            path.display()
        );
        Ok(index)
    }
}

fn collect_records<T>(records: &[StoredRecord], pick: impl Fn(&StoredRecord) -> Option<T>) -> Vec<T> {
    records.iter().filter_map(pick).collect()
}

/// Cosine similarity; 0 when either vector has no magnitude or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const DIM: usize = 4;

    fn regulation(content: &str, embedding: Vec<f32>) -> RegulationRecord {
        RegulationRecord {
            id: RecordId::new(),
            content: content.to_string(),
            embedding,
            regulation_number: "FAR 15.404".to_string(),
            title: "Proposal analysis".to_string(),
            subpart: Some("15.4".to_string()),
            supplement: None,
            timestamp: Utc::now(),
        }
    }

    fn workflow(content: &str, embedding: Vec<f32>) -> WorkflowRecord {
        WorkflowRecord {
            id: RecordId::new(),
            content: content.to_string(),
            embedding,
            document_type: "market_research".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let zero = vec![0.0; 3];
        let a = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_exact_vector_is_retrieved_first() {
        let index = VectorIndex::with_dimension(DIM);
        index
            .store(regulation("other", vec![0.0, 1.0, 0.0, 0.0]))
            .unwrap();
        let id = index
            .store(regulation("target", vec![0.5, 0.5, 0.5, 0.5]))
            .unwrap();

        let hits = index
            .find_similar(EmbeddingDomain::Regulations, &[0.5, 0.5, 0.5, 0.5], 5, 0.99)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id(), id);
        assert!(hits[0].similarity >= 0.99);
    }

    #[test]
    fn test_results_sorted_with_stable_ties() {
        let index = VectorIndex::with_dimension(DIM);
        let first = index.store(workflow("a", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        index.store(workflow("b", vec![1.0, 1.0, 0.0, 0.0])).unwrap();
        let third = index.store(workflow("c", vec![2.0, 0.0, 0.0, 0.0])).unwrap();
        index.store(workflow("d", vec![0.0, 0.0, 1.0, 0.0])).unwrap();

        let hits = index
            .find_similar(EmbeddingDomain::UserRecords, &[1.0, 0.0, 0.0, 0.0], 10, 0.0)
            .unwrap();

        assert!(hits
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
        // "a" and "c" tie at 1.0 and keep insertion order
        assert_eq!(hits[0].record.id(), first);
        assert_eq!(hits[1].record.id(), third);
        assert_eq!(hits[2].record.content(), "b");
    }

    #[test]
    fn test_limit_and_threshold() {
        let index = VectorIndex::with_dimension(DIM);
        for i in 0..5 {
            index
                .store(regulation(&format!("r{i}"), vec![1.0, i as f32, 0.0, 0.0]))
                .unwrap();
        }
        let hits = index
            .find_similar(EmbeddingDomain::Regulations, &[1.0, 0.0, 0.0, 0.0], 2, 0.0)
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = index
            .find_similar(EmbeddingDomain::Regulations, &[1.0, 0.0, 0.0, 0.0], 10, 0.9)
            .unwrap();
        // cos(atan(1)) ~ 0.707 falls below 0.9
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let index = VectorIndex::with_dimension(DIM);
        index.store(regulation("reg", vec![1.0, 0.0, 0.0, 0.0])).unwrap();

        let hits = index
            .find_similar(EmbeddingDomain::UserRecords, &[1.0, 0.0, 0.0, 0.0], 10, 0.0)
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(index.len(EmbeddingDomain::Regulations), 1);
    }

    #[test]
    fn test_duplicates_allowed() {
        let index = VectorIndex::with_dimension(DIM);
        index.store(workflow("same", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        index.store(workflow("same", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(index.stats().workflow_count, 2);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = VectorIndex::with_dimension(DIM);
        let err = index.store(regulation("bad", vec![1.0; 3])).unwrap_err();
        assert!(matches!(err, GraphRagError::DimensionMismatch { expected: 4, actual: 3 }));

        let err = index
            .find_similar(EmbeddingDomain::Regulations, &[1.0; 5], 1, 0.0)
            .unwrap_err();
        assert!(matches!(err, GraphRagError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_zero_stored_vector_never_matches_positive_threshold() {
        let index = VectorIndex::with_dimension(DIM);
        index.store(regulation("zero", vec![0.0; DIM])).unwrap();
        let hits = index
            .find_similar(EmbeddingDomain::Regulations, &[1.0, 0.0, 0.0, 0.0], 10, 0.01)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_stats_and_clear() {
        let index = VectorIndex::with_dimension(DIM);
        index.store(regulation("reg", vec![1.0; DIM])).unwrap();
        index.store(workflow("wf", vec![1.0; DIM])).unwrap();

        let stats = index.stats();
        assert_eq!(stats.total_records(), 2);
        assert!(stats.approximate_bytes > 2 * DIM * 4);

        index.clear(Some(EmbeddingDomain::Regulations));
        assert_eq!(index.len(EmbeddingDomain::Regulations), 0);
        assert_eq!(index.len(EmbeddingDomain::UserRecords), 1);

        index.clear(None);
        assert!(index.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("snapshot.bin");
        let config = IndexConfig {
            dimension: DIM,
            snapshot_path: Some(path.clone()),
        };

        let index = VectorIndex::new(&config);
        let reg = regulation("reg", vec![1.0, 0.0, 0.0, 0.0]);
        index.store(reg.clone()).unwrap();
        index.store(workflow("wf", vec![0.0, 1.0, 0.0, 0.0])).unwrap();
        index.save_snapshot(&path).unwrap();

        let restored = VectorIndex::load_snapshot(&path, &config).unwrap();
        assert_eq!(restored.stats(), index.stats());
        let hits = restored
            .find_similar(EmbeddingDomain::Regulations, &[1.0, 0.0, 0.0, 0.0], 1, 0.5)
            .unwrap();
        assert_eq!(hits[0].record, StoredRecord::Regulation(reg));
    }

    #[test]
    fn test_snapshot_dimension_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.bin");
        VectorIndex::with_dimension(DIM).save_snapshot(&path).unwrap();

        let err = VectorIndex::load_snapshot(&path, &IndexConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, GraphRagError::IncompatibleSnapshot(_)));
    }
}
