//! Record and result types
//!
//! Core types shared by the index, the embedding generator and search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Length of every embedding vector
pub const EMBEDDING_DIMENSION: usize = 768;

/// Token budget applied before embedding
pub const MAX_TOKEN_LENGTH: usize = 512;

/// Unique identifier for stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Create a new random RecordId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Embedding domain. Selects both the post-processing bias and the
/// storage namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingDomain {
    Regulations,
    UserRecords,
}

impl EmbeddingDomain {
    pub const ALL: [EmbeddingDomain; 2] = [EmbeddingDomain::Regulations, EmbeddingDomain::UserRecords];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulations => "regulations",
            Self::UserRecords => "user_records",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Regulations => "Government Regulations",
            Self::UserRecords => "User Acquisition Records",
        }
    }
}

impl std::fmt::Display for EmbeddingDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search-facing domain names. `UserHistory` is searched through the
/// user-records namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchDomain {
    Regulations,
    UserHistory,
}

impl SearchDomain {
    pub const ALL: [SearchDomain; 2] = [SearchDomain::Regulations, SearchDomain::UserHistory];

    pub fn embedding_domain(&self) -> EmbeddingDomain {
        match self {
            Self::Regulations => EmbeddingDomain::Regulations,
            Self::UserHistory => EmbeddingDomain::UserRecords,
        }
    }
}

impl From<EmbeddingDomain> for SearchDomain {
    fn from(domain: EmbeddingDomain) -> Self {
        match domain {
            EmbeddingDomain::Regulations => Self::Regulations,
            EmbeddingDomain::UserRecords => Self::UserHistory,
        }
    }
}

impl std::str::FromStr for SearchDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "regulations" | "regulation" => Ok(Self::Regulations),
            "userhistory" | "userrecords" | "workflow" | "workflows" => Ok(Self::UserHistory),
            other => Err(format!("unknown search domain: {other}")),
        }
    }
}

/// A regulation chunk with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationRecord {
    pub id: RecordId,
    pub content: String,
    pub embedding: Vec<f32>,
    pub regulation_number: String,
    pub title: String,
    pub subpart: Option<String>,
    pub supplement: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A recorded workflow step with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: RecordId,
    pub content: String,
    pub embedding: Vec<f32>,
    pub document_type: String,
    pub timestamp: DateTime<Utc>,
}

/// A record held by the vector index, tagged by namespace
#[derive(Debug, Clone, PartialEq)]
pub enum StoredRecord {
    Regulation(RegulationRecord),
    Workflow(WorkflowRecord),
}

impl StoredRecord {
    pub fn domain(&self) -> EmbeddingDomain {
        match self {
            Self::Regulation(_) => EmbeddingDomain::Regulations,
            Self::Workflow(_) => EmbeddingDomain::UserRecords,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Self::Regulation(r) => r.id,
            Self::Workflow(r) => r.id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Regulation(r) => &r.content,
            Self::Workflow(r) => &r.content,
        }
    }

    pub fn embedding(&self) -> &[f32] {
        match self {
            Self::Regulation(r) => &r.embedding,
            Self::Workflow(r) => &r.embedding,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Regulation(r) => r.timestamp,
            Self::Workflow(r) => r.timestamp,
        }
    }

    /// Source type reported in search metadata
    pub fn source_type(&self) -> &str {
        match self {
            Self::Regulation(_) => "regulation",
            Self::Workflow(r) => &r.document_type,
        }
    }

    /// Rough in-memory footprint, used for index statistics
    pub fn approximate_size(&self) -> usize {
        let fixed = std::mem::size_of::<RecordId>() + std::mem::size_of::<DateTime<Utc>>();
        let vector = self.embedding().len() * std::mem::size_of::<f32>();
        let text = match self {
            Self::Regulation(r) => {
                r.content.len()
                    + r.regulation_number.len()
                    + r.title.len()
                    + r.subpart.as_ref().map_or(0, String::len)
                    + r.supplement.as_ref().map_or(0, String::len)
            }
            Self::Workflow(r) => r.content.len() + r.document_type.len(),
        };
        fixed + vector + text
    }
}

impl From<RegulationRecord> for StoredRecord {
    fn from(record: RegulationRecord) -> Self {
        Self::Regulation(record)
    }
}

impl From<WorkflowRecord> for StoredRecord {
    fn from(record: WorkflowRecord) -> Self {
        Self::Workflow(record)
    }
}

/// Metadata attached to a search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub source_type: String,
    pub timestamp: DateTime<Utc>,
    pub document_id: String,
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub content: String,
    pub domain: SearchDomain,
    pub relevance_score: f32,
    pub metadata: ResultMetadata,
}

impl SearchResult {
    pub fn from_record(record: &StoredRecord, relevance_score: f32) -> Self {
        Self {
            content: record.content().to_string(),
            domain: record.domain().into(),
            relevance_score,
            metadata: ResultMetadata {
                source_type: record.source_type().to_string(),
                timestamp: record.timestamp(),
                document_id: record.id().to_string(),
            },
        }
    }
}

/// Caller-supplied personalization context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchContext {
    pub user_id: String,
    #[serde(default)]
    pub recent_queries: Vec<String>,
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub preferences: HashMap<String, String>,
}

impl UserSearchContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_recent_query(mut self, query: impl Into<String>) -> Self {
        self.recent_queries.push(query.into());
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_types.push(document_type.into());
        self
    }

    pub fn with_preference(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.preferences.insert(key.into(), value.into());
        self
    }
}
