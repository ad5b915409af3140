//! JSON Lines readers for the two ingestion feeds
//!
//! Regulation feed: one regulation per line, its metadata fields next to
//! a `chunks` array. Workflow feed: one step per line. Blank lines are
//! skipped.

use graphrag_core::{RegulationChunk, RegulationMetadata, WorkflowStep};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CliError, CliResult};

/// A regulation and its preprocessed chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationDocument {
    #[serde(flatten)]
    pub metadata: RegulationMetadata,
    pub chunks: Vec<RegulationChunk>,
}

pub fn read_regulations(path: &Path) -> CliResult<Vec<RegulationDocument>> {
    let mut documents: Vec<RegulationDocument> = read_jsonl(path)?;
    for document in &mut documents {
        document.chunks.sort_by_key(|c| c.chunk_index);
    }
    Ok(documents)
}

pub fn read_workflow_steps(path: &Path) -> CliResult<Vec<WorkflowStep>> {
    read_jsonl(path)
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> CliResult<Vec<T>> {
    let raw = std::fs::read_to_string(path)?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| CliError::InvalidFeed {
                path: path.to_path_buf(),
                line: n + 1,
                message: e.to_string(),
            })
        })
        .collect()
}
