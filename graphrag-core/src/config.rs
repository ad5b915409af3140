//! Engine configuration
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables. Every section falls back to its defaults when absent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embedding::{EmbeddingConfig, ModePreference, MODEL_PATH_ENV};
use crate::error::{GraphRagError, Result};
use crate::index::IndexConfig;
use crate::memory::MonitorConfig;
use crate::record::EMBEDDING_DIMENSION;
use crate::search::SearchConfig;

pub const MODE_ENV: &str = "GRAPHRAG_MODE";
pub const MEMORY_CEILING_ENV: &str = "GRAPHRAG_MEMORY_CEILING_MB";
pub const IDLE_UNLOAD_ENV: &str = "GRAPHRAG_IDLE_UNLOAD_SECS";

/// Configuration for every engine component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub monitor: MonitorConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Read a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(MODE_ENV) {
            self.embedding.mode = mode.parse::<ModePreference>()?;
        }
        if let Some(path) = lookup(MODEL_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            self.embedding.model_path = Some(PathBuf::from(path));
        }
        if let Some(mb) = lookup(MEMORY_CEILING_ENV) {
            self.embedding.memory_ceiling_mb = parse_number(MEMORY_CEILING_ENV, &mb)?;
        }
        if let Some(secs) = lookup(IDLE_UNLOAD_ENV) {
            self.embedding.idle_unload_secs = parse_number(IDLE_UNLOAD_ENV, &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.embedding.validate()?;
        self.monitor.validate()?;
        self.search.validate()?;
        if self.index.dimension != EMBEDDING_DIMENSION {
            return Err(GraphRagError::configuration(format!(
                "index dimension must be {EMBEDDING_DIMENSION}, got {}",
                self.index.dimension
            )));
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| GraphRagError::configuration(format!("{key} must be a number, got '{value}'")))
}
