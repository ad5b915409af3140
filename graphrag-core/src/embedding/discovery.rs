//! Model path discovery utilities
//!
//! Finds the ONNX embedding model across installation scenarios.

use crate::error::{GraphRagError, Result};
use std::path::{Path, PathBuf};

/// Environment variable that overrides every other location
pub const MODEL_PATH_ENV: &str = "GRAPHRAG_MODEL_PATH";

/// Files a model directory must contain to be usable
pub const REQUIRED_MODEL_FILES: [&str; 5] = [
    "model.onnx",
    "tokenizer.json",
    "config.json",
    "special_tokens_map.json",
    "tokenizer_config.json",
];

/// Whether `dir` holds a loadable model
pub fn is_model_dir(dir: &Path) -> bool {
    REQUIRED_MODEL_FILES.iter().all(|f| dir.join(f).is_file())
}

/// Find the model directory with priority:
/// 1. GRAPHRAG_MODEL_PATH environment variable
/// 2. Configured path
/// 3. Bundled location (./models/<model_name>)
/// 4. User home directory (~/.graphrag/models/<model_name>)
pub fn find_model_path(configured: Option<&Path>, model_name: &str) -> Result<PathBuf> {
    // Priority 1: explicit override
    if let Ok(env_path) = std::env::var(MODEL_PATH_ENV) {
        let path = PathBuf::from(&env_path);
        if is_model_dir(&path) {
            log::info!("Using {}: {}", MODEL_PATH_ENV, path.display());
            return Ok(path);
        }
        log::warn!("{} set but model not found: {}", MODEL_PATH_ENV, env_path);
    }

    // Priority 2: configuration
    if let Some(path) = configured {
        if is_model_dir(path) {
            log::info!("Using configured model: {}", path.display());
            return Ok(path.to_path_buf());
        }
        log::warn!("Configured model path has no model: {}", path.display());
    }

    // Priority 3: bundled next to the working directory
    for bundled in bundled_model_paths(model_name) {
        if is_model_dir(&bundled) {
            log::info!("Using bundled model: {}", bundled.display());
            return Ok(bundled);
        }
    }

    // Priority 4: user home directory
    if let Some(user_path) = user_model_path(model_name) {
        if is_model_dir(&user_path) {
            log::info!("Using user model: {}", user_path.display());
            return Ok(user_path);
        }
    }

    Err(GraphRagError::model(format!(
        "Embedding model '{model_name}' not found. Checked:\n\
         - {MODEL_PATH_ENV} environment variable\n\
         - configured model_path\n\
         - ./models/{model_name}\n\
         - ~/.graphrag/models/{model_name}"
    )))
}

/// Bundled locations relative to the working directory
pub fn bundled_model_paths(model_name: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("models").join(model_name));
    }
    paths.push(PathBuf::from("../models").join(model_name));

    paths
}

fn user_model_path(model_name: &str) -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| {
            PathBuf::from(home)
                .join(".graphrag")
                .join("models")
                .join(model_name)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_paths_not_empty() {
        let paths = bundled_model_paths("bge-base");
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.ends_with("models/bge-base")));
    }

    #[test]
    fn test_configured_dir_with_files_is_found() {
        let dir = tempfile::tempdir().unwrap();
        for file in REQUIRED_MODEL_FILES {
            std::fs::write(dir.path().join(file), b"stub").unwrap();
        }
        // Only meaningful when the env override is not pointing elsewhere
        if std::env::var(MODEL_PATH_ENV).is_err() {
            let found = find_model_path(Some(dir.path()), "test-model-not-installed").unwrap();
            assert_eq!(found, dir.path());
        }
    }

    #[test]
    fn test_incomplete_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"stub").unwrap();
        assert!(!is_model_dir(dir.path()));
    }

    #[test]
    fn test_missing_model_lists_locations() {
        if std::env::var(MODEL_PATH_ENV).is_ok() {
            return;
        }
        let err = find_model_path(None, "graphrag-test-model-that-does-not-exist").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains(MODEL_PATH_ENV));
    }
}
