//! Real inference backend
//!
//! A user-supplied ONNX sentence-embedding model run through fastembed.
//! Loading goes through `ModelLoader` so lazy-hybrid mode can load and
//! release the model repeatedly, and tests can substitute their own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// A loaded embedding model
pub trait InferenceModel: Send + Sync {
    /// Raw model output for one text. Post-processing happens upstream.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn name(&self) -> &str;
}

/// Produces loaded models on demand
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn InferenceModel>>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Loads an ONNX model directory found by discovery
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    path: PathBuf,
    name: String,
    max_length: usize,
}

impl OnnxModelLoader {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            max_length: crate::record::MAX_TOKEN_LENGTH,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<Arc<dyn InferenceModel>> {
        let model = onnx::OnnxEmbeddingModel::from_dir(&self.path, &self.name, self.max_length)?;
        Ok(Arc::new(model))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use fastembed::{InitOptionsUserDefined, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel};
    use parking_lot::Mutex;
    use std::path::Path;

    use super::InferenceModel;
    use crate::error::{GraphRagError, Result};

    /// fastembed model built from local files
    pub struct OnnxEmbeddingModel {
        model: Mutex<TextEmbedding>,
        name: String,
    }

    impl OnnxEmbeddingModel {
        pub fn from_dir(dir: &Path, name: &str, max_length: usize) -> Result<Self> {
            let read = |file: &str| {
                std::fs::read(dir.join(file)).map_err(|e| {
                    GraphRagError::model(format!("Failed to read {}: {}", dir.join(file).display(), e))
                })
            };

            log::info!("Loading embedding model from: {}", dir.display());

            let tokenizer_files = TokenizerFiles {
                tokenizer_file: read("tokenizer.json")?,
                config_file: read("config.json")?,
                special_tokens_map_file: read("special_tokens_map.json")?,
                tokenizer_config_file: read("tokenizer_config.json")?,
            };
            let user_model = UserDefinedEmbeddingModel::new(read("model.onnx")?, tokenizer_files);

            let options = InitOptionsUserDefined {
                max_length,
                ..Default::default()
            };
            let model = TextEmbedding::try_new_from_user_defined(user_model, options)
                .map_err(|e| GraphRagError::model(format!("Failed to load {}: {}", name, e)))?;

            Ok(Self {
                model: Mutex::new(model),
                name: name.to_string(),
            })
        }
    }

    impl InferenceModel for OnnxEmbeddingModel {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut output = self
                .model
                .lock()
                .embed(vec![text], None)
                .map_err(|e| GraphRagError::embedding(format!("Inference failed: {}", e)))?;
            output
                .pop()
                .ok_or_else(|| GraphRagError::embedding("Model returned no embedding"))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(not(feature = "onnx"))]
mod onnx {
    use std::path::Path;

    use super::InferenceModel;
    use crate::error::{GraphRagError, Result};

    /// Stand-in when no inference backend is compiled in; never constructed
    pub struct OnnxEmbeddingModel;

    impl OnnxEmbeddingModel {
        pub fn from_dir(dir: &Path, name: &str, _max_length: usize) -> Result<Self> {
            Err(GraphRagError::model(format!(
                "Cannot load {} from {}: built without the `onnx` feature",
                name,
                dir.display()
            )))
        }
    }

    impl InferenceModel for OnnxEmbeddingModel {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(GraphRagError::model("no inference backend compiled in"))
        }

        fn name(&self) -> &str {
            "none"
        }
    }
}
