//! `FastEmbed`-backed [`Embedder`] implementation.

use crate::vector::Embedder;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use kodit_core::error::{Error, Result};
use std::sync::Mutex;

/// A conservative per-call character budget shared by every `FastEmbed`
/// model this workspace uses — matches `Config::DEFAULT_BATCHER_MAX_CHARS`.
const DEFAULT_CAPACITY: usize = 16_000;

/// Wraps a single `fastembed` ONNX model behind a mutex (the underlying
/// session is not `Sync`). One instance is constructed per embedding type
/// (`code`, `summary`), each pointed at its own configured model name.
pub struct FastEmbedEmbedder {
    model: Mutex<TextEmbedding>,
    name: String,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedEmbedder")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl FastEmbedEmbedder {
    /// Load the model named `model_name` (one of the well-known names
    /// [`Config::code_embedding_model`]/[`Config::summary_embedding_model`]
    /// configure). Returns an error for names this workspace doesn't map to
    /// a known `fastembed` model.
    ///
    /// [`Config::code_embedding_model`]: kodit_core::config::Config
    /// [`Config::summary_embedding_model`]: kodit_core::config::Config
    pub fn load(model_name: &str) -> Result<Self> {
        let (model, dimension) = resolve_model(model_name)?;
        let options = InitOptions::new(model).with_show_download_progress(false);
        let text_embedding = TextEmbedding::try_new(options)
            .map_err(|e| Error::TransientProvider(format!("failed to load {model_name}: {e}")))?;

        tracing::info!(model = model_name, dimension, "fastembed model loaded");

        Ok(Self { model: Mutex::new(text_embedding), name: model_name.to_owned(), dimension })
    }
}

fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    match name {
        "jinaai/jina-embeddings-v2-base-code" => Ok((EmbeddingModel::JinaEmbeddingsV2BaseCode, 768)),
        "BAAI/bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "BAAI/bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "sentence-transformers/all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        other => Err(Error::InvalidInput(format!("unrecognized embedding model {other:?}"))),
    }
}

impl Embedder for FastEmbedEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self
            .model
            .lock()
            .map_err(|_| Error::Internal("fastembed lock poisoned".to_owned()))?;
        let vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::TransientProvider(format!("fastembed embed failed: {e}")))?;
        for v in &vectors {
            if v.len() != self.dimension {
                return Err(Error::DimensionMismatch { expected: self.dimension, actual: v.len() });
            }
        }
        Ok(vectors)
    }

    fn capacity(&self) -> usize {
        DEFAULT_CAPACITY
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_model_rejects_unknown_names() {
        assert!(resolve_model("not-a-real-model").is_err());
    }

    #[test]
    fn resolve_model_maps_configured_defaults() {
        assert!(resolve_model("jinaai/jina-embeddings-v2-base-code").is_ok());
        assert!(resolve_model("BAAI/bge-small-en-v1.5").is_ok());
    }
}
