//! Embedder trait and shared types for text embedding.
//!
//! The service treats the model as an opaque `text -> Vec<f64>` function.
//! [`load`] builds the production ONNX embedder from configuration.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::ModelConfig;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` so a single loaded model can be
/// shared behind `Arc` by every in-flight request.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Human-readable model identifier.
    fn model_name(&self) -> &str;
}

/// Load the embedding model described by `config`.
///
/// Downloads missing model files first when `allow_download` is set.
/// Blocking: call from `spawn_blocking` inside an async runtime.
pub fn load(config: &ModelConfig, allow_download: bool) -> anyhow::Result<Arc<dyn Embedder>> {
    let model_dir = config.model_dir();

    if !download::all_files_present(&model_dir) {
        anyhow::ensure!(
            allow_download,
            "model files missing in {} and download is disabled",
            model_dir.display()
        );
        download::download_model_files(&config.repo, &model_dir)?;
    }

    info!("Loading embedding model {}...", config.name);
    let embedder = onnx::OnnxEmbedder::new(&model_dir, config)?;
    info!(
        "Model {} loaded ({} dimensions)",
        embedder.model_name(),
        embedder.dimensions()
    );

    Ok(Arc::new(embedder))
}
