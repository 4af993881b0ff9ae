//! ONNX Runtime embedder using the `ort` crate.
//!
//! Loads a sentence-transformer ONNX export, runs inference, applies mean
//! pooling with the attention mask and, when configured, L2-normalizes the
//! result.
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info, warn};

use super::tokenizer::BertTokenizer;
use super::{Embedder, EmbedderError};
use crate::config::ModelConfig;

/// Text embedded once at load time to learn the output dimensionality.
const WARM_UP_TEXT: &str = "warm up";

/// ONNX-backed embedder implementing the `Embedder` trait.
///
/// `Session::run` needs exclusive access, so concurrent requests are
/// serialized on the session mutex.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    name: String,
    dimensions: usize,
    normalize: bool,
}

impl OnnxEmbedder {
    /// Create a new `OnnxEmbedder` by loading a model from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`. One warm-up
    /// inference fixes `dimensions()` to the model's real output length; a
    /// model that cannot embed the warm-up text fails the load.
    pub fn new(model_dir: &Path, config: &ModelConfig) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(config.threads)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        info!("ONNX model loaded from {}", model_path.display());

        let tokenizer = BertTokenizer::from_model_dir(model_dir, config.max_length)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        info!("Tokenizer loaded (vocab size: {})", tokenizer.vocab_size());

        let mut embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            name: config.name.clone(),
            dimensions: config.dimensions,
            normalize: config.normalize,
        };

        let dimensions = embedder
            .pooled(WARM_UP_TEXT)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("warm-up inference: {e}")))?
            .len();
        if dimensions != config.dimensions {
            warn!(
                "model outputs {dimensions} dimensions, config says {}; using the model's",
                config.dimensions
            );
        }
        embedder.dimensions = dimensions;

        Ok(embedder)
    }

    /// Tokenize, run the session, and pool the hidden states of `text`.
    fn pooled(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbedderError::TokenizerError(format!("tokenization failed: {e}")))?;

        let seq_len = tokens.input_ids.len();
        debug!(seq_len, "running inference");

        // (shape, data) tuple form avoids ndarray version coupling with ort
        let input_ids_val = Tensor::from_array(([1usize, seq_len], tokens.input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val =
            Tensor::from_array(([1usize, seq_len], tokens.attention_mask.clone())).map_err(
                |e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")),
            )?;
        let token_type_ids_val = Tensor::from_array(([1usize, seq_len], tokens.token_type_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = lock_session(&self.session);
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        if outputs.len() == 0 {
            return Err(EmbedderError::InferenceFailed(
                "model produced no outputs".to_string(),
            ));
        }

        let (shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let hidden_size = check_output_shape(shape, hidden_data.len(), seq_len)?;

        let mut embedding = mean_pooling(
            hidden_data,
            &tokens.attention_mask,
            seq_len,
            hidden_size,
        );

        if self.normalize {
            embedding = l2_normalize(&embedding);
        }

        Ok(embedding)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedderError> {
        let embedding = self.pooled(text)?;
        Ok(embedding.into_iter().map(f64::from).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Lock the session, recovering from poisoning.
///
/// A failed `run` leaves the session usable, so one panicking request must
/// not turn every later request into an error.
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Check that the output is `[1, seq_len, hidden_size]` and fully populated.
///
/// Returns `hidden_size`.
fn check_output_shape(
    shape: &[i64],
    data_len: usize,
    seq_len: usize,
) -> Result<usize, EmbedderError> {
    let [batch, tokens, hidden] = shape else {
        return Err(EmbedderError::InferenceFailed(format!(
            "unexpected output shape {shape:?}, expected [1, seq_len, hidden_size]"
        )));
    };

    if *batch != 1 || *tokens != seq_len as i64 || *hidden <= 0 {
        return Err(EmbedderError::InferenceFailed(format!(
            "unexpected output shape {shape:?} for {seq_len} tokens"
        )));
    }

    let hidden_size = *hidden as usize;
    if data_len != seq_len * hidden_size {
        return Err(EmbedderError::InferenceFailed(format!(
            "output holds {data_len} values, shape {shape:?} needs {}",
            seq_len * hidden_size
        )));
    }

    Ok(hidden_size)
}


/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[1, seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            let idx = t * hidden_size + h;
            result[h] += hidden_data[idx] * mask;
        }
    }

    // sentence-transformers clamps the divisor at 1e-9
    let denom = mask_sum.max(1e-9);
    for v in &mut result {
        *v /= denom;
    }

    result
}

/// L2-normalize a vector, returning the normalized copy.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}
