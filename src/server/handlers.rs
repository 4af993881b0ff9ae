//! HTTP handlers.
//!
//! `POST /generate_embedding` is the service's only operation; `GET /health`
//! reports readiness for orchestrators.
use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use super::error::ApiError;
use super::state::ModelState;

/// Request body of `POST /generate_embedding`.
#[derive(Debug, Deserialize)]
pub struct TextInput {
    /// Text to embed
    pub text: String,
}

/// Embed `text` and return the vector as a bare JSON array.
///
/// Readiness is checked before the body, so an unloaded service answers 503
/// whatever the input. Model failures and panics become 500 and never take
/// the process down.
pub async fn generate_embedding(
    State(state): State<ModelState>,
    payload: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<Vec<f64>>, ApiError> {
    let model = state.get().ok_or(ApiError::ServiceUnavailable)?;

    let Json(input) = payload.map_err(|rejection| {
        warn!("rejected request body: {}", rejection.body_text());
        ApiError::InvalidInput(rejection.body_text())
    })?;

    if is_blank(&input.text) {
        return Err(ApiError::InvalidInput("text must not be empty".to_string()));
    }

    debug!(chars = input.text.chars().count(), "generating embedding");

    let embedding = tokio::task::spawn_blocking(move || model.embed(&input.text))
        .await
        .map_err(|e| {
            error!("embedding task aborted: {e}");
            ApiError::Internal(format!("inference task aborted: {e}"))
        })?
        .map_err(|e| {
            error!("embedding generation failed: {e}");
            ApiError::Internal(e.to_string())
        })?;

    // JSON has no representation for NaN or infinity
    if embedding.iter().any(|v| !v.is_finite()) {
        error!("model returned non-finite values");
        return Err(ApiError::Internal(
            "embedding contains non-finite values".to_string(),
        ));
    }

    Ok(Json(embedding))
}

/// True when `text` holds only whitespace.
///
/// Besides Unicode whitespace this also treats the ASCII information
/// separators U+001C..=U+001F as blank, as Python's `str.strip` does.
fn is_blank(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c))
}

/// Readiness probe: 200 with model info when loaded, 503 otherwise.
pub async fn health(State(state): State<ModelState>) -> impl IntoResponse {
    match state.get() {
        Some(model) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "model": model.model_name(),
                "dimensions": model.dimensions(),
            })),
        )
            .into_response(),
        None => ApiError::ServiceUnavailable.into_response(),
    }
}
