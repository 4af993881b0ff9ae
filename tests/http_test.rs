//! End-to-end tests for the HTTP surface.
//!
//! Drives the axum router in-process:
//!   request → readiness check → validation → embedder → response
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use embedserve::embedder::mock::MockEmbedder;
use embedserve::embedder::{Embedder, EmbedderError};
use embedserve::server::{ModelState, router};
use serde_json::Value;
use tower::ServiceExt;

/// Fails every call, counting how often it was invoked.
#[derive(Default)]
struct FailingEmbedder {
    calls: AtomicUsize,
}

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f64>, EmbedderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbedderError::InferenceFailed("out of memory".to_string()))
    }

    fn dimensions(&self) -> usize {
        384
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Panics on the first call, then behaves like a mock.
#[derive(Default)]
struct PanicOnceEmbedder {
    calls: AtomicUsize,
}

impl Embedder for PanicOnceEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("model crashed");
        }
        MockEmbedder::new(16).embed(text)
    }

    fn dimensions(&self) -> usize {
        16
    }

    fn model_name(&self) -> &str {
        "panic-once"
    }
}

/// Returns a vector with a NaN component.
struct NanEmbedder;

impl Embedder for NanEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f64>, EmbedderError> {
        Ok(vec![0.5, f64::NAN])
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "nan"
    }
}

fn embed_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate_embedding")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(state: &ModelState, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn mock_state() -> ModelState {
    ModelState::loaded(Arc::new(MockEmbedder::new(384)))
}

#[tokio::test]
async fn test_hello_world_returns_bare_array() {
    let (status, body) = send(&mock_state(), embed_request(r#"{"text": "hello world"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    let values = body.as_array().expect("body should be a bare JSON array");
    assert_eq!(values.len(), 384);
    for v in values {
        let f = v.as_f64().expect("every element should be a number");
        assert!(f.is_finite());
    }
}

#[tokio::test]
async fn test_response_is_verbatim_model_output() {
    let model = MockEmbedder::new(384);
    let expected = model.embed("Пример текста для обработки").unwrap();

    let (status, body) = send(
        &mock_state(),
        embed_request(r#"{"text": "Пример текста для обработки"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let got: Vec<f64> = serde_json::from_value(body).unwrap();
    assert_eq!(got.len(), expected.len());
    for (g, e) in got.iter().zip(&expected) {
        assert!((g - e).abs() < 1e-12, "got {g}, expected {e}");
    }
}

#[tokio::test]
async fn test_identical_text_gives_identical_vectors() {
    let state = mock_state();
    let (_, a) = send(&state, embed_request(r#"{"text": "same input"}"#)).await;
    let (_, b) = send(&state, embed_request(r#"{"text": "same input"}"#)).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_whitespace_text_is_400_without_calling_model() {
    let failing = Arc::new(FailingEmbedder::default());
    let state = ModelState::loaded(failing.clone());

    for body in [
        r#"{"text": "   "}"#,
        r#"{"text": ""}"#,
        r#"{"text": "\n\t"}"#,
        r#"{"text": "\u001f\u001c"}"#,
    ] {
        let (status, json) = send(&state, embed_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.contains("empty"), "detail: {detail}");
    }

    assert_eq!(failing.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_text_field_is_400() {
    let (status, json) = send(&mock_state(), embed_request("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].is_string());
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let (status, _) = send(&mock_state(), embed_request("{\"text\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_string_text_is_400() {
    let (status, _) = send(&mock_state(), embed_request(r#"{"text": 42}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unloaded_model_is_503_for_any_input() {
    let state = ModelState::unloaded();

    for body in [r#"{"text": "hello"}"#, r#"{"text": "  "}"#, "{}"] {
        let (status, json) = send(&state, embed_request(body)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "body: {body}");
        assert_eq!(json["detail"], "model is not loaded");
    }
}

#[tokio::test]
async fn test_state_becomes_ready_after_initialize() {
    let state = ModelState::unloaded();
    let (status, _) = send(&state, embed_request(r#"{"text": "hi"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.initialize(Arc::new(MockEmbedder::new(8))).unwrap();
    let (status, body) = send(&state, embed_request(r#"{"text": "hi"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_model_error_is_500_with_detail() {
    let state = ModelState::loaded(Arc::new(FailingEmbedder::default()));
    let (status, json) = send(&state, embed_request(r#"{"text": "hello"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.contains("out of memory"), "detail: {detail}");
}

#[tokio::test]
async fn test_model_panic_is_500_and_service_recovers() {
    let state = ModelState::loaded(Arc::new(PanicOnceEmbedder::default()));

    let (status, json) = send(&state, embed_request(r#"{"text": "first"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["detail"].is_string());

    let (status, body) = send(&state, embed_request(r#"{"text": "second"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn test_non_finite_output_is_500() {
    let state = ModelState::loaded(Arc::new(NanEmbedder));
    let (status, json) = send(&state, embed_request(r#"{"text": "hello"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["detail"].as_str().unwrap().contains("non-finite"));
}

#[tokio::test]
async fn test_health_reflects_readiness() {
    let health = || {
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&ModelState::unloaded(), health()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, json) = send(&mock_state(), health()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["model"], "mock");
    assert_eq!(json["dimensions"], 384);
}

#[tokio::test]
async fn test_get_on_embedding_route_is_405() {
    let req = Request::builder()
        .uri("/generate_embedding")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&mock_state(), req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_model() {
    let state = mock_state();
    let model = MockEmbedder::new(384);

    let mut requests = tokio::task::JoinSet::new();
    for i in 0..32 {
        let state = state.clone();
        requests.spawn(async move {
            let text = format!("concurrent request {i}");
            let body = serde_json::json!({ "text": text }).to_string();
            let (status, json) = send(&state, embed_request(&body)).await;
            (text, status, json)
        });
    }

    let mut completed = 0;
    while let Some(joined) = requests.join_next().await {
        let (text, status, json) = joined.unwrap();
        assert_eq!(status, StatusCode::OK, "text: {text}");

        let got: Vec<f64> = serde_json::from_value(json).unwrap();
        let expected = model.embed(&text).unwrap();
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).abs() < 1e-12, "text: {text}");
        }
        completed += 1;
    }

    assert_eq!(completed, 32);
}
