//! # embedserve - sentence-embedding microservice
//!
//! Loads a pretrained sentence-transformer once at startup and serves
//! `POST /generate_embedding`, which turns a text into its embedding vector.
//!
//! ## Architecture
//!
//! - **[`config`]** - Configuration loading, defaults, and validation
//! - **[`embedder`]** - Text embedding via ONNX Runtime (paraphrase-multilingual-MiniLM-L12-v2),
//!   model download, and a deterministic mock
//! - **[`server`]** - axum router, model readiness state, handlers, and error mapping

pub mod config;
pub mod embedder;
pub mod server;
