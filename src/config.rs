//! Configuration module for embedserve.
//!
//! Handles loading, validating, and providing default configuration values.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Path used when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model_name() -> String {
    "paraphrase-multilingual-MiniLM-L12-v2".to_string()
}

fn default_repo() -> String {
    format!("sentence-transformers/{}", default_model_name())
}

fn default_dimensions() -> usize {
    384
}

fn default_max_length() -> usize {
    128
}

fn default_threads() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Model identifier, reported by `/health`.
    #[serde(default = "default_model_name")]
    pub name: String,

    /// HuggingFace repository the model files are fetched from.
    #[serde(default = "default_repo")]
    pub repo: String,

    /// Local directory holding `model.onnx` and `tokenizer.json`.
    /// Defaults to `models/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Maximum token sequence length; longer inputs are truncated.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// L2-normalize pooled embeddings.
    #[serde(default)]
    pub normalize: bool,

    #[serde(default = "default_true")]
    pub auto_download: bool,

    /// ONNX Runtime intra-op threads.
    #[serde(default = "default_threads")]
    pub threads: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            repo: default_repo(),
            dir: None,
            dimensions: default_dimensions(),
            max_length: default_max_length(),
            normalize: false,
            auto_download: default_true(),
            threads: default_threads(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template to it.
    /// Invalid JSON falls back to defaults with a warning.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.server.port > 0, "server.port must be positive");
        anyhow::ensure!(!self.model.name.is_empty(), "model.name must not be empty");
        anyhow::ensure!(!self.model.repo.is_empty(), "model.repo must not be empty");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            self.model.max_length > 0,
            "model.max_length must be positive"
        );
        anyhow::ensure!(self.model.threads > 0, "model.threads must be positive");
        self.bind_addr()?;
        Ok(())
    }

    /// Socket address the HTTP server binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .with_context(|| format!("invalid bind address: {addr}"))
    }
}

impl ModelConfig {
    /// Select a model by identifier.
    ///
    /// A bare name resolves to the `sentence-transformers` organisation;
    /// `org/name` is used as the repository verbatim. The short name is the
    /// part after the last `/`.
    pub fn set_model(&mut self, id: &str) {
        match id.rsplit_once('/') {
            Some((_, name)) => {
                self.name = name.to_string();
                self.repo = id.to_string();
            }
            None => {
                self.name = id.to_string();
                self.repo = format!("sentence-transformers/{id}");
            }
        }
    }

    /// Directory the model files live in.
    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new("models").join(&self.name),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
