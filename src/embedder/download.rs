//! Model file auto-download from HuggingFace.
//!
//! Downloads the ONNX model and tokenizer files of a sentence-transformers
//! repository if they don't already exist locally.
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Base URL for HuggingFace model files.
const HF_BASE: &str = "https://huggingface.co";

/// Only the connection is bounded; model files are hundreds of MB.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Files required for the embedder, with their paths inside the repository.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Build the download URL of `path` inside the HuggingFace repository `repo`.
#[must_use]
pub fn file_url(repo: &str, path: &str) -> String {
    format!("{HF_BASE}/{repo}/resolve/main/{path}")
}

/// Download model files from HuggingFace if any are missing.
///
/// Creates the model directory if it doesn't exist.
/// Skips individual files that are already present.
pub fn download_model_files(repo: &str, model_dir: &Path) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found, skipping download");
        return Ok(());
    }

    info!("Downloading model files from HuggingFace ({repo}), this is a one-time download");

    let client = http_client()?;

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);

        if dest.exists() {
            info!("File already exists: {filename}");
            continue;
        }

        let url = file_url(repo, url_path);
        info!("Downloading {filename}...");
        download_file(&client, &dest, &url)
            .with_context(|| format!("failed to download {filename}"))?;
        info!("Downloaded {filename}");
    }

    info!("Model download complete");
    Ok(())
}

/// Blocking client shared by all file downloads.
///
/// reqwest's blocking client defaults to a 30 s total timeout that also
/// covers reading the body, which a large `model.onnx` cannot meet.
fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(None)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Download a single file with a progress bar.
///
/// Writes to a `.part` file first so an interrupted download is never
/// mistaken for a complete one.
fn download_file(client: &reqwest::blocking::Client, dest: &Path, url: &str) -> Result<()> {
    let mut resp = client
        .get(url)
        .send()
        .with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
            {
                pb.set_style(style.progress_chars("█▓░"));
            }
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let part = dest.with_extension("part");
    let file = fs::File::create(&part)
        .with_context(|| format!("failed to create file: {}", part.display()))?;

    let mut writer = pb.wrap_write(file);
    resp.copy_to(&mut writer)
        .context("failed to stream response body")?;
    pb.finish_and_clear();

    fs::rename(&part, dest)
        .with_context(|| format!("failed to move download into place: {}", dest.display()))?;

    Ok(())
}
