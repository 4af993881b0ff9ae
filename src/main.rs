use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use embedserve::config::{Config, DEFAULT_CONFIG_PATH};
use embedserve::embedder::{self, Embedder, mock::MockEmbedder};
use embedserve::server::{self, ModelState};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

/// Sentence-embedding HTTP service.
#[derive(Parser, Debug)]
#[command(name = "embedserve", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Model identifier: a sentence-transformers name or an `org/name` repository (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Directory holding model.onnx and tokenizer.json (overrides config)
    #[arg(long)]
    model_dir: Option<String>,

    /// Serve deterministic hash embeddings instead of loading a model
    #[arg(long)]
    mock: bool,

    /// Fail instead of downloading missing model files
    #[arg(long)]
    no_download: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging comes up before config so config loading is visible;
    // the config's level applies only when RUST_LOG and -v are absent.
    let config = init(&cli)?;

    info!("Starting embedserve {}...", env!("CARGO_PKG_VERSION"));

    // The model must be in place before the listener is bound
    let model = match load_model(&cli, &config).await {
        Ok(model) => model,
        Err(e) => {
            error!("Failed to load embedding model: {e:#}");
            return Err(e);
        }
    };
    let state = ModelState::loaded(model);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    server::serve(listener, state).await
}

/// Initialize logging, then load, override, and validate the configuration.
///
/// The subscriber starts at the `RUST_LOG`/`-v`/`info` level so config
/// loading is logged, then switches to the configured level when neither
/// `RUST_LOG` nor `-v` is given.
fn init(cli: &Cli) -> Result<Config> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(log_directive(
        rust_log.as_deref(),
        cli.verbose,
        "info",
    )));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(&cli.config)?;
    filter_handle
        .reload(EnvFilter::new(log_directive(
            rust_log.as_deref(),
            cli.verbose,
            &config.log_level,
        )))
        .context("failed to apply log level")?;

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(model) = &cli.model {
        config.model.set_model(model);
    }
    if let Some(dir) = &cli.model_dir {
        config.model.dir = Some(dir.clone());
    }
    if cli.no_download {
        config.model.auto_download = false;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Log filter directive: `RUST_LOG` wins, then `-v`, then the configured level.
fn log_directive(rust_log: Option<&str>, verbose: u8, configured: &str) -> String {
    match (rust_log, verbose) {
        (Some(directive), _) if !directive.trim().is_empty() => directive.to_string(),
        (_, 0) => configured.to_string(),
        (_, 1) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

async fn load_model(cli: &Cli, config: &Config) -> Result<Arc<dyn Embedder>> {
    if cli.mock {
        info!("Using mock embedder ({} dimensions)", config.model.dimensions);
        return Ok(Arc::new(MockEmbedder::new(config.model.dimensions)));
    }

    let model_config = config.model.clone();
    tokio::task::spawn_blocking(move || {
        embedder::load(&model_config, model_config.auto_download)
    })
    .await
    .context("model loading task panicked")?
}
