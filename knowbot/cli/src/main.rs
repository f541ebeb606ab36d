//! Knowbot - Terminal Chat Surface
//!
//! A line-based REPL over the knowbot core: type a question, watch the answer
//! stream in, and see the sources it cites.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (~/.config/knowbot/knowbot.toml if present)
//! knowbot
//!
//! # Point at another service
//! knowbot --endpoint https://bot.example.com/api/chat
//!
//! # Verbose logging (written to stderr)
//! RUST_LOG=knowbot_core=debug knowbot
//! ```

mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use knowbot_core::{
    default_config_path, load_config_from_path, ChatSession, ConfigOverrides, HttpBackend,
};
use tracing::info;

/// Knowbot - ask questions about your documentation
#[derive(Parser, Debug)]
#[command(name = "knowbot")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "KNOWBOT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Completion service URL
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Completion model
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Vector index namespace
    #[arg(short = 'n', long, value_name = "NAME")]
    namespace: Option<String>,

    /// Longest silence between streamed chunks, in seconds
    #[arg(short = 't', long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "KNOWBOT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref endpoint) = self.endpoint {
            overrides = overrides.with_endpoint(endpoint.clone());
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_completion_model(model.clone());
        }
        if let Some(ref namespace) = self.namespace {
            overrides = overrides.with_namespace(namespace.clone());
        }
        if let Some(secs) = self.timeout {
            overrides = overrides.with_read_timeout_secs(secs);
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with the streamed answer.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("knowbot={level},knowbot_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        endpoint = %config.service.endpoint,
        source = %config.source(),
        "Configuration loaded"
    );

    let backend = HttpBackend::from_config(&config.service)
        .context("Failed to create completion backend")?;
    let session = ChatSession::new(Arc::new(backend), Arc::new(config));

    repl::run(session).await
}
