use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blockchain_vuln_analyzer::config;
use blockchain_vuln_analyzer::mcp::{create_mcp_state, serve_stdio};

/// MCP server on stdin/stdout, for clients that launch the analyzer as a
/// subprocess.
#[derive(Parser, Debug)]
#[clap(version)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Wall-clock budget in seconds for tools without their own timeout.
    #[clap(long, default_value_t = 300)]
    pub default_timeout_secs: u64,

    /// Maximum number of analysis processes running at once.
    #[clap(long, default_value_t = 4)]
    pub max_concurrent_runs: usize,

    /// Keep at most this many results, evicting the oldest finished ones.
    #[clap(long)]
    pub max_stored_results: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // stdout carries protocol frames, logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config = config::CliConfig {
        default_timeout_secs: cli_args.default_timeout_secs,
        max_concurrent_runs: cli_args.max_concurrent_runs,
        max_stored_results: cli_args.max_stored_results,
        ..Default::default()
    };
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    let orchestrator = Arc::new(app_config.build_orchestrator()?);
    let mcp_state = Arc::new(create_mcp_state(orchestrator));

    serve_stdio(mcp_state).await
}
