use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blockchain_vuln_analyzer::config;
use blockchain_vuln_analyzer::server::{run_server, RequestsLoggingLevel};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path))
}

#[derive(Parser, Debug)]
#[clap(version, about = "HTTP and MCP front end for smart-contract analysis tools")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The address to bind.
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Wall-clock budget in seconds for tools without their own timeout.
    #[clap(long, default_value_t = 300)]
    pub default_timeout_secs: u64,

    /// Maximum number of analysis processes running at once.
    #[clap(long, default_value_t = 4)]
    pub max_concurrent_runs: usize,

    /// Seconds between progress heartbeats of streamed analyses.
    #[clap(long, default_value_t = 5)]
    pub heartbeat_interval_secs: u64,

    /// Keep at most this many results, evicting the oldest finished ones.
    #[clap(long)]
    pub max_stored_results: Option<usize>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            host: args.host.clone(),
            port: args.port,
            logging_level: args.logging_level.clone(),
            default_timeout_secs: args.default_timeout_secs,
            max_concurrent_runs: args.max_concurrent_runs,
            heartbeat_interval_secs: args.heartbeat_interval_secs,
            max_stored_results: args.max_stored_results,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  listen: {}:{}", app_config.host, app_config.port);
    info!("  requests logging: {}", app_config.logging_level);
    info!("  default timeout: {}s", app_config.default_timeout_secs);
    info!("  max concurrent runs: {}", app_config.max_concurrent_runs);
    match app_config.max_stored_results {
        Some(max) => info!("  stored results: at most {}", max),
        None => info!("  stored results: unbounded"),
    }

    let orchestrator = Arc::new(app_config.build_orchestrator()?);
    for descriptor in orchestrator.registry().list() {
        info!("Tool available: {}", descriptor.name);
    }

    run_server(app_config.server_config(), orchestrator).await
}
