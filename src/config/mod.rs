mod file_config;

pub use file_config::{FileConfig, ToolFileConfig};

use crate::analysis::{
    Orchestrator, OrchestratorSettings, ProcessInvoker, ResultStore, ToolOverride, ToolRegistry,
};
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub default_timeout_secs: u64,
    pub max_concurrent_runs: usize,
    pub heartbeat_interval_secs: u64,
    pub max_stored_results: Option<usize>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            logging_level: RequestsLoggingLevel::Path,
            default_timeout_secs: 300,
            max_concurrent_runs: 4,
            heartbeat_interval_secs: 5,
            max_stored_results: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub default_timeout_secs: u64,
    pub max_concurrent_runs: usize,
    pub heartbeat_interval_secs: u64,
    pub max_stored_results: Option<usize>,
    pub tools: BTreeMap<String, ToolFileConfig>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let default_timeout_secs = file
            .default_timeout_secs
            .unwrap_or(cli.default_timeout_secs);
        if default_timeout_secs == 0 {
            bail!("default_timeout_secs must be at least 1");
        }

        let max_concurrent_runs = file.max_concurrent_runs.unwrap_or(cli.max_concurrent_runs);
        if max_concurrent_runs == 0 {
            bail!("max_concurrent_runs must be at least 1");
        }

        let heartbeat_interval_secs = file
            .heartbeat_interval_secs
            .unwrap_or(cli.heartbeat_interval_secs);
        if heartbeat_interval_secs == 0 {
            bail!("heartbeat_interval_secs must be at least 1");
        }

        let max_stored_results = file.max_stored_results.or(cli.max_stored_results);
        if max_stored_results == Some(0) {
            bail!("max_stored_results must be at least 1 when set");
        }

        for (name, tool) in &file.tools {
            if tool.command.as_ref().is_some_and(|c| c.is_empty()) {
                bail!("Command for tool '{}' must not be empty", name);
            }
            if tool.timeout_secs == Some(0) {
                bail!("timeout_secs for tool '{}' must be at least 1", name);
            }
        }

        Ok(Self {
            host,
            port,
            logging_level,
            default_timeout_secs,
            max_concurrent_runs,
            heartbeat_interval_secs,
            max_stored_results,
            tools: file.tools,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            max_concurrent_runs: self.max_concurrent_runs,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Builds the orchestrator for the built-in tools with this
    /// configuration's overrides, store bound and limits applied.
    pub fn build_orchestrator(&self) -> Result<Orchestrator> {
        let registry = ToolRegistry::builtin()
            .with_overrides(&self.tool_overrides())
            .context("Invalid tool configuration")?;
        let store = Arc::new(ResultStore::new(self.max_stored_results));
        Ok(Orchestrator::new(
            registry,
            Arc::new(ProcessInvoker),
            store,
            self.orchestrator_settings(),
        ))
    }

    pub fn tool_overrides(&self) -> BTreeMap<String, ToolOverride> {
        self.tools
            .iter()
            .map(|(name, tool)| {
                (
                    name.clone(),
                    ToolOverride {
                        command: tool.command.clone(),
                        timeout: tool.timeout_secs.map(Duration::from_secs),
                        enabled: tool.enabled,
                    },
                )
            })
            .collect()
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
