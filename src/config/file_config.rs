use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub host: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub default_timeout_secs: Option<u64>,
    pub max_concurrent_runs: Option<usize>,
    pub heartbeat_interval_secs: Option<u64>,
    pub max_stored_results: Option<usize>,

    /// Per-tool settings, keyed by tool name (`[tools."slither-analyze"]`).
    pub tools: BTreeMap<String, ToolFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct ToolFileConfig {
    /// Program and leading arguments, e.g. `["python3", "/opt/maian/tool/maian.py"]`.
    pub command: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub enabled: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
