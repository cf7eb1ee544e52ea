//! The set of tools the service can run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, warn};

use super::descriptor::ToolDescriptor;
use super::error::AnalysisError;
use super::tools::{builtin_tools, ToolAdapter};

/// Deployment-specific adjustments for one tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOverride {
    /// Replaces the default command vector, e.g. `["/opt/maian/venv/bin/python", "maian.py"]`.
    pub command: Option<Vec<String>>,
    pub timeout: Option<Duration>,
    /// Disabled tools are neither listed nor runnable.
    pub enabled: Option<bool>,
}

/// A tool as configured for this deployment.
pub struct RegisteredTool {
    adapter: Arc<dyn ToolAdapter>,
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl RegisteredTool {
    pub fn descriptor(&self) -> &ToolDescriptor {
        self.adapter.descriptor()
    }

    pub fn adapter(&self) -> &dyn ToolAdapter {
        self.adapter.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.descriptor().name
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Configured timeout for this tool, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Immutable, insertion-ordered registry of tools.
pub struct ToolRegistry {
    tools: Vec<Arc<RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new(adapters: Vec<Arc<dyn ToolAdapter>>) -> Self {
        let tools = adapters
            .into_iter()
            .map(|adapter| {
                Arc::new(RegisteredTool {
                    command: anchor_to_startup_dir(adapter.default_command()),
                    adapter,
                    timeout: None,
                })
            })
            .collect();
        Self { tools }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_tools())
    }

    /// Applies per-tool overrides. Overrides naming unknown tools or giving an
    /// empty command are configuration errors.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, ToolOverride>) -> Result<Self> {
        for (name, tool_override) in overrides {
            let Some(pos) = self.tools.iter().position(|t| t.name() == name) else {
                bail!("Configuration overrides unknown tool '{}'", name);
            };
            if tool_override.enabled == Some(false) {
                info!("Tool {} disabled by configuration", name);
                self.tools.remove(pos);
                continue;
            }

            let current = &self.tools[pos];
            let command = match &tool_override.command {
                Some(command) if command.is_empty() => {
                    bail!("Configured command for tool '{}' is empty", name)
                }
                Some(command) => anchor_to_startup_dir(command.clone()),
                None => current.command.clone(),
            };
            info!("Tool {} runs as {:?}", name, command);
            self.tools[pos] = Arc::new(RegisteredTool {
                adapter: current.adapter.clone(),
                command,
                timeout: tool_override.timeout.or(current.timeout),
            });
        }
        Ok(self)
    }

    /// Descriptors of all available tools, in registration order.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<RegisteredTool>, AnalysisError> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| AnalysisError::UnknownTool(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Tools run inside a per-request temp directory, so relative paths in a
/// command (`./bin/slither`, `maian.py`) are pinned to the directory the
/// service started in.
fn anchor_to_startup_dir(command: Vec<String>) -> Vec<String> {
    match std::env::current_dir() {
        Ok(base) => anchor_command(command, &base),
        Err(e) => {
            warn!("Cannot resolve working directory, keeping relative tool paths: {}", e);
            command
        }
    }
}

fn anchor_command(command: Vec<String>, base: &Path) -> Vec<String> {
    command
        .into_iter()
        .enumerate()
        .map(|(i, element)| {
            if is_relative_path(&element, i == 0) {
                base.join(&element).to_string_lossy().into_owned()
            } else {
                element
            }
        })
        .collect()
}

/// A bare program name is looked up on `PATH` and left alone. Arguments count
/// as paths when they have a separator or a file extension.
fn is_relative_path(element: &str, is_program: bool) -> bool {
    let path = Path::new(element);
    if element.is_empty() || element.starts_with('-') || path.is_absolute() {
        return false;
    }
    let has_separator = element.contains(std::path::MAIN_SEPARATOR) || element.contains('/');
    if is_program {
        has_separator
    } else {
        has_separator || path.extension().is_some()
    }
}
