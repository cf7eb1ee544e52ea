//! Wrapped analysis tools.
//!
//! Each tool contributes a [`ToolDescriptor`], the argument vector it needs and
//! the tool-specific half of output parsing. Everything else (validation,
//! spawning, storage) is shared.

mod echidna;
mod maian;
mod manticore;
mod mythril;
mod slither;

pub use echidna::EchidnaTool;
pub use maian::MaianTool;
pub use manticore::ManticoreTool;
pub use mythril::MythrilTool;
pub use slither::SlitherTool;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::descriptor::{ToolDescriptor, ValidatedParams};
use super::formatter::FormattedOutput;
use super::models::Finding;
use super::scoring;

/// Tool-specific behaviour behind a descriptor.
pub trait ToolAdapter: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Program and leading arguments, e.g. `["myth", "analyze"]`.
    fn default_command(&self) -> Vec<String>;

    /// Arguments appended after the default command.
    fn build_args(&self, contract: &Path, params: &ValidatedParams) -> Vec<String>;

    /// Whether stdout is expected to be a JSON document for these parameters.
    fn expects_json(&self, params: &ValidatedParams) -> bool;

    /// Some tools exit non-zero whenever they report findings. For those,
    /// parseable output counts as success regardless of the exit status.
    fn lenient_exit(&self) -> bool {
        false
    }

    fn findings_from_json(&self, _value: &Value) -> Vec<Finding> {
        Vec::new()
    }

    fn findings_from_text(&self, _stdout: &str) -> Vec<Finding> {
        Vec::new()
    }

    /// Pessimistic 0-100 score for a successful run; failed runs score 100.
    fn risk_score(&self, output: &FormattedOutput) -> u8 {
        scoring::severity_weighted(&output.findings)
    }

    /// Wall-clock budget for a run, given the configured default.
    fn time_budget(&self, _params: &ValidatedParams, default: Duration) -> Duration {
        default
    }
}

/// All built-in tools, in the order they are listed to clients.
pub fn builtin_tools() -> Vec<Arc<dyn ToolAdapter>> {
    vec![
        Arc::new(MythrilTool::new()),
        Arc::new(SlitherTool::new()),
        Arc::new(EchidnaTool::new()),
        Arc::new(MaianTool::new()),
        Arc::new(ManticoreTool::new()),
    ]
}

/// Renders a path argument for the child's argv.
fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
