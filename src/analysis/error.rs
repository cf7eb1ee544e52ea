//! Analysis error taxonomy.

use thiserror::Error;

/// Errors surfaced by the analysis core.
///
/// `InvalidRequest`, `UnknownTool` and `InvalidParameters` are detected before any
/// process is spawned and reach the caller directly. `ExecutionFailure` and
/// `Timeout` never escape the orchestrator: they end up recorded in a `failed`
/// result. `ParseFailure` is only ever an annotation on a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters: {}", .0.join("; "))]
    InvalidParameters(Vec<String>),

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Could not parse tool output: {0}")]
    ParseFailure(String),

    #[error("Analysis result not found: {0}")]
    NotFound(String),
}

impl AnalysisError {
    /// Stable machine-readable kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidRequest(_) => "invalid_request",
            AnalysisError::UnknownTool(_) => "unknown_tool",
            AnalysisError::InvalidParameters(_) => "invalid_parameters",
            AnalysisError::ExecutionFailure(_) => "execution_failure",
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::ParseFailure(_) => "parse_failure",
            AnalysisError::NotFound(_) => "not_found",
        }
    }

    /// Every violated constraint, for `InvalidParameters`.
    pub fn violations(&self) -> &[String] {
        match self {
            AnalysisError::InvalidParameters(violations) => violations,
            _ => &[],
        }
    }
}
