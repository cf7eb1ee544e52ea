//! Request, result and progress types shared by both request surfaces.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::AnalysisError;

/// Tools run by a batch request that does not name any.
pub const DEFAULT_BATCH_TOOLS: [&str; 2] = ["slither-analyze", "mythril-analyze"];

// ============================================================================
// Requests
// ============================================================================

/// A single-tool analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Inline Solidity source.
    #[serde(default, alias = "source", skip_serializing_if = "Option::is_none")]
    pub contract_code: Option<String>,
    /// Path to a contract on the server's filesystem.
    #[serde(default, alias = "file_path", skip_serializing_if = "Option::is_none")]
    pub contract_file: Option<String>,
    pub tool: String,
    /// Tool-specific parameters, validated against the tool's descriptor.
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Where the contract under analysis comes from. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Inline(String),
    File(PathBuf),
}

impl AnalysisRequest {
    pub fn inline(tool: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            contract_code: Some(code.into()),
            tool: tool.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    /// Resolves the source specification. Empty strings count as absent.
    pub fn source(&self) -> Result<SourceSpec, AnalysisError> {
        let code = self.contract_code.as_deref().filter(|c| !c.trim().is_empty());
        let file = self.contract_file.as_deref().filter(|f| !f.trim().is_empty());

        match (code, file) {
            (Some(code), None) => Ok(SourceSpec::Inline(code.to_string())),
            (None, Some(file)) => {
                let path = PathBuf::from(file);
                if !path.is_file() {
                    return Err(AnalysisError::InvalidRequest(format!(
                        "Contract file not found: {}",
                        file
                    )));
                }
                Ok(SourceSpec::File(path))
            }
            (Some(_), Some(_)) => Err(AnalysisError::InvalidRequest(
                "Provide either contract_code or contract_file, not both".to_string(),
            )),
            (None, None) => Err(AnalysisError::InvalidRequest(
                "Either contract_code or contract_file must be provided".to_string(),
            )),
        }
    }
}

/// A request to run several tools against the same source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default, alias = "source", skip_serializing_if = "Option::is_none")]
    pub contract_code: Option<String>,
    #[serde(default, alias = "file_path", skip_serializing_if = "Option::is_none")]
    pub contract_file: Option<String>,
    #[serde(default = "default_batch_tools")]
    pub tools: Vec<String>,
    /// Per-tool options, keyed by tool name.
    #[serde(default)]
    pub options: HashMap<String, Map<String, Value>>,
}

fn default_batch_tools() -> Vec<String> {
    DEFAULT_BATCH_TOOLS.iter().map(|t| t.to_string()).collect()
}

impl BatchRequest {
    /// Splits the batch into one request per tool, in the caller's order.
    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.tools
            .iter()
            .map(|tool| AnalysisRequest {
                contract_code: self.contract_code.clone(),
                contract_file: self.contract_file.clone(),
                tool: tool.clone(),
                options: self.options.get(tool).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
    Informational,
    Optimization,
    Unknown,
}

impl Severity {
    /// Maps the spellings used by slither ("High", "Informational") and mythril
    /// ("High", "Medium", "Low") onto the common scale.
    pub fn parse_loose(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "informational" | "info" => Severity::Informational,
            "optimization" => Severity::Optimization,
            _ => Severity::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<u32>,
}

/// One reported issue, normalized across tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// The stored outcome of one orchestrated run of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub tool: String,
    pub status: AnalysisStatus,
    pub success: bool,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
    pub raw_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal notes, e.g. output that could not be parsed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
    /// The validated parameters the tool ran with, defaults included.
    pub parameters: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisResult {
    pub fn pending(
        analysis_id: impl Into<String>,
        tool: impl Into<String>,
        parameters: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            tool: tool.into(),
            status: AnalysisStatus::Pending,
            success: false,
            findings: Vec::new(),
            risk_score: None,
            raw_output: String::new(),
            structured_output: None,
            stderr: None,
            exit_code: None,
            error: None,
            annotations: Vec::new(),
            parameters,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ============================================================================
// Progress
// ============================================================================

/// One unit of a streamed single-tool run.
///
/// A stream is always `starting`, one or more `running`, `result`, `complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressEvent {
    Starting {
        tool: String,
    },
    Running {
        tool: String,
        message: String,
        elapsed_secs: u64,
    },
    Result {
        analysis_id: String,
        payload: Box<AnalysisResult>,
    },
    Complete {
        analysis_id: String,
        status: AnalysisStatus,
    },
}

impl ProgressEvent {
    pub fn phase(&self) -> &'static str {
        match self {
            ProgressEvent::Starting { .. } => "starting",
            ProgressEvent::Running { .. } => "running",
            ProgressEvent::Result { .. } => "result",
            ProgressEvent::Complete { .. } => "complete",
        }
    }
}

/// One unit of a streamed batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum BatchProgressEvent {
    Starting {
        total_tools: usize,
    },
    Running {
        tool: String,
        /// 1-based position of the tool in the batch.
        index: usize,
        total: usize,
    },
    ToolResult {
        tool: String,
        payload: Box<AnalysisResult>,
    },
    Complete {
        analysis_ids: Vec<String>,
    },
}

impl BatchProgressEvent {
    pub fn phase(&self) -> &'static str {
        match self {
            BatchProgressEvent::Starting { .. } => "starting",
            BatchProgressEvent::Running { .. } => "running",
            BatchProgressEvent::ToolResult { .. } => "tool_result",
            BatchProgressEvent::Complete { .. } => "complete",
        }
    }
}
