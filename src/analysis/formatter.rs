//! Turning captured process output into result fields.
//!
//! Formatting never fails: output that cannot be parsed is kept as raw text and
//! the problem is recorded as an annotation on the result.

use serde_json::Value;
use tracing::debug;

use super::descriptor::ValidatedParams;
use super::error::AnalysisError;
use super::invoker::ProcessOutput;
use super::models::{AnalysisResult, AnalysisStatus, Finding};
use super::scoring;
use super::tools::ToolAdapter;

/// Findings listed in a summary before it is cut short.
const SUMMARY_FINDINGS: usize = 5;

/// Output fields derived from one completed process.
#[derive(Debug, Clone, Default)]
pub struct FormattedOutput {
    pub success: bool,
    pub findings: Vec<Finding>,
    pub raw_output: String,
    pub structured_output: Option<Value>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub annotations: Vec<String>,
    pub risk_score: u8,
}

pub fn format_output(
    adapter: &dyn ToolAdapter,
    params: &ValidatedParams,
    output: &ProcessOutput,
) -> FormattedOutput {
    let mut formatted = FormattedOutput {
        raw_output: output.stdout.clone(),
        stderr: Some(output.stderr.clone()).filter(|s| !s.trim().is_empty()),
        exit_code: output.exit_code,
        ..Default::default()
    };
    let has_output = !output.stdout.trim().is_empty();

    if adapter.expects_json(params) {
        match parse_json_document(&output.stdout) {
            Ok(value) => {
                formatted.success = output.exited_cleanly() || adapter.lenient_exit();
                formatted.findings = adapter.findings_from_json(&value);
                formatted.structured_output = Some(value);
            }
            Err(reason) => {
                let annotation = AnalysisError::ParseFailure(reason).to_string();
                debug!("{}: {}", adapter.descriptor().name, annotation);
                formatted.annotations.push(annotation);
                formatted.success = output.exited_cleanly();
                formatted.findings = adapter.findings_from_text(&output.stdout);
            }
        }
    } else {
        formatted.success = output.exited_cleanly() || (adapter.lenient_exit() && has_output);
        formatted.findings = adapter.findings_from_text(&output.stdout);
    }

    formatted.risk_score = if formatted.success {
        adapter.risk_score(&formatted)
    } else {
        scoring::FAILED_SCORE
    };
    formatted
}

/// Parses stdout as one JSON document. Tools sometimes print banner lines
/// around the document, so the outermost object is tried as a fallback.
fn parse_json_document(stdout: &str) -> Result<Value, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err("no output to parse".to_string());
    }
    let first_error = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }
    Err(first_error)
}

/// Human-readable account of a result, used as the text content of protocol
/// responses.
pub fn summarize(result: &AnalysisResult) -> String {
    let mut text = match result.status {
        AnalysisStatus::Completed => format!(
            "{} analysis completed. Found {} potential issue{}.\n\nAnalysis ID: {}\n",
            result.tool,
            result.findings.len(),
            if result.findings.len() == 1 { "" } else { "s" },
            result.analysis_id
        ),
        AnalysisStatus::Failed => {
            return format!(
                "{} analysis failed: {}\n\nAnalysis ID: {}\n",
                result.tool,
                result.error.as_deref().unwrap_or("unknown error"),
                result.analysis_id
            )
        }
        status => {
            return format!(
                "{} analysis is {}.\n\nAnalysis ID: {}\n",
                result.tool,
                status.as_str(),
                result.analysis_id
            )
        }
    };

    if let Some(score) = result.risk_score {
        text.push_str(&format!("Risk score: {}/100\n", score));
    }

    if result.findings.is_empty() {
        text.push_str("\nNo vulnerabilities detected.");
    } else {
        text.push_str("\nFindings:\n");
        for (i, finding) in result.findings.iter().take(SUMMARY_FINDINGS).enumerate() {
            text.push_str(&format!(
                "{}. [{:?}] {}: {}\n",
                i + 1,
                finding.severity,
                finding.title,
                first_line(&finding.description)
            ));
        }
        if result.findings.len() > SUMMARY_FINDINGS {
            text.push_str(&format!(
                "... and {} more. See full results in analysis://{}",
                result.findings.len() - SUMMARY_FINDINGS,
                result.analysis_id
            ));
        }
    }

    for annotation in &result.annotations {
        text.push_str(&format!("\nNote: {}", annotation));
    }
    text
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
