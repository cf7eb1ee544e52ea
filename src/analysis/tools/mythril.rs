//! Mythril symbolic execution.

use std::path::Path;

use serde_json::{json, Value};

use super::{path_arg, ToolAdapter};
use crate::analysis::descriptor::{ParamSpec, ToolDescriptor, ValidatedParams};
use crate::analysis::models::{Finding, Location, Severity};

const DEFAULT_MAX_DEPTH: i64 = 12;
const QUICK_MAX_DEPTH: i64 = 3;
const MAX_DEPTH_CEILING: i64 = 50;

pub struct MythrilTool {
    descriptor: ToolDescriptor,
}

impl MythrilTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "mythril-analyze",
            "Analyze Solidity smart contracts using Mythril for security vulnerabilities",
            vec![
                ParamSpec::enumeration(
                    "analysis_mode",
                    "Analysis depth mode",
                    &["quick", "standard", "deep"],
                )
                .default_value(json!("standard")),
                ParamSpec::integer(
                    "max_depth",
                    "Maximum transaction depth for analysis (default: 12)",
                    Some(1),
                    Some(MAX_DEPTH_CEILING),
                )
                .default_value(json!(DEFAULT_MAX_DEPTH)),
            ],
        );
        Self { descriptor }
    }

    /// Effective `--max-depth` for the requested mode.
    fn effective_depth(params: &ValidatedParams) -> i64 {
        let max_depth = params.int("max_depth").unwrap_or(DEFAULT_MAX_DEPTH);
        match params.str("analysis_mode") {
            Some("quick") => QUICK_MAX_DEPTH,
            Some("deep") => (max_depth * 2).min(MAX_DEPTH_CEILING),
            _ => max_depth,
        }
    }
}

impl Default for MythrilTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolAdapter for MythrilTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn default_command(&self) -> Vec<String> {
        vec!["myth".to_string(), "analyze".to_string()]
    }

    fn build_args(&self, contract: &Path, params: &ValidatedParams) -> Vec<String> {
        vec![
            path_arg(contract),
            "-o".to_string(),
            "json".to_string(),
            "--max-depth".to_string(),
            Self::effective_depth(params).to_string(),
        ]
    }

    fn expects_json(&self, _params: &ValidatedParams) -> bool {
        true
    }

    fn lenient_exit(&self) -> bool {
        true
    }

    fn findings_from_json(&self, value: &Value) -> Vec<Finding> {
        let Some(issues) = value["issues"].as_array() else {
            return Vec::new();
        };
        issues
            .iter()
            .map(|issue| {
                let title = issue["title"].as_str().unwrap_or("Unknown");
                let title = match issue["swc-id"].as_str() {
                    Some(swc) if !swc.is_empty() => format!("{} (SWC-{})", title, swc),
                    _ => title.to_string(),
                };
                let location = issue["filename"].as_str().map(|file| Location {
                    file: Some(file.to_string()),
                    lines: issue["lineno"]
                        .as_u64()
                        .map(|n| vec![n as u32])
                        .unwrap_or_default(),
                });
                Finding {
                    title,
                    severity: issue["severity"]
                        .as_str()
                        .map(Severity::parse_loose)
                        .unwrap_or(Severity::Unknown),
                    description: issue["description"]
                        .as_str()
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                    location,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn depth_for(options: Value) -> String {
        let tool = MythrilTool::new();
        let params = tool
            .descriptor()
            .validate(options.as_object().unwrap())
            .unwrap();
        tool.build_args(&PathBuf::from("A.sol"), &params)[4].clone()
    }

    #[test]
    fn analysis_mode_controls_depth() {
        assert_eq!(depth_for(json!({})), "12");
        assert_eq!(depth_for(json!({"analysis_mode": "quick", "max_depth": 20})), "3");
        assert_eq!(depth_for(json!({"analysis_mode": "deep", "max_depth": 10})), "20");
        assert_eq!(depth_for(json!({"analysis_mode": "deep", "max_depth": 40})), "50");
    }

    #[test]
    fn issues_become_findings() {
        let output = json!({
            "error": null,
            "success": true,
            "issues": [{
                "title": "External Call To User-Supplied Address",
                "swc-id": "107",
                "severity": "Low",
                "description": "A call to a user-supplied address is executed.",
                "filename": "Contract.sol",
                "lineno": 7
            }]
        });
        let findings = MythrilTool::new().findings_from_json(&output);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].title,
            "External Call To User-Supplied Address (SWC-107)"
        );
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].location.as_ref().unwrap().lines, vec![7]);
    }

    #[test]
    fn missing_issues_yields_no_findings() {
        assert!(MythrilTool::new()
            .findings_from_json(&json!({"success": true}))
            .is_empty());
    }
}
