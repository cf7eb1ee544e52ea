//! Manticore symbolic execution.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use super::{path_arg, ToolAdapter};
use crate::analysis::descriptor::{ParamSpec, ToolDescriptor, ValidatedParams};
use crate::analysis::formatter::FormattedOutput;
use crate::analysis::models::{Finding, Severity};
use crate::analysis::scoring;

const RISK_KEYWORDS: [&str; 4] = ["bug", "crash", "vulnerability", "assertion"];

lazy_static! {
    static ref ISSUE_LINE: Regex =
        Regex::new(r"(?im)^.*\b(?:vulnerability|assertion|crash|bug)\b.*$").unwrap();
}

pub struct ManticoreTool {
    descriptor: ToolDescriptor,
}

impl ManticoreTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "manticore-analyze",
            "Symbolically execute smart contracts using Manticore to find vulnerabilities.",
            vec![ParamSpec::string(
                "output_dir",
                "Directory to store Manticore results (optional)",
            )],
        );
        Self { descriptor }
    }
}

impl Default for ManticoreTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolAdapter for ManticoreTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn default_command(&self) -> Vec<String> {
        vec!["manticore".to_string()]
    }

    fn build_args(&self, contract: &Path, params: &ValidatedParams) -> Vec<String> {
        let mut args = vec![path_arg(contract)];
        if let Some(dir) = params.str("output_dir").filter(|d| !d.is_empty()) {
            args.extend(["--workspace".to_string(), dir.to_string()]);
        }
        args
    }

    fn expects_json(&self, _params: &ValidatedParams) -> bool {
        false
    }

    /// Manticore logs warnings and exits non-zero on partial runs that still
    /// produce usable output.
    fn lenient_exit(&self) -> bool {
        true
    }

    fn findings_from_text(&self, stdout: &str) -> Vec<Finding> {
        ISSUE_LINE
            .find_iter(stdout)
            .map(|m| {
                let line = m.as_str().trim();
                Finding {
                    title: line.chars().take(80).collect(),
                    severity: Severity::Medium,
                    description: line.to_string(),
                    location: None,
                }
            })
            .collect()
    }

    fn risk_score(&self, output: &FormattedOutput) -> u8 {
        scoring::keyword_count(&output.raw_output, &RISK_KEYWORDS, 25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn workspace_is_optional() {
        let tool = ManticoreTool::new();
        let none = tool.descriptor().validate(&serde_json::Map::new()).unwrap();
        assert_eq!(tool.build_args(&PathBuf::from("A.sol"), &none), vec!["A.sol"]);

        let with_dir = tool
            .descriptor()
            .validate(json!({"output_dir": "/tmp/mcore"}).as_object().unwrap())
            .unwrap();
        assert_eq!(
            tool.build_args(&PathBuf::from("A.sol"), &with_dir),
            vec!["A.sol", "--workspace", "/tmp/mcore"]
        );
    }

    #[test]
    fn keyword_lines_are_findings() {
        let stdout = "m.main:INFO: Generated testcase\nm.c.manticore:WARNING: Potential reentrancy vulnerability\n";
        let findings = ManticoreTool::new().findings_from_text(stdout);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("reentrancy"));
    }
}
