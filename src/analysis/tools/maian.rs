//! Maian: suicidal, prodigal and greedy contract detection.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use super::{path_arg, ToolAdapter};
use crate::analysis::descriptor::{ParamSpec, ToolDescriptor, ValidatedParams};
use crate::analysis::formatter::FormattedOutput;
use crate::analysis::models::{Finding, Severity};
use crate::analysis::scoring;

lazy_static! {
    // Maian reports confirmed issues on lines starting with "[-]".
    static ref VULNERABLE_LINE: Regex =
        Regex::new(r"(?im)^\s*\[-\]\s*(.*\b(?:vulnerable|vulnerability|found)\b.*)$").unwrap();
}

pub struct MaianTool {
    descriptor: ToolDescriptor,
}

impl MaianTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "maian-analyze",
            "Detect prodigal, suicidal, and greedy vulnerabilities in Ethereum smart contracts using Maian.",
            vec![
                ParamSpec::string(
                    "contract_name",
                    "Main contract name (required for Solidity source analysis)",
                )
                .required(),
                ParamSpec::enumeration(
                    "analysis_type",
                    "Type of vulnerability to check (suicidal, prodigal, greedy)",
                    &["suicidal", "prodigal", "greedy"],
                )
                .default_value(json!("suicidal")),
            ],
        );
        Self { descriptor }
    }

    fn check_flag(analysis_type: &str) -> &'static str {
        match analysis_type {
            "prodigal" => "1",
            "greedy" => "2",
            _ => "0",
        }
    }
}

impl Default for MaianTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolAdapter for MaianTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn default_command(&self) -> Vec<String> {
        vec!["python3".to_string(), "maian.py".to_string()]
    }

    fn build_args(&self, contract: &Path, params: &ValidatedParams) -> Vec<String> {
        let flag = Self::check_flag(params.str("analysis_type").unwrap_or("suicidal"));
        let is_source = contract
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("sol"))
            .unwrap_or(false);

        let mut args = Vec::new();
        if is_source {
            args.extend([
                "-s".to_string(),
                path_arg(contract),
                params.str("contract_name").unwrap_or_default().to_string(),
            ]);
        } else {
            // Anything that is not Solidity source is treated as bytecode.
            args.extend(["-b".to_string(), path_arg(contract)]);
        }
        args.extend(["-c".to_string(), flag.to_string()]);
        args
    }

    fn expects_json(&self, _params: &ValidatedParams) -> bool {
        false
    }

    fn findings_from_text(&self, stdout: &str) -> Vec<Finding> {
        VULNERABLE_LINE
            .captures_iter(stdout)
            .map(|caps| Finding {
                title: caps[1].trim().to_string(),
                severity: Severity::High,
                description: caps[0].trim().to_string(),
                location: None,
            })
            .collect()
    }

    fn risk_score(&self, output: &FormattedOutput) -> u8 {
        scoring::keyword_presence(&output.raw_output, &["vulnerable", "bug"], 80, 40)
    }
}
