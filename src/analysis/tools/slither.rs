//! Slither static analyzer.

use std::path::Path;

use serde_json::{json, Value};

use super::{path_arg, ToolAdapter};
use crate::analysis::descriptor::{ParamSpec, ToolDescriptor, ValidatedParams};
use crate::analysis::formatter::FormattedOutput;
use crate::analysis::models::{Finding, Location, Severity};
use crate::analysis::scoring;

pub struct SlitherTool {
    descriptor: ToolDescriptor,
}

impl SlitherTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "slither-analyze",
            "Analyze Solidity smart contracts using Slither static analysis framework",
            vec![
                ParamSpec::enumeration(
                    "output_format",
                    "Output format for the analysis results",
                    &["text", "json", "markdown"],
                )
                .default_value(json!("json")),
                ParamSpec::string_list(
                    "exclude_detectors",
                    "List of detector names to exclude from analysis",
                ),
                ParamSpec::string_list(
                    "include_detectors",
                    "List of specific detectors to run (if not specified, runs all)",
                ),
            ],
        );
        Self { descriptor }
    }
}

impl Default for SlitherTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolAdapter for SlitherTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn default_command(&self) -> Vec<String> {
        vec!["slither".to_string()]
    }

    fn build_args(&self, contract: &Path, params: &ValidatedParams) -> Vec<String> {
        let mut args = vec![path_arg(contract)];
        if self.expects_json(params) {
            args.extend(["--json".to_string(), "-".to_string()]);
        }
        let exclude = params.list("exclude_detectors");
        if !exclude.is_empty() {
            args.extend(["--exclude".to_string(), exclude.join(",")]);
        }
        let include = params.list("include_detectors");
        if !include.is_empty() {
            args.extend(["--include".to_string(), include.join(",")]);
        }
        args
    }

    fn expects_json(&self, params: &ValidatedParams) -> bool {
        params.str("output_format").unwrap_or("json") == "json"
    }

    fn lenient_exit(&self) -> bool {
        true
    }

    fn findings_from_json(&self, value: &Value) -> Vec<Finding> {
        detectors(value)
            .iter()
            .map(|detector| Finding {
                title: detector["check"].as_str().unwrap_or("Unknown").to_string(),
                severity: detector["impact"]
                    .as_str()
                    .map(Severity::parse_loose)
                    .unwrap_or(Severity::Unknown),
                description: detector["description"]
                    .as_str()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                location: first_location(detector),
            })
            .collect()
    }

    fn risk_score(&self, output: &FormattedOutput) -> u8 {
        let elements: usize = output
            .structured_output
            .as_ref()
            .map(|value| {
                detectors(value)
                    .iter()
                    .map(|d| d["elements"].as_array().map(Vec::len).unwrap_or(0))
                    .sum()
            })
            .unwrap_or(0);
        scoring::per_item(elements, 5)
    }
}

fn detectors(value: &Value) -> &[Value] {
    value["results"]["detectors"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn first_location(detector: &Value) -> Option<Location> {
    let mapping = &detector["elements"].get(0)?["source_mapping"];
    let file = mapping["filename_relative"]
        .as_str()
        .or_else(|| mapping["filename_short"].as_str())
        .map(str::to_string);
    let lines = mapping["lines"]
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_u64().map(|n| n as u32))
                .collect()
        })
        .unwrap_or_default();
    Some(Location { file, lines })
}
