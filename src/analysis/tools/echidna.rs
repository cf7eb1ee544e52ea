//! Echidna property-based fuzzer.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};

use super::{path_arg, ToolAdapter};
use crate::analysis::descriptor::{ParamSpec, ToolDescriptor, ValidatedParams};
use crate::analysis::formatter::FormattedOutput;
use crate::analysis::models::{Finding, Severity};
use crate::analysis::scoring;

/// Extra wall-clock allowance on top of the fuzzing campaign's own timeout,
/// covering compilation and shrinking.
const CAMPAIGN_GRACE: Duration = Duration::from_secs(30);

pub struct EchidnaTool {
    descriptor: ToolDescriptor,
}

impl EchidnaTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "echidna-analyze",
            "Analyze Solidity smart contracts using Echidna property-based testing framework",
            vec![
                ParamSpec::string(
                    "contract_name",
                    "Specific contract name to analyze (if multiple contracts in file)",
                ),
                ParamSpec::enumeration(
                    "test_mode",
                    "Test mode to use for analysis",
                    &[
                        "property",
                        "assertion",
                        "dapptest",
                        "optimization",
                        "overflow",
                        "exploration",
                    ],
                )
                .default_value(json!("property")),
                ParamSpec::enumeration(
                    "output_format",
                    "Output format for analysis results",
                    &["json", "text", "none"],
                )
                .default_value(json!("json")),
                ParamSpec::integer("timeout", "Timeout in seconds for the analysis", Some(10), Some(3600))
                    .default_value(json!(60)),
                ParamSpec::integer(
                    "test_limit",
                    "Number of sequences of transactions to generate during testing",
                    Some(100),
                    Some(1_000_000),
                )
                .default_value(json!(50_000)),
                ParamSpec::integer(
                    "seq_len",
                    "Number of transactions to generate during testing",
                    Some(1),
                    Some(1000),
                )
                .default_value(json!(100)),
                ParamSpec::integer("workers", "Number of workers to run", Some(1), Some(8))
                    .default_value(json!(1)),
                ParamSpec::integer("seed", "Specific seed for reproducible results", None, None),
                ParamSpec::boolean("disable_slither", "Disable running Slither integration")
                    .default_value(json!(false)),
            ],
        );
        Self { descriptor }
    }
}

impl Default for EchidnaTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolAdapter for EchidnaTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn default_command(&self) -> Vec<String> {
        vec!["echidna".to_string()]
    }

    fn build_args(&self, contract: &Path, params: &ValidatedParams) -> Vec<String> {
        let mut args = vec![path_arg(contract)];
        if let Some(name) = params.str("contract_name").filter(|n| !n.is_empty()) {
            args.extend(["--contract".to_string(), name.to_string()]);
        }
        let numeric = [
            ("--timeout", "timeout"),
            ("--test-limit", "test_limit"),
            ("--seq-len", "seq_len"),
            ("--workers", "workers"),
        ];
        args.extend([
            "--format".to_string(),
            params.str("output_format").unwrap_or("json").to_string(),
            "--test-mode".to_string(),
            params.str("test_mode").unwrap_or("property").to_string(),
        ]);
        for (flag, name) in numeric {
            if let Some(value) = params.int(name) {
                args.extend([flag.to_string(), value.to_string()]);
            }
        }
        if let Some(seed) = params.int("seed") {
            args.extend(["--seed".to_string(), seed.to_string()]);
        }
        if params.flag("disable_slither") {
            args.push("--disable-slither".to_string());
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
        let Some(tests) = value["tests"].as_array() else {
            return Vec::new();
        };
        tests
            .iter()
            .filter_map(|test| {
                let status = test["status"].as_str()?;
                let severity = match status {
                    "solved" => Severity::High,
                    "error" => Severity::Medium,
                    _ => return None,
                };
                let name = test["name"].as_str().unwrap_or("unnamed property");
                let description = match test["error"].as_str() {
                    Some(error) if !error.is_empty() => error.to_string(),
                    _ => format!("Property {} was falsified", name),
                };
                Some(Finding {
                    title: name.to_string(),
                    severity,
                    description,
                    location: None,
                })
            })
            .collect()
    }

    fn risk_score(&self, output: &FormattedOutput) -> u8 {
        scoring::per_item(output.findings.len(), 20)
    }

    fn time_budget(&self, params: &ValidatedParams, default: Duration) -> Duration {
        let campaign = params
            .int("timeout")
            .map(|secs| Duration::from_secs(secs.max(0) as u64) + CAMPAIGN_GRACE)
            .unwrap_or(default);
        default.max(campaign)
    }
}
