//! Pessimistic risk scoring.
//!
//! Scores run from 0 (nothing reported) to 100 (severe issues, or the tool
//! failed).

use super::models::{Finding, Severity};

pub const MAX_SCORE: u8 = 100;

/// Score of any run that did not succeed.
pub const FAILED_SCORE: u8 = MAX_SCORE;

fn clamp(score: usize) -> u8 {
    score.min(MAX_SCORE as usize) as u8
}

fn severity_weight(severity: Severity) -> usize {
    match severity {
        Severity::High => 30,
        Severity::Medium => 20,
        Severity::Low => 10,
        Severity::Informational | Severity::Optimization => 5,
        Severity::Unknown => 20,
    }
}

/// Sum of per-finding severity weights.
pub fn severity_weighted(findings: &[Finding]) -> u8 {
    clamp(findings.iter().map(|f| severity_weight(f.severity)).sum())
}

/// A fixed weight per reported item.
pub fn per_item(count: usize, weight: usize) -> u8 {
    clamp(count.saturating_mul(weight))
}

/// `hit` if any keyword appears, `any_output` if there is output at all.
pub fn keyword_presence(output: &str, keywords: &[&str], hit: u8, any_output: u8) -> u8 {
    let lower = output.to_lowercase();
    if keywords.iter().any(|k| lower.contains(k)) {
        hit
    } else if !output.trim().is_empty() {
        any_output
    } else {
        0
    }
}

/// A fixed weight for each distinct keyword present in the output.
pub fn keyword_count(output: &str, keywords: &[&str], weight: usize) -> u8 {
    let lower = output.to_lowercase();
    per_item(keywords.iter().filter(|k| lower.contains(*k)).count(), weight)
}
