//! Suite reports
//!
//! A boxed text summary for terminals and one JSON object per line for
//! log collectors.

use serde_json::json;

use super::engine::{DslSuiteResult, DslTestResult};

const HEAVY_RULE: &str = "═══════════════════════════════════════════════════════════════════";
const LIGHT_RULE: &str = "───────────────────────────────────────────────────────────────────";

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    JsonLines,
}

impl ReportFormat {
    pub fn render(&self, suite: &DslSuiteResult) -> String {
        match self {
            ReportFormat::Text => format_text(suite),
            ReportFormat::JsonLines => format_json_lines(suite),
        }
    }
}

fn status_icon(result: &DslTestResult) -> &'static str {
    if result.skipped {
        "⊘"
    } else if result.passed {
        "✓"
    } else {
        "✗"
    }
}

pub fn format_text(suite: &DslSuiteResult) -> String {
    let mut output = String::new();
    output.push('\n');
    output.push_str(HEAVY_RULE);
    output.push_str(&format!("\n  SUITE: {}\n", suite.suite_name));
    output.push_str(HEAVY_RULE);
    output.push_str("\n\n");

    for (i, result) in suite.results.iter().enumerate() {
        let status = if result.skipped {
            "SKIPPED".to_string()
        } else {
            result.status_code.to_string()
        };
        output.push_str(&format!(
            "  {} Case {}: {} ({})\n",
            status_icon(result),
            i + 1,
            result.name,
            status
        ));

        if let Some(reason) = &result.skip_reason {
            output.push_str(&format!("      Reason: {}\n", reason));
            output.push('\n');
            continue;
        }

        output.push_str(&format!("      Time: {}ms\n", result.duration_ms));
        if result.retry_count > 0 {
            output.push_str(&format!("      Retries: {}\n", result.retry_count));
        }
        if !result.passed {
            if let Some(error) = &result.error_message {
                output.push_str(&format!("      Error: {}\n", error));
            }
        }
        for validation in &result.passed_validations {
            output.push_str(&format!("        ✓ {}\n", validation));
        }
        for validation in &result.failed_validations {
            output.push_str(&format!("        ✗ {}\n", validation));
        }
        if !result.saved_data.is_empty() {
            output.push_str("      Saved:\n");
            for (key, value) in &result.saved_data {
                output.push_str(&format!("        {} = {}\n", key, value));
            }
        }
        output.push('\n');
    }

    output.push_str(LIGHT_RULE);
    output.push_str(&format!(
        "\n  Total: {} | Passed: {} | Failed: {} | Skipped: {} | Pass rate: {:.1}%\n",
        suite.results.len(),
        suite.passed,
        suite.failed,
        suite.skipped,
        suite.pass_rate()
    ));
    output.push_str(&format!("  Duration: {}ms\n", suite.total_duration_ms));
    if suite.interrupted {
        output.push_str("  Interrupted: remaining cases were not run\n");
    }
    output.push_str(HEAVY_RULE);
    output.push('\n');
    output
}

/// One `case_result` line per case followed by a `suite_summary` line
pub fn format_json_lines(suite: &DslSuiteResult) -> String {
    let mut output = String::new();

    for result in &suite.results {
        let level = if result.skipped {
            "warn"
        } else if result.passed {
            "info"
        } else {
            "error"
        };
        let line = json!({
            "level": level,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "case_result",
            "suite": suite.suite_name,
            "case": result,
        });
        output.push_str(&line.to_string());
        output.push('\n');
    }

    let summary = json!({
        "level": if suite.all_passed() { "info" } else { "error" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "event": "suite_summary",
        "suite": suite.suite_name,
        "total": suite.results.len(),
        "passed": suite.passed,
        "failed": suite.failed,
        "skipped": suite.skipped,
        "pass_rate": suite.pass_rate(),
        "duration_ms": suite.total_duration_ms,
        "interrupted": suite.interrupted,
    });
    output.push_str(&summary.to_string());
    output.push('\n');
    output
}
