//! Step and flow outcomes

use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::VerificationFailure;

/// Outcome of one step after all of its attempts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepResult {
    pub step_name: String,
    pub success: bool,
    pub status_code: u16,
    pub response_body: String,
    pub extracted: IndexMap<String, String>,
    pub error_message: Option<String>,
    /// Assertions that passed on the final attempt
    pub passed_assertions: Vec<String>,
    /// Assertions that failed on the final attempt
    pub failures: Vec<VerificationFailure>,
    pub duration: Duration,
    /// Attempts used beyond the first
    pub retry_attempts: u32,
}

impl StepResult {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            ..Default::default()
        }
    }

    pub fn extracted_value(&self, key: &str) -> Option<&str> {
        self.extracted.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowResult {
    pub flow_name: String,
    pub success: bool,
    /// Only steps that ran
    pub steps: Vec<StepResult>,
    /// Pool contents when the flow finished
    pub shared_data: BTreeMap<String, String>,
    pub total_duration: Duration,
    pub passed_count: usize,
    pub failed_count: usize,
    pub interrupted: bool,
}

impl FlowResult {
    pub fn new(flow_name: impl Into<String>) -> Self {
        Self {
            flow_name: flow_name.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, result: StepResult) {
        if result.success {
            self.passed_count += 1;
        } else {
            self.failed_count += 1;
        }
        for (k, v) in &result.extracted {
            self.shared_data.insert(k.clone(), v.clone());
        }
        self.steps.push(result);
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    pub fn extracted(&self, key: &str) -> Option<&str> {
        self.shared_data.get(key).map(String::as_str)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| !s.success)
    }

    /// One line per step plus a totals line
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Flow '{}': {} ({} passed, {} failed, {}ms)",
            self.flow_name,
            if self.interrupted {
                "INTERRUPTED"
            } else if self.success {
                "PASSED"
            } else {
                "FAILED"
            },
            self.passed_count,
            self.failed_count,
            self.total_duration.as_millis()
        );
        for step in &self.steps {
            let mark = if step.success { "✓" } else { "✗" };
            out.push_str(&format!(
                "\n  {} {} [{}] {}ms",
                mark,
                step.step_name,
                step.status_code,
                step.duration.as_millis()
            ));
            if step.retry_attempts > 0 {
                out.push_str(&format!(" (retries: {})", step.retry_attempts));
            }
            if let Some(error) = &step.error_message {
                out.push_str(&format!("\n      {}", error));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, success: bool) -> StepResult {
        StepResult {
            success,
            ..StepResult::new(name)
        }
    }

    #[test]
    fn test_push_counts_and_merges() {
        let mut flow = FlowResult::new("checkout");
        let mut login = step("login", true);
        login.extracted.insert("token".into(), "abc".into());
        flow.push(login);
        flow.push(step("pay", false));

        assert_eq!(flow.passed_count, 1);
        assert_eq!(flow.failed_count, 1);
        assert_eq!(flow.extracted("token"), Some("abc"));
        assert!(flow.step("pay").is_some());
        assert!(flow.step("ship").is_none());
        assert_eq!(flow.failed_steps().count(), 1);
        assert_eq!(flow.step("login").unwrap().extracted_value("token"), Some("abc"));
    }

    #[test]
    fn test_summary() {
        let mut flow = FlowResult::new("f");
        let mut failed = step("b", false);
        failed.error_message = Some("boom".into());
        failed.retry_attempts = 2;
        flow.push(step("a", true));
        flow.push(failed);
        let summary = flow.summary();
        assert!(summary.starts_with("Flow 'f': FAILED (1 passed, 1 failed"));
        assert!(summary.contains("✗ b"));
        assert!(summary.contains("(retries: 2)"));
        assert!(summary.contains("boom"));
    }
}
