//! Suite execution
//!
//! Cases run one at a time in dependency order, each as a single-step
//! flow over a pool shared by the whole suite. A failing case never stops
//! the suite; only cases that depend on it are skipped.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::case::{DslSuite, DslTestCase};
use super::dependency::execution_order;
use crate::auth::TokenManager;
use crate::config::EnvConfig;
use crate::errors::Result;
use crate::flow::{FlowExecutor, StepResult};
use crate::http::HttpTransport;
use crate::signals::{self, InterruptFlag};
use crate::store::SharedDataPool;

/// Include/exclude tag lists.
///
/// Exclusion wins. With a non-empty include list, untagged cases are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl TagFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn accepts(&self, case: &DslTestCase) -> bool {
        if self.exclude.iter().any(|t| case.has_tag(t)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|t| case.has_tag(t))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DslTestResult {
    pub name: String,
    pub passed: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub status_code: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub response_body: String,
    pub passed_validations: Vec<String>,
    pub failed_validations: Vec<String>,
    pub saved_data: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub retry_count: u32,
}

impl DslTestResult {
    fn skipped(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            skipped: true,
            skip_reason: Some(reason),
            ..Default::default()
        }
    }

    fn from_step(step: StepResult) -> Self {
        Self {
            name: step.step_name,
            passed: step.success,
            skipped: false,
            skip_reason: None,
            status_code: step.status_code,
            response_body: step.response_body,
            passed_validations: step.passed_assertions,
            failed_validations: step.failures.iter().map(|f| f.to_string()).collect(),
            saved_data: step.extracted,
            error_message: step.error_message,
            duration_ms: step.duration.as_millis() as u64,
            retry_count: step.retry_attempts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DslSuiteResult {
    pub suite_name: String,
    pub results: Vec<DslTestResult>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration_ms: u64,
    pub interrupted: bool,
}

impl DslSuiteResult {
    fn new(suite_name: &str) -> Self {
        Self {
            suite_name: suite_name.to_string(),
            ..Default::default()
        }
    }

    fn push(&mut self, result: DslTestResult) {
        if result.skipped {
            self.skipped += 1;
        } else if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Percentage of executed cases that passed, 0 when nothing ran
    pub fn pass_rate(&self) -> f64 {
        let executed = self.passed + self.failed;
        if executed == 0 {
            return 0.0;
        }
        self.passed as f64 / executed as f64 * 100.0
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }

    pub fn result(&self, name: &str) -> Option<&DslTestResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

pub struct DslEngine {
    env: Arc<EnvConfig>,
    transport: Arc<dyn HttpTransport>,
    pool: SharedDataPool,
    tokens: Option<Arc<TokenManager>>,
    filter: TagFilter,
    interrupt: InterruptFlag,
}

impl DslEngine {
    pub fn new(env: Arc<EnvConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            env,
            transport,
            pool: SharedDataPool::new(),
            tokens: None,
            filter: TagFilter::default(),
            interrupt: signals::global(),
        }
    }

    pub fn with_pool(mut self, pool: SharedDataPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_tokens(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_filter(mut self, filter: TagFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Pool value set before the run; wins over suite variables of the same name
    pub fn with_variable(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pool.set(key, value);
        self
    }

    pub fn pool(&self) -> &SharedDataPool {
        &self.pool
    }

    /// Run every case of `suite`.
    ///
    /// Only an invalid dependency graph is an error; case failures are
    /// reported in the result.
    pub fn run(&self, suite: &DslSuite) -> Result<DslSuiteResult> {
        let order = execution_order(&suite.cases)?;
        info!(suite = %suite.name, cases = suite.cases.len(), "Running suite");

        for (key, value) in &suite.variables {
            if !self.pool.contains(key) {
                self.pool.set(key.clone(), value.clone());
            }
        }

        let started = Instant::now();
        let mut outcome = DslSuiteResult::new(&suite.name);
        let mut passed: HashMap<&str, bool> = HashMap::new();

        for idx in order {
            let case = &suite.cases[idx];
            if self.interrupt.is_set() {
                warn!(suite = %suite.name, "Interrupted, remaining cases not run");
                outcome.interrupted = true;
                break;
            }

            if let Some(reason) = self.skip_reason(case, &passed) {
                info!(case = %case.name, reason = %reason, "SKIP");
                passed.insert(case.name.as_str(), false);
                outcome.push(DslTestResult::skipped(&case.name, reason));
                continue;
            }

            let Some(result) = self.run_case(case) else {
                outcome.interrupted = true;
                break;
            };
            if result.passed {
                info!(case = %case.name, status = result.status_code, ms = result.duration_ms, "PASS");
            } else {
                warn!(
                    case = %case.name,
                    status = result.status_code,
                    error = result.error_message.as_deref().unwrap_or(""),
                    "FAIL"
                );
            }
            passed.insert(case.name.as_str(), result.passed);
            outcome.push(result);
        }

        outcome.total_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            suite = %suite.name,
            passed = outcome.passed,
            failed = outcome.failed,
            skipped = outcome.skipped,
            pass_rate = format!("{:.1}", outcome.pass_rate()),
            "Suite finished"
        );
        Ok(outcome)
    }

    fn skip_reason(&self, case: &DslTestCase, passed: &HashMap<&str, bool>) -> Option<String> {
        if case.skip {
            return Some("marked skip".to_string());
        }
        if !self.filter.accepts(case) {
            return Some("excluded by tag filter".to_string());
        }
        case.depends_on
            .iter()
            .find(|dep| passed.get(dep.as_str()) != Some(&true))
            .map(|dep| format!("dependency '{}' did not pass", dep))
    }

    /// `None` when the run was interrupted before the request went out
    fn run_case(&self, case: &DslTestCase) -> Option<DslTestResult> {
        let mut executor = FlowExecutor::new(self.env.clone(), self.transport.clone())
            .with_pool(self.pool.clone())
            .with_interrupt(self.interrupt.clone())
            .step(case.to_step());
        if let Some(tokens) = &self.tokens {
            executor = executor.with_tokens(tokens.clone());
        }

        let flow = executor.run(&case.name);
        flow.steps.into_iter().next().map(DslTestResult::from_step)
    }
}
