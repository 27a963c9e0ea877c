//! Step definitions
//!
//! A [`Step`] is an immutable description of one HTTP call plus its
//! pre/post processing. Build one with [`Step::builder`].

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::result::StepResult;
use crate::errors::VerificationFailure;
use crate::http::Method;
use crate::validation::{expression_for, validate, ResponseView, Validation};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Called once with a step's final result
pub type StepCallback = Arc<dyn Fn(&StepResult) + Send + Sync>;

/// How often and how patiently a step is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts beyond the first
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Request template; every string is resolved again on each attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: IndexMap<String, String>,
    pub query: IndexMap<String, String>,
    /// 0 disables the status check
    pub expected_status: u16,
}

/// One check run against a step's response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// A `path operator expected` expression, parsed when evaluated
    Expression(String),
    /// A validation built directly, for operators without an expression form
    Check(Validation),
}

impl Assertion {
    pub fn evaluate(&self, response: &ResponseView<'_>) -> Result<(), VerificationFailure> {
        match self {
            Assertion::Expression(expression) => validate(expression, response),
            Assertion::Check(validation) => validation.check(response),
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Expression(expression) => f.write_str(expression),
            Assertion::Check(v) if v.operator.is_unary() => write!(f, "{} {}", v.path, v.operator),
            Assertion::Check(v) => write!(f, "{} {} {}", v.path, v.operator, v.expected),
        }
    }
}

#[derive(Clone)]
pub struct Step {
    pub name: String,
    pub description: Option<String>,
    pub request: RequestSpec,
    pub retry: RetryPolicy,
    pub delay_before: Duration,
    /// Pool key to path expression
    pub extractions: IndexMap<String, String>,
    pub assertions: Vec<Assertion>,
    /// Resolved and written to the pool before each attempt
    pub overrides: IndexMap<String, String>,
    pub stop_on_failure: bool,
    /// Account whose bearer token is attached
    pub account: Option<String>,
    pub on_success: Option<StepCallback>,
    pub on_failure: Option<StepCallback>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("request", &self.request)
            .field("retry", &self.retry)
            .field("delay_before", &self.delay_before)
            .field("extractions", &self.extractions)
            .field("assertions", &self.assertions)
            .field("stop_on_failure", &self.stop_on_failure)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl Step {
    pub fn builder(name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(name)
    }
}

pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            step: Step {
                name: name.into(),
                description: None,
                request: RequestSpec::default(),
                retry: RetryPolicy::default(),
                delay_before: Duration::ZERO,
                extractions: IndexMap::new(),
                assertions: Vec::new(),
                overrides: IndexMap::new(),
                stop_on_failure: true,
                account: None,
                on_success: None,
                on_failure: None,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.step.description = Some(description.into());
        self
    }

    pub fn request(mut self, method: Method, url: impl Into<String>) -> Self {
        self.step.request.method = method;
        self.step.request.url = url.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.step.request.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.step.request.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.step.request.query.insert(name.into(), value.into());
        self
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.step.request.expected_status = status;
        self
    }

    pub fn extract(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.step.extractions.insert(key.into(), path.into());
        self
    }

    /// Path/expected pair, e.g. `("$.code", "0")` or `("$.id", "notNull")`
    pub fn assertion(mut self, path: &str, expected: &str) -> Self {
        self.step
            .assertions
            .push(Assertion::Expression(expression_for(path, expected)));
        self
    }

    /// Raw validation expression such as `$.total>=10`
    pub fn validate(mut self, expression: impl Into<String>) -> Self {
        self.step.assertions.push(Assertion::Expression(expression.into()));
        self
    }

    pub fn check(mut self, validation: Validation) -> Self {
        self.step.assertions.push(Assertion::Check(validation));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.step.overrides.insert(key.into(), value.into());
        self
    }

    pub fn retry(mut self, retries: u32, delay: Duration) -> Self {
        self.step.retry = RetryPolicy::new(retries, delay);
        self
    }

    pub fn delay(mut self, before: Duration) -> Self {
        self.step.delay_before = before;
        self
    }

    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.step.stop_on_failure = stop;
        self
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.step.account = Some(account.into());
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StepResult) + Send + Sync + 'static,
    {
        self.step.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&StepResult) + Send + Sync + 'static,
    {
        self.step.on_failure = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Step {
        self.step
    }
}
