//! Response validation
//!
//! A validation is a `path operator expected` string checked against a
//! response. All validations of a step are evaluated; failures are
//! collected rather than stopping at the first one.

pub mod compare;
pub mod parser;
pub mod path;

use tracing::debug;

use crate::errors::{FlowpulseError, VerificationFailure};
pub use compare::{compare, values_equal, CompareError};
pub use parser::{Expected, Operator, Validation};
pub use path::{render, Located, ResponseView};

/// Keywords accepted as the expected value of a path/expected pair
const KEYWORDS: &[(&str, &str)] = &[
    ("notnull", ":notNull"),
    ("null", ":null"),
    ("notempty", ":notEmpty"),
    ("empty", ":empty"),
    ("exist", ":exists"),
    ("exists", ":exists"),
    ("notexist", ":notExist"),
    ("notexists", ":notExist"),
];

const OPERATOR_PREFIXES: &[&str] = &["!=", ">=", "<=", "~=", ">", "<", "=", ":"];

/// Build an expression from a path and an expected value.
///
/// `("$.id", "notNull")` becomes `$.id:notNull`, `("$.n", ">5")` becomes
/// `$.n>5`, anything else is an equality check.
pub fn expression_for(path: &str, expected: &str) -> String {
    let trimmed = expected.trim();
    let lower = trimmed.to_ascii_lowercase();
    if let Some((_, op)) = KEYWORDS.iter().find(|(k, _)| *k == lower) {
        return format!("{}{}", path, op);
    }
    if OPERATOR_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return format!("{}{}", path, trimmed);
    }
    format!("{}={}", path, expected)
}

impl Validation {
    /// Check this validation against a response
    pub fn check(&self, response: &ResponseView<'_>) -> Result<(), VerificationFailure> {
        let located = response.locate(&self.path);
        let actual = match located.value() {
            Some(v) => render(v),
            None => "<missing>".to_string(),
        };

        let failure = |actual: String| {
            VerificationFailure::new(
                self.path.clone(),
                self.operator.symbol(),
                self.expected.to_string(),
                actual,
            )
        };

        match compare(&located, self.operator, &self.expected) {
            Ok(true) => {
                debug!(validation = %self, "Validation passed");
                Ok(())
            }
            Ok(false) => Err(failure(actual)),
            Err(CompareError(reason)) => Err(failure(format!("{} ({})", actual, reason))),
        }
    }
}

/// Evaluate one expression string
pub fn validate(expression: &str, response: &ResponseView<'_>) -> Result<(), VerificationFailure> {
    match Validation::parse(expression) {
        Ok(v) => v.check(response),
        Err(e) => Err(VerificationFailure::new(expression, "parse", "", e.to_string())),
    }
}

/// Evaluate every expression and return all failures
pub fn validate_all<S: AsRef<str>>(
    expressions: &[S],
    response: &ResponseView<'_>,
) -> Vec<VerificationFailure> {
    expressions
        .iter()
        .filter_map(|e| validate(e.as_ref(), response).err())
        .collect()
}

/// `Ok` when nothing failed, otherwise every failure in one error
pub fn verify_all<S: AsRef<str>>(
    expressions: &[S],
    response: &ResponseView<'_>,
) -> Result<(), FlowpulseError> {
    into_result(validate_all(expressions, response))
}

/// Fold collected failures into a single error
pub fn into_result(mut failures: Vec<VerificationFailure>) -> Result<(), FlowpulseError> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(FlowpulseError::Verification(failures.remove(0))),
        _ => Err(FlowpulseError::Verifications(failures)),
    }
}
