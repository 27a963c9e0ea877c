//! Operator semantics
//!
//! Ordering operators compare as arbitrary-precision decimals so large IDs
//! and money values never pass through floating point.

use bigdecimal::BigDecimal;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::str::FromStr;

use super::parser::{Expected, Operator};
use super::path::{render, Located};

/// Why a comparison could not be made at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareError(pub String);

pub fn parse_decimal(s: &str) -> Option<BigDecimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    BigDecimal::from_str(s).ok()
}

/// Value equality: numeric when both sides are decimals, textual otherwise
pub fn values_equal(actual: &str, expected: &str) -> bool {
    match (parse_decimal(actual), parse_decimal(expected)) {
        (Some(a), Some(e)) => a == e,
        _ => actual == expected,
    }
}

fn order(actual: &str, expected: &str) -> Result<std::cmp::Ordering, CompareError> {
    let a = parse_decimal(actual)
        .ok_or_else(|| CompareError(format!("actual value '{}' is not numeric", actual)))?;
    let e = parse_decimal(expected)
        .ok_or_else(|| CompareError(format!("expected value '{}' is not numeric", expected)))?;
    Ok(a.cmp(&e))
}

/// Regex full match
pub fn full_match(actual: &str, pattern: &str) -> Result<bool, CompareError> {
    let anchored = format!("^(?:{})$", pattern);
    let re = Regex::new(&anchored)
        .map_err(|e| CompareError(format!("invalid regex '{}': {}", pattern, e)))?;
    Ok(re.is_match(actual))
}

fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(a) => a.is_empty(),
        JsonValue::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn contains(value: &JsonValue, needle: &str) -> bool {
    match value {
        JsonValue::Array(items) => items.iter().any(|v| values_equal(&render(v), needle)),
        other => render(other).contains(needle),
    }
}

fn expected_value(expected: &Expected) -> String {
    match expected {
        Expected::Value(v) => v.clone(),
        other => other.to_string(),
    }
}

fn expected_list(expected: &Expected) -> Vec<String> {
    match expected {
        Expected::List(items) => items.clone(),
        Expected::Value(v) => super::parser::parse_list(v),
        Expected::None => Vec::new(),
    }
}

/// Apply `operator` to a located value.
///
/// `Ok(false)` is an ordinary mismatch; `Err` means the inputs could not be
/// compared (non-numeric operand, bad regex, missing path).
pub fn compare(located: &Located, operator: Operator, expected: &Expected) -> Result<bool, CompareError> {
    let value = match located {
        Located::Missing => {
            return match operator {
                Operator::Null | Operator::NotExists => Ok(true),
                Operator::Exists | Operator::NotNull => Ok(false),
                _ => Err(CompareError("path not found in response".to_string())),
            };
        }
        Located::Found(v) => v,
    };

    let actual = render(value);
    let outcome = match operator {
        Operator::Eq => values_equal(&actual, &expected_value(expected)),
        Operator::Ne => !values_equal(&actual, &expected_value(expected)),
        Operator::Gt => order(&actual, &expected_value(expected))?.is_gt(),
        Operator::Gte => order(&actual, &expected_value(expected))?.is_ge(),
        Operator::Lt => order(&actual, &expected_value(expected))?.is_lt(),
        Operator::Lte => order(&actual, &expected_value(expected))?.is_le(),
        Operator::Regex => full_match(&actual, &expected_value(expected))?,
        Operator::Exists | Operator::NotNull => !value.is_null(),
        Operator::NotExists | Operator::Null => value.is_null(),
        Operator::Empty => is_empty_value(value),
        Operator::NotEmpty => !is_empty_value(value),
        Operator::In => expected_list(expected).iter().any(|e| values_equal(&actual, e)),
        Operator::NotIn => !expected_list(expected).iter().any(|e| values_equal(&actual, e)),
        Operator::Contains => contains(value, &expected_value(expected)),
        Operator::NotContains => !contains(value, &expected_value(expected)),
    };
    Ok(outcome)
}
