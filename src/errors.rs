//! Error types for flowpulse

use std::fmt;
use thiserror::Error;

/// A single failed validation: where it looked, how it compared, and what it saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub path: String,
    pub operator: String,
    pub expected: String,
    pub actual: String,
}

impl VerificationFailure {
    pub fn new(
        path: impl Into<String>,
        operator: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            operator: operator.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} expected={} actual={}",
            self.path, self.operator, self.expected, self.actual
        )
    }
}

fn join_failures(failures: &[VerificationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for flowpulse
#[derive(Error, Debug)]
pub enum FlowpulseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Verification failed: {0}")]
    Verification(VerificationFailure),

    #[error("Verification failed: {}", join_failures(.0))]
    Verifications(Vec<VerificationFailure>),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowpulseError {
    /// Failures carried by a verification error, empty for every other kind
    pub fn verification_failures(&self) -> &[VerificationFailure] {
        match self {
            FlowpulseError::Verification(f) => std::slice::from_ref(f),
            FlowpulseError::Verifications(list) => list,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowpulseError>;
