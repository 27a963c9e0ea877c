//! Data-driven test suites
//!
//! Suites are YAML files of test cases. Each case becomes a single flow
//! step; cases share one pool so values saved by one are visible to the
//! next.

pub mod case;
pub mod dependency;
pub mod engine;
pub mod report;

pub use case::{DslSuite, DslTestCase};
pub use dependency::execution_order;
pub use engine::{DslEngine, DslSuiteResult, DslTestResult, TagFilter};
pub use report::{format_json_lines, format_text, ReportFormat};
