//! Flow orchestration
//!
//! A flow is an ordered list of steps sharing one data pool. Values a step
//! extracts are visible to every later step.

pub mod executor;
pub mod result;
pub mod step;

pub use executor::{FlowCallback, FlowExecutor};
pub use result::{FlowResult, StepResult};
pub use step::{Assertion, RequestSpec, RetryPolicy, Step, StepBuilder, StepCallback};
