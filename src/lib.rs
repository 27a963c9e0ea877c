//! flowpulse library interface
//!
//! A data-driven API test engine: templated requests, response
//! validation, ordered flows with retries and a shared data pool,
//! managed login tokens and per-environment configuration.
//!
//! # Module Organization
//!
//! - [`resolver`] - `${var}` and `__func(args)` template expansion
//! - [`validation`] - `path operator expected` checks against responses
//! - [`flow`] - steps, retries and the flow executor
//! - [`auth`] - cached login tokens with background renewal
//! - [`config`] - environment registry and config files
//! - [`dsl`] - YAML test suites
//! - [`openapi`] - Suite generation from OpenAPI/Swagger documents
//! - [`signals`] - Interrupt handling (was_interrupted, set_interrupted)
//! - [`errors`] - Error types (FlowpulseError, Result)
//! - [`status`] - Exit status codes (ExitStatus)

pub mod auth;
pub mod cli;
pub mod config;
pub mod dsl;
pub mod errors;
pub mod flow;
pub mod http;
pub mod logging;
pub mod openapi;
pub mod resolver;
pub mod signals;
pub mod status;
pub mod store;
pub mod validation;
