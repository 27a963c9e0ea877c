//! OpenAPI / Swagger import
//!
//! Reads an OpenAPI 3.x or Swagger 2.0 document from a file or URL and
//! turns every operation into a suite case with sample parameters.

mod generator;
mod parser;

pub use generator::{generate_case, generate_suite, sample_value, ImportOptions};
pub use parser::{
    parse_document, parse_file, parse_schema, ApiDocument, Endpoint, ParamLocation, Parameter,
    Schema,
};

use std::path::Path;
use tracing::info;

use crate::dsl::DslSuite;
use crate::errors::{FlowpulseError, Result};
use crate::http::{HttpRequest, HttpTransport, Method};

/// Generate a suite from a local document
pub fn import_from_file(path: &Path, options: &ImportOptions) -> Result<DslSuite> {
    let document = parse_file(path)?;
    info!(path = %path.display(), title = %document.title, "Loaded API document");
    Ok(generate_suite(&document, options))
}

/// Fetch a document over HTTP and generate a suite from it
pub fn import_from_url(
    url: &str,
    transport: &dyn HttpTransport,
    options: &ImportOptions,
) -> Result<DslSuite> {
    let request = HttpRequest::new(Method::Get, url)
        .with_header("Accept", "application/json, application/yaml");
    let response = transport.send(&request)?;
    if response.status != 200 {
        return Err(FlowpulseError::Network(format!(
            "{} returned status {}",
            url, response.status
        )));
    }
    let document = parse_document(&response.body)?;
    info!(url, title = %document.title, "Fetched API document");
    Ok(generate_suite(&document, options))
}
