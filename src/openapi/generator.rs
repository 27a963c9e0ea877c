//! Test case generation from a parsed API document
//!
//! One case per operation:
//! - path and query parameters become `preParam` entries referenced as `${name}`
//! - header parameters become case headers
//! - the request body is a sample built from its schema
//! - the first declared 2xx code (else 200) is the expected status

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};

use super::parser::{ApiDocument, Endpoint, ParamLocation, Schema};
use crate::dsl::{DslSuite, DslTestCase};
use crate::validation::render;

/// Nested `$ref`/object depth before a sample gives up with `null`
const MAX_SAMPLE_DEPTH: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Suite name; defaults to the document title
    pub name: Option<String>,
    /// Keep only operations carrying one of these tags
    pub tags: Vec<String>,
    pub include_deprecated: bool,
}

/// Build a suite from `document`
pub fn generate_suite(document: &ApiDocument, options: &ImportOptions) -> DslSuite {
    let mut names = HashSet::new();
    let cases: Vec<DslTestCase> = document
        .endpoints
        .iter()
        .filter(|e| options.include_deprecated || !e.deprecated)
        .filter(|e| options.tags.is_empty() || e.tags.iter().any(|t| options.tags.contains(t)))
        .map(|endpoint| {
            let mut case = generate_case(endpoint, document);
            case.name = unique_name(&mut names, case.name);
            debug!(method = %case.method, api = %case.api, name = %case.name, "Generated case");
            case
        })
        .collect();

    info!(
        title = %document.title,
        endpoints = document.endpoints.len(),
        cases = cases.len(),
        "Generated test cases from API document"
    );
    DslSuite {
        name: options.name.clone().unwrap_or_else(|| document.title.clone()),
        variables: IndexMap::new(),
        cases,
    }
}

fn unique_name(seen: &mut HashSet<String>, name: String) -> String {
    let mut candidate = name.clone();
    let mut n = 2;
    while !seen.insert(candidate.clone()) {
        candidate = format!("{} #{}", name, n);
        n += 1;
    }
    candidate
}

pub fn generate_case(endpoint: &Endpoint, document: &ApiDocument) -> DslTestCase {
    let name = [&endpoint.summary, &endpoint.operation_id]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", endpoint.method, endpoint.path));

    let mut case = DslTestCase {
        name,
        api: templated_path(&endpoint.path),
        method: endpoint.method,
        tags: endpoint.tags.clone(),
        ..Default::default()
    };

    let mut query_suffix = Vec::new();
    for param in &endpoint.parameters {
        let sample = sample_value(&param.schema, document);
        match param.location {
            ParamLocation::Path => {
                case.pre_param.insert(param.name.clone(), render(&sample));
            }
            ParamLocation::Query if endpoint.method.uses_query_params() => {
                case.params.insert(param.name.clone(), sample);
            }
            ParamLocation::Query => {
                // body methods send params as the body, so these go on the URL
                query_suffix.push(format!("{0}=${{{0}}}", param.name));
                case.pre_param.insert(param.name.clone(), render(&sample));
            }
            ParamLocation::Header => {
                case.headers.insert(param.name.clone(), render(&sample));
            }
        }
    }
    if !query_suffix.is_empty() {
        case.api = format!("{}?{}", case.api, query_suffix.join("&"));
    }

    if !endpoint.method.uses_query_params() {
        case.body = endpoint.body.as_ref().map(|schema| sample_value(schema, document));
    }

    let mut rule = IndexMap::new();
    rule.insert("status".to_string(), Value::from(expected_status(&endpoint.responses)));
    case.validate.push(rule);
    case
}

/// `/users/{id}` becomes `/users/${id}`
fn templated_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 8);
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push('$');
        out.push_str(&rest[start..=start + len]);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

fn expected_status(responses: &[String]) -> u16 {
    responses
        .iter()
        .filter(|code| code.starts_with('2'))
        .find_map(|code| code.parse().ok())
        .unwrap_or(200)
}

/// A sample value for `schema`: example, then default, then first enum
/// value, then a value derived from the type. Date and UUID strings are
/// template functions so every run gets fresh data.
pub fn sample_value(schema: &Schema, document: &ApiDocument) -> Value {
    sample_at(schema, document, 0)
}

fn sample_at(schema: &Schema, document: &ApiDocument, depth: usize) -> Value {
    if depth > MAX_SAMPLE_DEPTH {
        return Value::Null;
    }
    if let Some(name) = schema.ref_name() {
        return match document.schemas.get(name) {
            Some(target) => sample_at(target, document, depth + 1),
            None => Value::String(String::new()),
        };
    }
    if let Some(example) = schema.example.as_ref().or(schema.default.as_ref()) {
        return example.clone();
    }
    if let Some(first) = schema.enum_values.first() {
        return first.clone();
    }

    match schema.schema_type.as_deref() {
        Some("string") => Value::String(
            match schema.format.as_deref() {
                Some("date") => "__date(yyyy-MM-dd)",
                Some("date-time") => "__date(yyyy-MM-dd HH:mm:ss)",
                Some("email") => "test@example.com",
                Some("uuid") => "__uuid()",
                _ => "test_string",
            }
            .to_string(),
        ),
        Some("integer") | Some("number") => Value::from(1),
        Some("boolean") => Value::Bool(true),
        Some("array") => Value::Array(Vec::new()),
        Some("object") | None if !schema.properties.is_empty() => {
            let object: Map<String, Value> = schema
                .properties
                .iter()
                .map(|(name, prop)| (name.clone(), sample_at(prop, document, depth + 1)))
                .collect();
            Value::Object(object)
        }
        Some("object") => Value::Object(Map::new()),
        _ => Value::String(String::new()),
    }
}
