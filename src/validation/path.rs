//! Locating values in a response
//!
//! Supports JSONPath (`$.data.items[0].id`), plain dot notation
//! (`data.items[0].id`), and the pseudo-paths `status` and `body`.

use jsonpath_rust::JsonPath;
use serde_json::Value as JsonValue;

/// A response as seen by validations and extractions.
/// The body is parsed once up front.
#[derive(Debug, Clone)]
pub struct ResponseView<'a> {
    pub status: u16,
    pub body: &'a str,
    json: Option<JsonValue>,
}

/// Outcome of evaluating a path
#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    Found(JsonValue),
    Missing,
}

impl Located {
    pub fn value(&self) -> Option<&JsonValue> {
        match self {
            Located::Found(v) => Some(v),
            Located::Missing => None,
        }
    }
}

impl<'a> ResponseView<'a> {
    pub fn new(status: u16, body: &'a str) -> Self {
        let json = serde_json::from_str(body).ok();
        Self { status, body, json }
    }

    pub fn json(&self) -> Option<&JsonValue> {
        self.json.as_ref()
    }

    /// Evaluate `path` against the response
    pub fn locate(&self, path: &str) -> Located {
        let path = path.trim();
        match path {
            "status" | "$status" => return Located::Found(JsonValue::from(self.status)),
            "body" | "$body" => return Located::Found(JsonValue::String(self.body.to_string())),
            _ => {}
        }

        let Some(json) = self.json.as_ref() else {
            return Located::Missing;
        };
        query(json, path)
    }
}

/// Query a JSON document; dot notation is promoted to JSONPath
pub fn query(json: &JsonValue, path: &str) -> Located {
    let normalized = normalize_path(path);
    match json.query(&normalized) {
        Ok(results) => match results.len() {
            0 => Located::Missing,
            1 => Located::Found(results[0].clone()),
            _ => Located::Found(JsonValue::Array(results.into_iter().cloned().collect())),
        },
        Err(_) => Located::Missing,
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('$') {
        path.to_string()
    } else if path.starts_with('[') {
        format!("${}", path)
    } else {
        format!("$.{}", path)
    }
}

/// Text form of a JSON value: strings unquoted, everything else compact JSON
pub fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
