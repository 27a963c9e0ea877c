//! YAML test case model
//!
//! A suite file is either a plain list of cases or a mapping:
//!
//! ```yaml
//! name: users
//! config:
//!   variables:
//!     userId: 1
//! testcases:
//!   - name: get user
//!     api: /users/${userId}
//!     validate:
//!       - status: 200
//!       - $.id: notNull
//!     save:
//!       userName: $.name
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::environment::string_map;
use crate::config::load_document;
use crate::errors::{FlowpulseError, Result};
use crate::flow::step::DEFAULT_RETRY_DELAY;
use crate::flow::{Step, StepBuilder};
use crate::http::Method;
use crate::validation::{render, Expected, Operator, Validation};

/// One test case as written in a suite file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DslTestCase {
    pub name: String,
    pub api: String,
    pub method: Method,
    #[serde(deserialize_with = "string_map", skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    /// Query parameters for GET/DELETE, body fields otherwise
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, JsonValue>,
    /// Wins over `params` for methods that carry a body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<IndexMap<String, JsonValue>>,
    #[serde(deserialize_with = "string_map", skip_serializing_if = "IndexMap::is_empty")]
    pub save: IndexMap<String, String>,
    #[serde(deserialize_with = "string_map", skip_serializing_if = "IndexMap::is_empty")]
    pub pre_param: IndexMap<String, String>,
    /// Seconds to wait before the request
    #[serde(skip_serializing_if = "is_zero")]
    pub sleep: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub retry: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

fn is_zero<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// `dependsOn: a` and `dependsOn: [a, b]` are both accepted
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(name)) if name.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
    })
}

impl DslTestCase {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Request body text, `None` for query-parameter methods
    pub fn body_text(&self) -> Option<String> {
        if self.method.uses_query_params() {
            return None;
        }
        match &self.body {
            Some(JsonValue::Null) | None => {}
            Some(JsonValue::String(raw)) => return Some(raw.clone()),
            Some(other) => return Some(other.to_string()),
        }
        if self.params.is_empty() {
            return None;
        }
        let object: serde_json::Map<String, JsonValue> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(JsonValue::Object(object).to_string())
    }

    /// Translate into an executable flow step.
    ///
    /// DSL cases never stop a suite, so `stop_on_failure` is off.
    pub fn to_step(&self) -> Step {
        let mut builder = StepBuilder::new(&self.name)
            .request(self.method, &self.api)
            .stop_on_failure(false);

        if self.sleep > 0 {
            builder = builder.delay(Duration::from_secs(self.sleep));
        }
        if self.retry > 0 {
            builder = builder.retry(self.retry, DEFAULT_RETRY_DELAY);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        for (key, value) in &self.pre_param {
            builder = builder.param(key, value);
        }

        if self.method.uses_query_params() {
            for (key, value) in &self.params {
                if !value.is_null() {
                    builder = builder.query(key, render(value));
                }
            }
        } else if let Some(body) = self.body_text() {
            builder = builder.body(body);
        }

        for rule in &self.validate {
            for (key, expected) in rule {
                builder = apply_rule(builder, key, expected);
            }
        }
        for (key, path) in &self.save {
            builder = builder.extract(key, path);
        }
        if let Some(account) = &self.account {
            builder = builder.account(account);
        }
        builder.build()
    }
}

fn apply_rule(builder: StepBuilder, key: &str, expected: &JsonValue) -> StepBuilder {
    let expected = render(expected);
    match key {
        "status" => builder.validate(format!("status={}", expected.trim())),
        "contains" => builder.check(Validation::new("body", Operator::Contains, Expected::Value(expected))),
        "matches" => builder.check(Validation::new("body", Operator::Regex, Expected::Value(expected))),
        path => builder.assertion(path, &expected),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SuiteConfig {
    variables: IndexMap<String, JsonValue>,
}

impl SuiteConfig {
    fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SuiteMapping {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "SuiteConfig::is_empty")]
    config: SuiteConfig,
    #[serde(default)]
    testcases: Vec<DslTestCase>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SuiteDocument {
    Cases(Vec<DslTestCase>),
    Suite(SuiteMapping),
}

/// A loaded suite file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DslSuite {
    pub name: String,
    /// Seeded into the shared pool before the first case
    pub variables: IndexMap<String, String>,
    pub cases: Vec<DslTestCase>,
}

impl DslSuite {
    /// Load a suite file; the name falls back to the file stem
    pub fn load(path: &Path) -> Result<Self> {
        let document: SuiteDocument = load_document(path)?;
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "suite".to_string());
        Self::from_document(document, fallback)
            .map_err(|e| FlowpulseError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(name: &str, text: &str) -> Result<Self> {
        let document: SuiteDocument = serde_yaml::from_str(text)?;
        Self::from_document(document, name.to_string())
    }

    fn from_document(document: SuiteDocument, fallback: String) -> Result<Self> {
        let suite = match document {
            SuiteDocument::Cases(cases) => DslSuite {
                name: fallback,
                variables: IndexMap::new(),
                cases,
            },
            SuiteDocument::Suite(mapping) => DslSuite {
                name: mapping.name.filter(|n| !n.trim().is_empty()).unwrap_or(fallback),
                variables: mapping
                    .config
                    .variables
                    .iter()
                    .map(|(k, v)| (k.clone(), render(v)))
                    .collect(),
                cases: mapping.testcases,
            },
        };
        suite.check()?;
        Ok(suite)
    }

    fn to_mapping(&self) -> SuiteMapping {
        SuiteMapping {
            name: Some(self.name.clone()),
            config: SuiteConfig {
                variables: self
                    .variables
                    .iter()
                    .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                    .collect(),
            },
            testcases: self.cases.clone(),
        }
    }

    /// Suite mapping as YAML, loadable by [`DslSuite::load`]
    pub fn to_yaml(&self) -> Result<String> {
        let document = portable(&serde_json::to_value(self.to_mapping())?);
        Ok(serde_yaml::to_string(&yaml_value(&document))?)
    }

    /// Suite mapping as JSON. Suites are read as YAML, so the same
    /// number rules apply.
    pub fn to_json(&self) -> Result<String> {
        let document = portable(&serde_json::to_value(self.to_mapping())?);
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Write the suite; `.json` files get JSON, anything else YAML
    pub fn save(&self, path: &Path) -> Result<()> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let text = if is_json { self.to_json()? } else { self.to_yaml()? };
        fs::write(path, text)?;
        Ok(())
    }

    /// Every case needs a unique, non-empty name
    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (idx, case) in self.cases.iter().enumerate() {
            if case.name.trim().is_empty() {
                return Err(FlowpulseError::Configuration(format!(
                    "test case #{} has no name",
                    idx + 1
                )));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(FlowpulseError::Configuration(format!(
                    "duplicate test case name: {}",
                    case.name
                )));
            }
        }
        Ok(())
    }
}

/// Numbers that would not survive a YAML reload are turned into strings
fn portable(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Number(n) if !is_exact(n) => JsonValue::String(n.to_string()),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(portable).collect()),
        JsonValue::Object(map) => {
            JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), portable(v))).collect())
        }
        other => other.clone(),
    }
}

fn is_exact(n: &serde_json::Number) -> bool {
    n.is_i64()
        || n.is_u64()
        || n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .is_some_and(|f| f == *n)
}

fn yaml_value(value: &JsonValue) -> serde_yaml::Value {
    use serde_yaml::Value as Yaml;
    match value {
        JsonValue::Null => Yaml::Null,
        JsonValue::Bool(b) => Yaml::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Yaml::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Yaml::Number(u.into())
            } else if let Some(f) = n.as_f64() {
                Yaml::Number(f.into())
            } else {
                Yaml::String(n.to_string())
            }
        }
        JsonValue::String(s) => Yaml::String(s.clone()),
        JsonValue::Array(items) => Yaml::Sequence(items.iter().map(yaml_value).collect()),
        JsonValue::Object(map) => Yaml::Mapping(
            map.iter()
                .map(|(k, v)| (Yaml::String(k.clone()), yaml_value(v)))
                .collect(),
        ),
    }
}
