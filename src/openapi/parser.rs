//! OpenAPI 3.x and Swagger 2.0 documents
//!
//! Only the parts needed to generate test cases are kept: operations,
//! their parameters, request body schemas and declared response codes.

use indexmap::IndexMap;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::errors::{FlowpulseError, Result};
use crate::http::Method;

/// Maximum document size (16 MB)
const MAX_DOCUMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Operations turned into cases, in this order per path
const METHODS: [(&str, Method); 5] = [
    ("get", Method::Get),
    ("post", Method::Post),
    ("put", Method::Put),
    ("delete", Method::Delete),
    ("patch", Method::Patch),
];

#[derive(Debug, Clone, Default)]
pub struct ApiDocument {
    pub title: String,
    pub version: String,
    pub servers: Vec<String>,
    pub endpoints: Vec<Endpoint>,
    /// Named schemas from `components/schemas` or `definitions`
    pub schemas: IndexMap<String, Schema>,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
    pub parameters: Vec<Parameter>,
    /// JSON or form body schema
    pub body: Option<Schema>,
    /// Declared response codes, in document order
    pub responses: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Schema,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub schema_type: Option<String>,
    pub format: Option<String>,
    pub properties: IndexMap<String, Schema>,
    pub items: Option<Box<Schema>>,
    pub enum_values: Vec<Value>,
    pub example: Option<Value>,
    pub default: Option<Value>,
    pub ref_path: Option<String>,
}

impl Schema {
    /// Name of the referenced schema, e.g. `User` for `#/components/schemas/User`
    pub fn ref_name(&self) -> Option<&str> {
        self.ref_path.as_deref().and_then(|r| r.rsplit('/').next())
    }
}

/// Read and parse a document from disk
pub fn parse_file(path: &Path) -> Result<ApiDocument> {
    let size = fs::metadata(path)?.len();
    if size > MAX_DOCUMENT_SIZE {
        return Err(FlowpulseError::Parse(format!(
            "OpenAPI document too large: {} bytes (max {} bytes)",
            size, MAX_DOCUMENT_SIZE
        )));
    }
    let content = fs::read_to_string(path)?;
    parse_document(&content)
        .map_err(|e| FlowpulseError::Parse(format!("{}: {}", path.display(), e)))
}

/// Parse a JSON or YAML document
pub fn parse_document(content: &str) -> Result<ApiDocument> {
    let value: Value = serde_json::from_str(content)
        .or_else(|_| serde_yaml::from_str(content))
        .map_err(|e| FlowpulseError::Parse(format!("not a JSON or YAML document: {}", e)))?;

    if value.get("openapi").is_some() {
        Ok(parse_v3(&value))
    } else if value.get("swagger").is_some() {
        Ok(parse_v2(&value))
    } else {
        Err(FlowpulseError::Parse(
            "missing 'openapi' or 'swagger' field".to_string(),
        ))
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn info(value: &Value) -> (String, String) {
    let info = value.get("info");
    let title = info
        .and_then(|i| str_field(i, "title"))
        .unwrap_or_else(|| "Untitled API".to_string());
    let version = info
        .and_then(|i| str_field(i, "version"))
        .unwrap_or_else(|| "1.0.0".to_string());
    (title, version)
}

fn parse_v3(value: &Value) -> ApiDocument {
    let (title, version) = info(value);
    let servers = value
        .get("servers")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(|s| str_field(s, "url")).collect())
        .unwrap_or_default();
    let components = value.get("components");
    let shared_params = components.and_then(|c| c.get("parameters"));

    ApiDocument {
        title,
        version,
        servers,
        endpoints: parse_paths(value, shared_params, parse_operation_v3),
        schemas: parse_schemas(components.and_then(|c| c.get("schemas"))),
    }
}

fn parse_v2(value: &Value) -> ApiDocument {
    let (title, version) = info(value);
    let host = value.get("host").and_then(Value::as_str);
    let base_path = value.get("basePath").and_then(Value::as_str).unwrap_or("");
    let servers = match host {
        Some(host) => {
            let scheme = value
                .get("schemes")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .unwrap_or("http");
            vec![format!("{}://{}{}", scheme, host, base_path)]
        }
        None if !base_path.is_empty() => vec![base_path.to_string()],
        None => Vec::new(),
    };

    ApiDocument {
        title,
        version,
        servers,
        endpoints: parse_paths(value, value.get("parameters"), parse_operation_v2),
        schemas: parse_schemas(value.get("definitions")),
    }
}

type OperationParser = fn(Method, &str, &Value, &[Value], Option<&Value>) -> Endpoint;

fn parse_paths(value: &Value, shared_params: Option<&Value>, parse: OperationParser) -> Vec<Endpoint> {
    let Some(paths) = value.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let path_params = item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for (key, method) in METHODS {
            if let Some(operation) = item.get(key) {
                endpoints.push(parse(method, path, operation, &path_params, shared_params));
            }
        }
    }
    endpoints
}

/// Operation parameters override path-level ones with the same name and location.
/// `$ref` entries are looked up in `shared`.
fn merged_parameters(operation: &Value, path_params: &[Value], shared: Option<&Value>) -> Vec<Value> {
    let resolve = |param: &Value| -> Option<Value> {
        match param.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                let name = reference.rsplit('/').next()?;
                shared?.get(name).cloned()
            }
            None => Some(param.clone()),
        }
    };
    let key = |param: &Value| (str_field(param, "name"), str_field(param, "in"));

    let own: Vec<Value> = operation
        .get("parameters")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(&resolve).collect())
        .unwrap_or_default();
    let mut merged: Vec<Value> = path_params
        .iter()
        .filter_map(&resolve)
        .filter(|p| !own.iter().any(|o| key(o) == key(p)))
        .collect();
    merged.extend(own);
    merged
}

fn location(param: &Value) -> Option<ParamLocation> {
    match param.get("in").and_then(Value::as_str)? {
        "path" => Some(ParamLocation::Path),
        "query" => Some(ParamLocation::Query),
        "header" => Some(ParamLocation::Header),
        _ => None,
    }
}

fn common_fields(operation: &Value) -> (Option<String>, Option<String>, Vec<String>, bool, Vec<String>) {
    let tags = operation
        .get("tags")
        .and_then(Value::as_array)
        .map(|t| t.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let responses = operation
        .get("responses")
        .and_then(Value::as_object)
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();
    (
        str_field(operation, "operationId"),
        str_field(operation, "summary"),
        tags,
        operation.get("deprecated").and_then(Value::as_bool).unwrap_or(false),
        responses,
    )
}

fn parse_operation_v3(
    method: Method,
    path: &str,
    operation: &Value,
    path_params: &[Value],
    shared: Option<&Value>,
) -> Endpoint {
    let (operation_id, summary, tags, deprecated, responses) = common_fields(operation);

    let parameters = merged_parameters(operation, path_params, shared)
        .iter()
        .filter_map(|param| {
            Some(Parameter {
                name: str_field(param, "name")?,
                location: location(param)?,
                required: param.get("required").and_then(Value::as_bool).unwrap_or(false),
                schema: parameter_schema(param, param.get("schema")),
            })
        })
        .collect();

    let content = operation.get("requestBody").and_then(|b| b.get("content"));
    let body = content.and_then(|content| {
        ["application/json", "application/x-www-form-urlencoded", "multipart/form-data"]
            .iter()
            .find_map(|media| content.get(*media).and_then(|m| m.get("schema")))
            .map(parse_schema)
    });

    Endpoint {
        method,
        path: path.to_string(),
        operation_id,
        summary,
        tags,
        deprecated,
        parameters,
        body,
        responses,
    }
}

fn parse_operation_v2(
    method: Method,
    path: &str,
    operation: &Value,
    path_params: &[Value],
    shared: Option<&Value>,
) -> Endpoint {
    let (operation_id, summary, tags, deprecated, responses) = common_fields(operation);

    let mut parameters = Vec::new();
    let mut body = None;
    let mut form = Schema {
        schema_type: Some("object".to_string()),
        ..Default::default()
    };
    for param in merged_parameters(operation, path_params, shared) {
        let Some(name) = str_field(&param, "name") else {
            continue;
        };
        match param.get("in").and_then(Value::as_str) {
            Some("body") => body = param.get("schema").map(parse_schema),
            Some("formData") => {
                form.properties.insert(name, parameter_schema(&param, None));
            }
            _ => {
                if let Some(location) = location(&param) {
                    parameters.push(Parameter {
                        name,
                        location,
                        required: param.get("required").and_then(Value::as_bool).unwrap_or(false),
                        // inline type information in 2.0
                        schema: parameter_schema(&param, None),
                    });
                }
            }
        }
    }
    if body.is_none() && !form.properties.is_empty() {
        body = Some(form);
    }

    Endpoint {
        method,
        path: path.to_string(),
        operation_id,
        summary,
        tags,
        deprecated,
        parameters,
        body,
        responses,
    }
}

/// Parameter schema; examples on the parameter itself win
fn parameter_schema(param: &Value, schema: Option<&Value>) -> Schema {
    let mut parsed = parse_schema(schema.unwrap_or(param));
    if let Some(example) = param.get("example").or_else(|| param.get("x-example")) {
        parsed.example = Some(example.clone());
    }
    parsed
}

fn parse_schemas(schemas: Option<&Value>) -> IndexMap<String, Schema> {
    schemas
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(name, s)| (name.clone(), parse_schema(s))).collect())
        .unwrap_or_default()
}

pub fn parse_schema(value: &Value) -> Schema {
    if let Some(reference) = value.get("$ref").and_then(Value::as_str) {
        return Schema {
            ref_path: Some(reference.to_string()),
            ..Default::default()
        };
    }

    // `allOf` members are merged into one object
    let mut properties: IndexMap<String, Schema> = value
        .get("allOf")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(parse_schema)
                .flat_map(|s| s.properties.into_iter())
                .collect()
        })
        .unwrap_or_default();
    if let Some(props) = value.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            properties.insert(name.clone(), parse_schema(prop));
        }
    }

    Schema {
        schema_type: str_field(value, "type"),
        format: str_field(value, "format"),
        properties,
        items: value.get("items").map(|i| Box::new(parse_schema(i))),
        enum_values: value
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        example: value.get("example").cloned(),
        default: value.get("default").cloned(),
        ref_path: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE_V3: &str = r##"{
      "openapi": "3.0.1",
      "info": {"title": "Petstore", "version": "2.1"},
      "servers": [{"url": "https://pets.example.com/v1"}],
      "paths": {
        "/pets/{petId}": {
          "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "integer"}}],
          "delete": {"summary": "Delete pet", "responses": {"204": {"description": "gone"}}},
          "get": {
            "operationId": "showPet",
            "tags": ["pets"],
            "parameters": [
              {"$ref": "#/components/parameters/Trace"},
              {"name": "petId", "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}}
            ],
            "responses": {"200": {"description": "ok"}}
          }
        },
        "/pets": {
          "post": {
            "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}},
            "responses": {"201": {"description": "created"}, "default": {"description": "error"}}
          }
        }
      },
      "components": {
        "parameters": {"Trace": {"name": "X-Trace", "in": "header", "schema": {"type": "string"}, "example": "t-1"}},
        "schemas": {"Pet": {"type": "object", "properties": {"name": {"type": "string"}, "age": {"type": "integer"}}}}
      }
    }"##;

    #[test]
    fn test_parse_openapi_3() {
        let doc = parse_document(PETSTORE_V3).unwrap();
        assert_eq!(doc.title, "Petstore");
        assert_eq!(doc.version, "2.1");
        assert_eq!(doc.servers, ["https://pets.example.com/v1"]);
        assert!(doc.schemas.contains_key("Pet"));

        // method order within a path is get, post, put, delete, patch
        let methods: Vec<(Method, &str)> = doc.endpoints.iter().map(|e| (e.method, e.path.as_str())).collect();
        assert_eq!(
            methods,
            [(Method::Get, "/pets/{petId}"), (Method::Delete, "/pets/{petId}"), (Method::Post, "/pets")]
        );

        let show = &doc.endpoints[0];
        assert_eq!(show.operation_id.as_deref(), Some("showPet"));
        assert_eq!(show.tags, ["pets"]);
        assert_eq!(show.parameters.len(), 2);
        let trace = &show.parameters[0];
        assert_eq!(trace.location, ParamLocation::Header);
        assert_eq!(trace.schema.example, Some(Value::from("t-1")));
        // the operation's own petId replaces the path-level one
        let pet_id = &show.parameters[1];
        assert_eq!(pet_id.schema.format.as_deref(), Some("uuid"));

        let delete = &doc.endpoints[1];
        assert_eq!(delete.parameters[0].schema.schema_type.as_deref(), Some("integer"));
        assert_eq!(delete.responses, ["204"]);

        let create = &doc.endpoints[2];
        assert_eq!(create.body.as_ref().and_then(Schema::ref_name), Some("Pet"));
    }

    #[test]
    fn test_parse_swagger_2_yaml() {
        let doc = parse_document(
            r#"
swagger: "2.0"
info: {title: Legacy, version: "1"}
host: legacy.local
basePath: /api
schemes: [https]
paths:
  /login:
    post:
      parameters:
        - {name: username, in: formData, type: string}
        - {name: remember, in: formData, type: boolean}
        - {name: lang, in: query, type: string, x-example: en}
      responses: {"200": {description: ok}}
"#,
        )
        .unwrap();
        assert_eq!(doc.servers, ["https://legacy.local/api"]);
        let login = &doc.endpoints[0];
        assert_eq!(login.parameters.len(), 1);
        assert_eq!(login.parameters[0].schema.example, Some(Value::from("en")));
        let body = login.body.as_ref().unwrap();
        assert_eq!(body.properties.keys().collect::<Vec<_>>(), ["username", "remember"]);
    }

    #[test]
    fn test_rejects_unknown_documents() {
        assert!(matches!(parse_document("{\"info\": {}}"), Err(FlowpulseError::Parse(_))));
        assert!(parse_document("::: not yaml :::\n  - [").is_err());
    }

    #[test]
    fn test_all_of_properties_merge() {
        let schema = parse_schema(&serde_json::json!({
            "allOf": [
                {"properties": {"id": {"type": "integer"}}},
                {"properties": {"name": {"type": "string"}}}
            ],
            "properties": {"extra": {"type": "boolean"}}
        }));
        assert_eq!(schema.properties.keys().collect::<Vec<_>>(), ["id", "name", "extra"]);
    }
}
