//! Binary tests: exit codes, reports and environment selection

mod common;

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{blocking, flowpulse, Workspace};

const SUITE: &str = r#"
name: smoke
config:
  variables:
    userId: 7
testcases:
  - name: get user
    api: /users/${userId}
    tags: [smoke]
    validate:
      - status: 200
      - $.name: alice
    save:
      userName: $.name
  - name: search
    api: /search
    dependsOn: get user
    params:
      q: ${userName}
    validate:
      - $.total: ">0"
  - name: admin only
    api: /admin/stats
    account: admin
    tags: [admin]
    validate:
      - status: 200
"#;

async fn mount_api(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users/7"))
        .and(header("X-Suite", "flowpulse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "name": "alice"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 3})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"accessToken": "admin-token", "refreshToken": "r", "expiresIn": 3600}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/stats"))
        .and(header("Authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": 1})))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_passing_suite() {
    let server = MockServer::start().await;
    mount_api(&server).await;

    let ws = Workspace::new();
    ws.env_config(&server.uri());
    let suite = ws.write("smoke.yml", SUITE);

    let mut cmd = flowpulse(ws.path());
    cmd.arg("run").arg(&suite);
    let output = blocking(move || cmd.output().unwrap()).await;

    output
        .assert()
        .code(0)
        .stdout(predicate::str::contains("SUITE: smoke"))
        .stdout(predicate::str::contains("✓ Case 3: admin only (200)"))
        .stdout(predicate::str::contains("Pass rate: 100.0%"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failing_case_exits_with_tests_failed() {
    let server = MockServer::start().await;
    mount_api(&server).await;

    let ws = Workspace::new();
    let config = ws.env_config(&server.uri());
    let suite = ws.write("smoke.yml", SUITE);

    let mut cmd = flowpulse(ws.path());
    cmd.arg("run")
        .arg(&suite)
        .arg("--config")
        .arg(&config)
        .args(["--var", "userId=8", "--exclude-tag", "admin"]);
    let output = blocking(move || cmd.output().unwrap()).await;

    output
        .assert()
        .code(10)
        .stdout(predicate::str::contains("✗ Case 1: get user (404)"))
        .stdout(predicate::str::contains("dependency 'get user' did not pass"))
        .stdout(predicate::str::contains("excluded by tag filter"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_report() {
    let server = MockServer::start().await;
    mount_api(&server).await;

    let ws = Workspace::new();
    ws.env_config(&server.uri());
    let suite = ws.write("smoke.yml", SUITE);

    let mut cmd = flowpulse(ws.path());
    cmd.arg("run").arg(&suite).arg("--json").args(["--exclude-tag", "admin"]);
    let output = blocking(move || cmd.output().unwrap()).await;
    assert_eq!(output.status.code(), Some(0));

    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("every line is JSON"))
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["case"]["saved_data"]["userName"], "alice");
    assert_eq!(lines[2]["case"]["skipped"], true);
    assert_eq!(lines[3]["event"], "suite_summary");
    assert_eq!(lines[3]["passed"], 2);
    assert_eq!(lines[3]["skipped"], 1);
}

#[test]
fn test_validate_suite() {
    let ws = Workspace::new();
    let suite = ws.write("smoke.yml", SUITE);

    flowpulse(ws.path())
        .arg("validate")
        .arg(&suite)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 cases"));
}

#[test]
fn test_validate_rejects_cycles() {
    let ws = Workspace::new();
    let suite = ws.write(
        "cycle.yml",
        "- name: a\n  api: /a\n  dependsOn: b\n- name: b\n  api: /b\n  dependsOn: a\n",
    );

    flowpulse(ws.path())
        .arg("validate")
        .arg(&suite)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn test_validate_rejects_malformed_yaml() {
    let ws = Workspace::new();
    let suite = ws.write("broken.yml", "this is not valid yaml: [");

    flowpulse(ws.path()).arg("validate").arg(&suite).assert().code(1);
}

#[test]
fn test_env_command_uses_config_and_selection() {
    let ws = Workspace::new();
    ws.env_config("http://localhost:9999");

    flowpulse(ws.path())
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("Environment: Development (dev)"))
        .stdout(predicate::str::contains("Root URL: http://localhost:9999"))
        .stdout(predicate::str::contains("Accounts: admin"));

    flowpulse(ws.path())
        .env("ENV", "test")
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("Root URL: http://localhost:9999/test"));

    flowpulse(ws.path())
        .env("ENV", "test")
        .args(["env", "--env", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Root URL: https://api.example.com"));
}

#[test]
fn test_env_command_without_config_uses_builtins() {
    let ws = Workspace::new();

    flowpulse(ws.path())
        .args(["env", "--env", "staging"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(stage)"));
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let ws = Workspace::new();
    let suite = ws.write("smoke.yml", SUITE);

    flowpulse(ws.path())
        .arg("run")
        .arg(&suite)
        .args(["--config", "does-not-exist.yml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot load environment config"));
}

const OPENAPI: &str = r##"
openapi: 3.0.1
info: {title: Accounts, version: "2"}
paths:
  /accounts/{accountId}:
    get:
      summary: Fetch account
      parameters:
        - {name: accountId, in: path, required: true, schema: {type: integer, example: 42}}
        - {name: verbose, in: query, schema: {type: boolean}}
      responses: {"200": {description: ok}}
  /accounts:
    post:
      operationId: createAccount
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                email: {type: string, format: email}
                openedOn: {type: string, format: date}
      responses: {"201": {description: created}}
"##;

#[test]
fn test_import_writes_a_valid_suite() {
    let ws = Workspace::new();
    let doc = ws.write("accounts.yml", OPENAPI);
    let out = ws.path().join("suite.yml");

    flowpulse(ws.path())
        .arg("import")
        .arg(&doc)
        .arg("-o")
        .arg(&out)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("✓ Imported 2 cases"));

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("/accounts/${accountId}"));
    assert!(written.contains("email: test@example.com"));
    assert!(written.contains("status: 201"));

    flowpulse(ws.path())
        .arg("validate")
        .arg(&out)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("2 cases"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_import_from_url_prints_yaml() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/api-docs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(OPENAPI))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let mut cmd = flowpulse(ws.path());
    cmd.arg("import")
        .arg(format!("{}/v3/api-docs", server.uri()))
        .args(["--name", "accounts-smoke"]);
    let output = blocking(move || cmd.output().unwrap()).await;

    output
        .assert()
        .code(0)
        .stdout(predicate::str::contains("name: accounts-smoke"))
        .stdout(predicate::str::contains("name: createAccount"))
        .stdout(predicate::str::contains("method: POST"));
}

#[test]
fn test_import_rejects_non_openapi_documents() {
    let ws = Workspace::new();
    let doc = ws.write("plain.yml", "hello: world\n");
    flowpulse(ws.path()).arg("import").arg(&doc).assert().code(1);
}
