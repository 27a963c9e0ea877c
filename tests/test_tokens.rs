//! Token manager against a real auth server

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::blocking;
use flowpulse::auth::{AccountConfig, TokenManager};
use flowpulse::http::{BlockingTransport, HttpTransport};

fn manager(root_url: &str) -> TokenManager {
    let transport: Arc<dyn HttpTransport> = Arc::new(BlockingTransport::new().unwrap());
    let admin = AccountConfig::new("admin", "s3cret", "/auth/login")
        .with_refresh_url("/auth/refresh")
        .with_extra_param("tenant", "acme");
    TokenManager::new(root_url, transport).with_accounts([("admin".to_string(), admin)])
}

fn issued(access: &str, refresh: &str, expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 0,
        "data": {"accessToken": access, "refreshToken": refresh, "expiresIn": expires_in}
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_once_then_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"username": "admin", "password": "s3cret", "tenant": "acme"})))
        .respond_with(issued("access-1", "refresh-1", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let (first, second, header) = blocking(move || {
        let tokens = manager(&uri);
        let first = tokens.get_token("admin").unwrap();
        let second = tokens.get_token("admin").unwrap();
        let header = tokens.authorization_header("admin").unwrap();
        tokens.shutdown();
        (first, second, header)
    })
    .await;

    assert_eq!(first, "access-1");
    assert_eq!(second, "access-1");
    assert_eq!(header, "Bearer access-1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expiring_token_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-0"})))
        .respond_with(issued("access-2", "refresh-2", 3600))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(issued("unexpected", "unexpected", 3600))
        .expect(0)
        .mount(&server)
        .await;

    let uri = server.uri();
    let (token, refresh_count) = blocking(move || {
        let tokens = manager(&uri);
        // inside the expiry margin, so the next request renews it
        tokens.set_token_with_refresh("admin", "access-0", "refresh-0", Duration::from_secs(30));
        let token = tokens.get_token("admin").unwrap();
        let info = tokens.token_info("admin").unwrap();
        (token, info.refresh_count)
    })
    .await;

    assert_eq!(token, "access-2");
    assert_eq!(refresh_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_refresh_falls_back_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(issued("access-3", "refresh-3", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let token = blocking(move || {
        let tokens = manager(&uri);
        tokens.set_token_with_refresh("admin", "access-0", "refresh-0", Duration::from_secs(30));
        tokens.get_token("admin").unwrap()
    })
    .await;

    assert_eq!(token, "access-3");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_login_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let uri = server.uri();
    let message = blocking(move || manager(&uri).get_token("admin").unwrap_err().to_string()).await;
    assert!(message.contains("Authentication"));
    assert!(message.contains("403"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_sent_max_expiry_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"data":{"accessToken":"forever","expiresIn":18446744073709551615}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let (first, second, expired) = blocking(move || {
        let tokens = manager(&uri);
        let first = tokens.get_token("admin").unwrap();
        let second = tokens.get_token("admin").unwrap();
        let expired = tokens.token_info("admin").unwrap().is_expired();
        (first, second, expired)
    })
    .await;

    assert_eq!(first, "forever");
    assert_eq!(second, "forever");
    assert!(!expired);
}
