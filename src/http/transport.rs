//! Synchronous HTTP transport
//!
//! The engine only talks to the network through [`HttpTransport`], so flows
//! and the token manager can be driven by a scripted transport in tests.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::Method;
use crate::errors::{FlowpulseError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully resolved request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Set a header, replacing any existing value (names compare case-insensitively)
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_json_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        if self.header("Content-Type").is_none() {
            self.set_header("Content-Type", "application/json");
        }
        self
    }

    /// URL with the query parameters appended
    pub fn full_url(&self) -> Result<String> {
        if self.query.is_empty() {
            return Ok(self.url.clone());
        }
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| FlowpulseError::Argument(format!("Invalid URL '{}': {}", self.url, e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub duration: Duration,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends one request and waits for the full response
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// reqwest blocking client
#[derive(Debug, Clone)]
pub struct BlockingTransport {
    client: reqwest::blocking::Client,
}

impl BlockingTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlowpulseError::Network(format!("Failed to create client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpTransport for BlockingTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.full_url()?;
        let start = Instant::now();
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.client.request(request.method.into(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            trace!(body = %body, "Request body");
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .map_err(|e| FlowpulseError::Network(format!("{} {} failed: {}", request.method, url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response
            .text()
            .map_err(|e| FlowpulseError::Network(format!("Failed to read response body: {}", e)))?;
        let duration = start.elapsed();

        debug!(status, elapsed_ms = duration.as_millis() as u64, "Response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
            duration,
        })
    }
}
