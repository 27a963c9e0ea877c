//! Flow execution
//!
//! Steps run strictly in order. Each step gets `retry + 1` attempts; an
//! attempt resolves the request, sends it, checks the status and every
//! assertion, then writes extractions to the shared pool. Extraction
//! failures are logged and never fail the step.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::result::{FlowResult, StepResult};
use super::step::{Step, StepBuilder};
use crate::auth::TokenManager;
use crate::config::EnvConfig;
use crate::errors::{FlowpulseError, Result, VerificationFailure};
use crate::http::{join_url, HttpRequest, HttpTransport, Method};
use crate::logging::mask_secret;
use crate::resolver::Resolver;
use crate::signals::{self, InterruptFlag};
use crate::store::SharedDataPool;
use crate::validation::{self, render, Located, ResponseView};

/// Called with the flow result before the first step and after the last
pub type FlowCallback = Box<dyn Fn(&FlowResult) + Send + Sync>;

pub struct FlowExecutor {
    env: Arc<EnvConfig>,
    transport: Arc<dyn HttpTransport>,
    pool: SharedDataPool,
    resolver: Resolver,
    tokens: Option<Arc<TokenManager>>,
    steps: Vec<Step>,
    before_flow: Option<FlowCallback>,
    after_flow: Option<FlowCallback>,
    interrupt: InterruptFlag,
}

impl std::fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("root_url", &self.env.root_url)
            .field("steps", &self.steps.len())
            .field("pool", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl FlowExecutor {
    pub fn new(env: Arc<EnvConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            env,
            transport,
            pool: SharedDataPool::new(),
            resolver: Resolver::new(),
            tokens: None,
            steps: Vec::new(),
            before_flow: None,
            after_flow: None,
            interrupt: signals::global(),
        }
    }

    /// Share a pool with other flows
    pub fn with_pool(mut self, pool: SharedDataPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_tokens(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Seed a pool value
    pub fn with_data(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pool.set(key, value);
        self
    }

    pub fn before_flow<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FlowResult) + Send + Sync + 'static,
    {
        self.before_flow = Some(Box::new(callback));
        self
    }

    pub fn after_flow<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FlowResult) + Send + Sync + 'static,
    {
        self.after_flow = Some(Box::new(callback));
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// GET step expecting 200
    pub fn get(self, name: &str, url: &str) -> Self {
        self.step(
            StepBuilder::new(name)
                .request(Method::Get, url)
                .expect_status(200)
                .build(),
        )
    }

    /// POST step expecting 200
    pub fn post(self, name: &str, url: &str, body: &str) -> Self {
        self.step(
            StepBuilder::new(name)
                .request(Method::Post, url)
                .body(body)
                .expect_status(200)
                .build(),
        )
    }

    /// Login step that stores the token found at `token_path` under `token_key`
    pub fn login(
        self,
        login_url: &str,
        username: &str,
        password: &str,
        token_path: &str,
        token_key: &str,
    ) -> Self {
        let body = serde_json::json!({ "username": username, "password": password });
        self.step(
            StepBuilder::new("login")
                .description("User login")
                .request(Method::Post, login_url)
                .body(body.to_string())
                .expect_status(200)
                .extract(token_key, token_path)
                .build(),
        )
    }

    pub fn pool(&self) -> &SharedDataPool {
        &self.pool
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.pool.get(key)
    }

    pub fn clear_shared_data(&self) {
        self.pool.clear();
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Numbered outline of the flow, also logged at debug level
    pub fn describe(&self, name: &str) -> String {
        let mut out = format!("Flow '{}'", name);
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {} {} {}",
                i + 1,
                step.name,
                step.request.method,
                step.request.url
            ));
            if let Some(description) = &step.description {
                out.push_str(&format!(" - {}", description));
            }
            if !step.extractions.is_empty() {
                let keys: Vec<&str> = step.extractions.keys().map(String::as_str).collect();
                out.push_str(&format!("\n   extract: {}", keys.join(", ")));
            }
        }
        debug!(flow = %name, outline = %out, "Flow structure");
        out
    }

    /// Run every step in order
    pub fn run(&self, name: &str) -> FlowResult {
        info!(flow = %name, steps = self.steps.len(), "Starting flow");
        let started = Instant::now();
        let mut flow = FlowResult::new(name);
        flow.shared_data = self.pool.snapshot();

        if let Some(callback) = &self.before_flow {
            callback(&flow);
        }

        let total = self.steps.len();
        for (idx, step) in self.steps.iter().enumerate() {
            if self.interrupt.is_set() {
                warn!(flow = %name, step = %step.name, "Interrupted, remaining steps skipped");
                flow.interrupted = true;
                break;
            }
            info!(step = %step.name, "Step {}/{}", idx + 1, total);

            if !step.delay_before.is_zero() && !self.interrupt.sleep(step.delay_before) {
                flow.interrupted = true;
                break;
            }

            let result = self.execute_step(step);
            let success = result.success;
            if success {
                info!(step = %step.name, "Step passed");
                if let Some(callback) = &step.on_success {
                    callback(&result);
                }
            } else {
                error!(
                    step = %step.name,
                    error = result.error_message.as_deref().unwrap_or(""),
                    "Step failed"
                );
                if let Some(callback) = &step.on_failure {
                    callback(&result);
                }
            }
            flow.push(result);

            if !success && step.stop_on_failure {
                warn!(flow = %name, step = %step.name, "Stopping flow after failed step");
                break;
            }
        }

        flow.shared_data = self.pool.snapshot();
        flow.success = flow.failed_count == 0 && !flow.interrupted;
        flow.total_duration = started.elapsed();

        if let Some(callback) = &self.after_flow {
            callback(&flow);
        }

        info!(
            flow = %name,
            success = flow.success,
            passed = flow.passed_count,
            failed = flow.failed_count,
            duration_ms = flow.total_duration.as_millis() as u64,
            "Flow finished"
        );
        flow
    }

    /// Run one step through its retry policy
    pub fn execute_step(&self, step: &Step) -> StepResult {
        let started = Instant::now();
        let mut result = StepResult::new(&step.name);
        let max_attempts = step.retry.max_attempts();

        for attempt in 1..=max_attempts {
            result.retry_attempts = attempt - 1;
            match self.attempt(step, &mut result) {
                Ok(()) => {
                    result.success = true;
                    result.error_message = None;
                    break;
                }
                Err(e) => {
                    result.success = false;
                    result.failures = e.verification_failures().to_vec();
                    result.error_message = Some(e.to_string());
                    warn!(
                        step = %step.name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    if attempt < max_attempts && !self.interrupt.sleep(step.retry.delay) {
                        break;
                    }
                }
            }
        }

        result.duration = started.elapsed();
        result
    }

    fn attempt(&self, step: &Step, result: &mut StepResult) -> Result<()> {
        result.extracted.clear();
        result.passed_assertions.clear();
        result.failures.clear();

        for (key, value) in &step.overrides {
            let resolved = self.resolver.resolve(value, &self.pool)?;
            debug!(key = %key, value = %resolved, "Param override");
            self.pool.set(key.clone(), resolved);
        }

        let request = self.build_request(step)?;
        let response = self.transport.send(&request)?;
        let body = response.body;
        result.status_code = response.status;
        result.response_body = body.clone();

        let expected = step.request.expected_status;
        if expected > 0 && response.status != expected {
            return Err(FlowpulseError::Verification(VerificationFailure::new(
                "status",
                "=",
                expected.to_string(),
                response.status.to_string(),
            )));
        }

        let view = ResponseView::new(response.status, &body);
        let mut failures = Vec::new();
        for assertion in &step.assertions {
            match assertion.evaluate(&view) {
                Ok(()) => result.passed_assertions.push(assertion.to_string()),
                Err(failure) => failures.push(failure),
            }
        }
        validation::into_result(failures)?;

        for (key, path) in &step.extractions {
            match view.locate(path) {
                Located::Found(value) => {
                    let text = if value.is_null() {
                        String::new()
                    } else {
                        render(&value)
                    };
                    debug!(key = %key, value = %text, "Extracted");
                    self.pool.set(key.clone(), text.clone());
                    result.extracted.insert(key.clone(), text);
                }
                Located::Missing => {
                    warn!(key = %key, path = %path, "Extraction found nothing");
                }
            }
        }
        Ok(())
    }

    fn build_request(&self, step: &Step) -> Result<HttpRequest> {
        let spec = &step.request;
        let path = self.resolver.resolve(&spec.url, &self.pool)?;
        let mut request = HttpRequest::new(spec.method, join_url(&self.env.root_url, &path));

        for (name, value) in &self.env.headers {
            request.set_header(name.clone(), value.clone());
        }
        for (name, value) in &spec.headers {
            let value = self.resolver.resolve(value, &self.pool)?;
            request.set_header(name.clone(), value);
        }
        if let Some(account) = &step.account {
            if let Some(header) = self.authorization_for(account) {
                request.set_header("Authorization", header);
            }
        }

        for (name, value) in &spec.query {
            let value = self.resolver.resolve(value, &self.pool)?;
            request.query.push((name.clone(), value));
        }

        if let Some(body) = self.resolver.resolve_opt(spec.body.as_deref(), &self.pool)? {
            if !body.trim().is_empty() {
                request = request.with_json_body(body);
            }
        }
        Ok(request)
    }

    /// Bearer header for `account`; problems are logged and the request is
    /// sent without it
    fn authorization_for(&self, account: &str) -> Option<String> {
        if let Some(tokens) = &self.tokens {
            match tokens.authorization_header(account) {
                Ok(header) => return Some(header),
                Err(e) => {
                    warn!(account = %account, error = %e, "Could not obtain token");
                    return None;
                }
            }
        }
        match self.env.tokens.get(account) {
            Some(token) => {
                debug!(account = %account, token = %mask_secret(token), "Using configured token");
                Some(format!("Bearer {}", token))
            }
            None => {
                warn!(account = %account, "No token source for account");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, ScriptedTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn env() -> Arc<EnvConfig> {
        let mut config = EnvConfig::with_root_url("http://api.local");
        config.headers.insert("Accept".into(), "application/json".into());
        Arc::new(config)
    }

    fn executor(transport: Arc<ScriptedTransport>) -> FlowExecutor {
        FlowExecutor::new(env(), transport).with_interrupt(InterruptFlag::new())
    }

    fn quick(name: &str) -> StepBuilder {
        Step::builder(name).retry(0, Duration::ZERO)
    }

    #[test]
    fn test_extraction_feeds_next_step() {
        let transport = Arc::new(ScriptedTransport::new(|req: &HttpRequest, _| {
            if req.url.ends_with("/login") {
                Ok(HttpResponse::new(200, r#"{"data":{"token":"t-1","uid":42}}"#))
            } else {
                Ok(HttpResponse::new(200, r#"{"code":0}"#))
            }
        }));
        let flow = executor(transport.clone())
            .step(
                quick("login")
                    .request(Method::Post, "/login")
                    .body(r#"{"user":"a"}"#)
                    .extract("token", "$.data.token")
                    .extract("uid", "$.data.uid")
                    .build(),
            )
            .step(
                quick("profile")
                    .request(Method::Get, "/users/${uid}")
                    .header("X-Token", "${token}")
                    .query("fields", "name")
                    .assertion("$.code", "0")
                    .build(),
            )
            .run("profile");

        assert!(flow.success);
        assert_eq!(flow.extracted("token"), Some("t-1"));
        let requests = transport.requests();
        assert_eq!(requests[1].url, "http://api.local/users/42");
        assert_eq!(requests[1].header("X-Token"), Some("t-1"));
        assert_eq!(requests[1].header("Accept"), Some("application/json"));
        assert_eq!(requests[1].query, vec![("fields".to_string(), "name".to_string())]);
        assert_eq!(requests[0].header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_retry_counts_attempts() {
        let transport = Arc::new(ScriptedTransport::always(500, "{}"));
        let step = quick("flaky")
            .request(Method::Get, "/x")
            .expect_status(200)
            .retry(2, Duration::ZERO)
            .build();
        let result = executor(transport.clone()).execute_step(&step);
        assert!(!result.success);
        assert_eq!(result.retry_attempts, 2);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(result.failures[0].path, "status");
    }

    #[test]
    fn test_retry_recovers() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            (503, "{}".into()),
            (200, r#"{"ok":true}"#.into()),
        ]));
        let step = quick("eventually")
            .request(Method::Get, "/x")
            .expect_status(200)
            .retry(3, Duration::ZERO)
            .build();
        let result = executor(transport.clone()).execute_step(&step);
        assert!(result.success);
        assert_eq!(result.retry_attempts, 1);
        assert!(result.error_message.is_none());
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn test_stop_on_failure_halts_flow() {
        let transport = Arc::new(ScriptedTransport::always(500, "{}"));
        let flow = executor(transport.clone())
            .step(quick("a").request(Method::Get, "/a").expect_status(200).build())
            .step(quick("b").request(Method::Get, "/b").build())
            .run("stop");
        assert!(!flow.success);
        assert_eq!(flow.steps.len(), 1);
        assert!(flow.step("b").is_none());
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_continue_after_failure() {
        let transport = Arc::new(ScriptedTransport::always(500, "{}"));
        let flow = executor(transport)
            .step(
                quick("a")
                    .request(Method::Get, "/a")
                    .expect_status(200)
                    .stop_on_failure(false)
                    .build(),
            )
            .step(quick("b").request(Method::Get, "/b").build())
            .run("continue");
        assert!(!flow.success);
        assert_eq!(flow.steps.len(), 2);
        assert_eq!(flow.passed_count, 1);
        assert_eq!(flow.failed_count, 1);
    }

    #[test]
    fn test_all_assertion_failures_collected() {
        let transport = Arc::new(ScriptedTransport::always(200, r#"{"code":1,"msg":"no"}"#));
        let step = quick("s")
            .request(Method::Get, "/s")
            .assertion("$.code", "0")
            .assertion("$.msg", "ok")
            .assertion("$.msg", "notNull")
            .build();
        let result = executor(transport).execute_step(&step);
        assert!(!result.success);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.passed_assertions, vec!["$.msg:notNull".to_string()]);
        let message = result.error_message.unwrap();
        assert!(message.contains("$.code"));
        assert!(message.contains("$.msg"));
    }

    #[test]
    fn test_failed_extraction_does_not_fail_step() {
        let transport = Arc::new(ScriptedTransport::always(200, r#"{"id":1,"none":null}"#));
        let exec = executor(transport);
        let step = quick("s")
            .request(Method::Get, "/s")
            .extract("missing", "$.nope")
            .extract("none", "$.none")
            .extract("id", "$.id")
            .build();
        let result = exec.execute_step(&step);
        assert!(result.success);
        assert!(result.extracted_value("missing").is_none());
        assert_eq!(result.extracted_value("none"), Some(""));
        assert_eq!(exec.value("id").as_deref(), Some("1"));
    }

    #[test]
    fn test_overrides_visible_to_body() {
        let transport = Arc::new(ScriptedTransport::always(200, "{}"));
        let exec = executor(transport.clone());
        let step = quick("create")
            .request(Method::Post, "/orders")
            .param("orderNo", "ORD-__random(4,true)")
            .body(r#"{"orderNo":"${orderNo}"}"#)
            .build();
        assert!(exec.execute_step(&step).success);

        let order_no = exec.value("orderNo").unwrap();
        assert!(order_no.starts_with("ORD-"));
        assert_eq!(order_no.len(), 8);
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body, format!(r#"{{"orderNo":"{}"}}"#, order_no));
    }

    #[test]
    fn test_bad_function_arguments_fail_the_step() {
        let transport = Arc::new(ScriptedTransport::always(200, "{}"));
        let step = quick("s")
            .request(Method::Get, "/s/__randomInt(a,b)")
            .build();
        let result = executor(transport.clone()).execute_step(&step);
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("randomInt"));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_callbacks_fire_once() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            (200, "{}".into()),
            (500, "{}".into()),
        ]));
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let (s, f) = (successes.clone(), failures.clone());

        let flow = executor(transport)
            .step(
                quick("ok")
                    .request(Method::Get, "/a")
                    .on_success(move |_| {
                        s.fetch_add(1, Ordering::SeqCst);
                    })
                    .build(),
            )
            .step(
                quick("bad")
                    .request(Method::Get, "/b")
                    .expect_status(200)
                    .retry(2, Duration::ZERO)
                    .on_failure(move |r| f.lock().unwrap().push(r.retry_attempts))
                    .build(),
            )
            .run("callbacks");

        assert!(!flow.success);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(*failures.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_flow_hooks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (before, after) = (seen.clone(), seen.clone());
        let flow = executor(Arc::new(ScriptedTransport::always(200, "{}")))
            .with_data("seed", "1")
            .before_flow(move |f| before.lock().unwrap().push(format!("before:{}", f.steps.len())))
            .after_flow(move |f| after.lock().unwrap().push(format!("after:{}", f.steps.len())))
            .get("one", "/one")
            .run("hooks");
        assert!(flow.success);
        assert_eq!(flow.extracted("seed"), Some("1"));
        assert_eq!(*seen.lock().unwrap(), vec!["before:0", "after:1"]);
    }

    #[test]
    fn test_interrupt_stops_flow() {
        let interrupt = InterruptFlag::new();
        let flag = interrupt.clone();
        let flow = FlowExecutor::new(env(), Arc::new(ScriptedTransport::always(200, "{}")))
            .with_interrupt(interrupt)
            .step(
                quick("first")
                    .request(Method::Get, "/a")
                    .on_success(move |_| flag.set())
                    .build(),
            )
            .get("second", "/b")
            .run("interrupted");
        assert!(flow.interrupted);
        assert!(!flow.success);
        assert_eq!(flow.steps.len(), 1);
    }

    #[test]
    fn test_absolute_url_and_static_account_token() {
        let mut config = EnvConfig::with_root_url("http://api.local");
        config.tokens.insert("ops".into(), "static-token".into());
        let transport = Arc::new(ScriptedTransport::always(200, "{}"));
        let flow = FlowExecutor::new(Arc::new(config), transport.clone())
            .with_interrupt(InterruptFlag::new())
            .step(
                quick("external")
                    .request(Method::Get, "https://other.host/health")
                    .account("ops")
                    .build(),
            )
            .step(quick("anon").request(Method::Get, "/x").account("nobody").build())
            .run("accounts");
        assert!(flow.success);
        let requests = transport.requests();
        assert_eq!(requests[0].url, "https://other.host/health");
        assert_eq!(requests[0].header("Authorization"), Some("Bearer static-token"));
        assert!(requests[1].header("Authorization").is_none());
    }

    #[test]
    fn test_token_manager_header() {
        use crate::auth::AccountConfig;

        let transport = Arc::new(ScriptedTransport::new(|req: &HttpRequest, _| {
            if req.url.ends_with("/auth/login") {
                Ok(HttpResponse::new(200, r#"{"data":{"accessToken":"managed"}}"#))
            } else {
                Ok(HttpResponse::new(200, "{}"))
            }
        }));
        let tokens = Arc::new(
            TokenManager::new("http://api.local", transport.clone()).with_accounts([(
                "admin".to_string(),
                AccountConfig::new("admin", "pw", "/auth/login"),
            )]),
        );
        let flow = executor(transport.clone())
            .with_tokens(tokens)
            .step(quick("secure").request(Method::Get, "/secure").account("admin").build())
            .run("managed");
        assert!(flow.success);
        let secure = transport
            .requests()
            .into_iter()
            .find(|r| r.url.ends_with("/secure"))
            .unwrap();
        assert_eq!(secure.header("Authorization"), Some("Bearer managed"));
    }

    #[test]
    fn test_login_helper() {
        let transport = Arc::new(ScriptedTransport::always(200, r#"{"data":{"token":"abc"}}"#));
        let flow = executor(transport.clone())
            .login("/login", "alice", "pw", "$.data.token", "token")
            .post("echo", "/echo", r#"{"t":"${token}"}"#)
            .run("login");
        assert!(flow.success);
        assert_eq!(flow.extracted("token"), Some("abc"));
        assert_eq!(
            transport.requests()[1].body.as_deref(),
            Some(r#"{"t":"abc"}"#)
        );
    }

    #[test]
    fn test_snapshot_unaffected_by_later_env() {
        let transport = Arc::new(ScriptedTransport::always(200, "{}"));
        let registry = crate::config::EnvRegistry::default();
        let dev = FlowExecutor::new(registry.current(), transport.clone())
            .with_interrupt(InterruptFlag::new())
            .get("ping", "/ping");
        let first = dev.run("dev");
        registry.switch(crate::config::Environment::Test);
        let test = FlowExecutor::new(registry.current(), transport.clone())
            .with_interrupt(InterruptFlag::new())
            .get("ping", "/ping");
        let second = test.run("test");

        assert!(first.success && second.success);
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls[0], "https://jsonplaceholder.typicode.com/ping");
        assert_eq!(urls[1], "https://api-test.example.com/ping");
        assert_eq!(first.flow_name, "dev");
    }

    #[test]
    fn test_describe() {
        let exec = executor(Arc::new(ScriptedTransport::always(200, "{}")))
            .login("/login", "a", "b", "$.t", "t")
            .get("list", "/items");
        let outline = exec.describe("outline");
        assert!(outline.contains("1. login POST /login - User login"));
        assert!(outline.contains("extract: t"));
        assert!(outline.contains("2. list GET /items"));
    }
}
