//! In-memory transport driven by a handler closure
//!
//! Records every request it receives. Used by unit and integration tests
//! and handy for dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{HttpRequest, HttpResponse, HttpTransport};
use crate::errors::{FlowpulseError, Result};

type Handler = Box<dyn Fn(&HttpRequest, usize) -> Result<HttpResponse> + Send + Sync>;

pub struct ScriptedTransport {
    handler: Handler,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .finish()
    }
}

impl ScriptedTransport {
    /// Respond with `handler(request, call_index)`
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Same response for every request
    pub fn always(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::new(move |_, _| Ok(HttpResponse::new(status, body.clone())))
    }

    /// Responses in order; the last one repeats
    pub fn sequence(responses: Vec<(u16, String)>) -> Self {
        Self::new(move |_, idx| {
            let (status, body) = responses
                .get(idx)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or((500, String::new()));
            Ok(HttpResponse::new(status, body))
        })
    }

    /// Every request fails at the network level
    pub fn unreachable() -> Self {
        Self::new(|req, _| Err(FlowpulseError::Network(format!("connection refused: {}", req.url))))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of recorded requests whose URL ends with `suffix`
    pub fn count_path(&self, suffix: &str) -> usize {
        self.requests().iter().filter(|r| r.url.ends_with(suffix)).count()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        (self.handler)(request, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    fn test_sequence_repeats_last() {
        let t = ScriptedTransport::sequence(vec![(500, "a".into()), (200, "b".into())]);
        let req = HttpRequest::new(Method::Get, "http://x/a");
        assert_eq!(t.send(&req).unwrap().status, 500);
        assert_eq!(t.send(&req).unwrap().status, 200);
        assert_eq!(t.send(&req).unwrap().body, "b");
        assert_eq!(t.call_count(), 3);
        assert_eq!(t.count_path("/a"), 3);
    }

    #[test]
    fn test_unreachable() {
        let t = ScriptedTransport::unreachable();
        let err = t.send(&HttpRequest::new(Method::Get, "http://x")).unwrap_err();
        assert!(matches!(err, FlowpulseError::Network(_)));
    }
}
