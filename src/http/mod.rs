//! HTTP types and the transport abstraction

mod method;
pub mod scripted;
mod transport;

pub use method::Method;
pub use scripted::ScriptedTransport;
pub use transport::{BlockingTransport, HttpRequest, HttpResponse, HttpTransport};

/// Join a root URL and a path. Absolute URLs are returned unchanged.
pub fn join_url(root: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if root.is_empty() {
        return path.to_string();
    }
    match (root.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", root, &path[1..]),
        (false, false) if !path.is_empty() => format!("{}/{}", root, path),
        _ => format!("{}{}", root, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://a.com", "/x"), "http://a.com/x");
        assert_eq!(join_url("http://a.com/", "/x"), "http://a.com/x");
        assert_eq!(join_url("http://a.com", "x"), "http://a.com/x");
        assert_eq!(join_url("http://a.com/", "x"), "http://a.com/x");
        assert_eq!(join_url("http://a.com", ""), "http://a.com");
        assert_eq!(join_url("http://a.com", "https://b.com/y"), "https://b.com/y");
        assert_eq!(join_url("", "/x"), "/x");
    }
}
