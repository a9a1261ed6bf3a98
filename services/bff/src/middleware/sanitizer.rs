//! Inbound header sanitization.
//!
//! Strips the reserved internal identity headers from every request before
//! any handler or interceptor sees it. Without this, a client could forge
//! the exact headers the auth interceptor injects after verification.
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use mercata_rpc::RESERVED_IDENTITY_HEADERS;

#[derive(Debug, Clone)]
pub struct HeaderSanitizer {
    remove: Arc<[HeaderName]>,
}

impl Default for HeaderSanitizer {
    fn default() -> Self {
        Self::new(RESERVED_IDENTITY_HEADERS)
    }
}

impl HeaderSanitizer {
    /// Header names are canonicalized to lowercase, and `HeaderMap` lookups
    /// are case-insensitive, so `X-User-Id` and `x-user-id` are one header.
    pub fn new<I>(headers: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let remove: Vec<HeaderName> = headers
            .into_iter()
            .filter_map(|name| name.as_ref().parse().ok())
            .collect();
        Self {
            remove: remove.into(),
        }
    }

    /// Remove every configured header. `HeaderMap::remove` drops all values
    /// recorded under the name, so repeated headers cannot slip through.
    pub fn strip(&self, headers: &mut HeaderMap) {
        for name in self.remove.iter() {
            headers.remove(name);
        }
    }
}

/// Axum middleware wrapping [`HeaderSanitizer::strip`].
pub async fn sanitize_headers(
    State(sanitizer): State<HeaderSanitizer>,
    mut req: Request,
    next: Next,
) -> Response {
    sanitizer.strip(req.headers_mut());
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn value(s: &str) -> HeaderValue {
        HeaderValue::from_str(s).unwrap()
    }

    #[test]
    fn strips_reserved_headers_case_insensitively() {
        let sanitizer = HeaderSanitizer::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", value("forged"));
        headers.insert("X-Scopes", value("admin"));
        headers.insert("X-USER-ROLE", value("root"));
        headers.insert("x-tenant-id", value("t1"));
        headers.insert("x-request-id", value("req-1"));
        headers.insert("authorization", value("Bearer abc"));

        sanitizer.strip(&mut headers);

        assert!(headers.get("x-user-id").is_none());
        assert!(headers.get("x-scopes").is_none());
        assert!(headers.get("x-user-role").is_none());
        assert!(headers.get("x-tenant-id").is_none());
        // Non-reserved headers pass through.
        assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn strips_repeated_values() {
        let sanitizer = HeaderSanitizer::default();
        let mut headers = HeaderMap::new();
        headers.append("x-scopes", value("admin"));
        headers.append("x-scopes", value("root"));
        sanitizer.strip(&mut headers);
        assert!(headers.get("x-scopes").is_none());
    }

    #[test]
    fn custom_header_set() {
        let sanitizer = HeaderSanitizer::new(["x-internal-debug"]);
        let mut headers = HeaderMap::new();
        headers.insert("x-internal-debug", value("1"));
        headers.insert("x-user-id", value("kept"));
        sanitizer.strip(&mut headers);
        assert!(headers.get("x-internal-debug").is_none());
        assert_eq!(headers.get("x-user-id").unwrap(), "kept");
    }
}
