//! Identity propagation between services.
//!
//! Client side: copy the validated context into reserved headers before an
//! outgoing call. Server side: read the same headers back into a
//! [`RequestContext`]. Downstream services may only trust these headers when
//! they sit behind the sanitizing edge; nothing here verifies anything.
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use crate::context::{HEADER_REQUEST_ID, HEADER_SCOPES, HEADER_USER_ID, RequestContext};

/// Write the context into outgoing request headers. Only non-empty values
/// are written so downstream extraction can distinguish "absent" cleanly.
pub fn inject_context(ctx: &RequestContext, headers: &mut HeaderMap) {
    set_if_present(headers, HEADER_USER_ID, &ctx.subject);
    set_if_present(headers, HEADER_SCOPES, &ctx.scopes);
    set_if_present(headers, HEADER_REQUEST_ID, &ctx.request_id);
}

/// Read propagated identity out of incoming request headers.
pub fn extract_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        subject: header_str(headers, HEADER_USER_ID),
        scopes: header_str(headers, HEADER_SCOPES),
        request_id: header_str(headers, HEADER_REQUEST_ID),
    }
}

/// Correlation id for this request: the inbound `x-request-id` when present,
/// a fresh UUID otherwise.
pub fn request_id_from(headers: &HeaderMap) -> String {
    let id = header_str(headers, HEADER_REQUEST_ID);
    if id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        id
    }
}

/// Server-side propagation middleware for backend services: extracts the
/// reserved headers into a [`RequestContext`] request extension.
pub async fn server_context_middleware(mut req: Request, next: Next) -> Response {
    let mut ctx = extract_context(req.headers());
    if ctx.request_id.is_empty() {
        ctx.request_id = uuid::Uuid::new_v4().to_string();
    }
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

fn set_if_present(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if value.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_writes_only_non_empty_values() {
        let ctx = RequestContext::authenticated("user-123", "read write");
        let mut headers = HeaderMap::new();
        inject_context(&ctx, &mut headers);
        assert_eq!(headers.get(HEADER_USER_ID).unwrap(), "user-123");
        assert_eq!(headers.get(HEADER_SCOPES).unwrap(), "read write");
        assert!(headers.get(HEADER_REQUEST_ID).is_none());
    }

    #[test]
    fn inject_skips_everything_for_anonymous_context() {
        let ctx = RequestContext::default();
        let mut headers = HeaderMap::new();
        inject_context(&ctx, &mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn extract_round_trips_injected_context() {
        let ctx = RequestContext::authenticated("user-123", "read").with_request_id("req-1");
        let mut headers = HeaderMap::new();
        inject_context(&ctx, &mut headers);
        assert_eq!(extract_context(&headers), ctx);
    }

    #[test]
    fn request_id_generated_when_absent() {
        let headers = HeaderMap::new();
        let id = request_id_from(&headers);
        assert!(!id.is_empty());

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_REQUEST_ID, "req-7".parse().unwrap());
        assert_eq!(request_id_from(&headers), "req-7");
    }
}
