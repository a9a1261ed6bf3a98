//! Authentication interceptor for unary RPC procedures.
//!
//! # Per-request algorithm
//! 1. Derive the procedure name from the request path; public procedures
//!    pass through untouched.
//! 2. Derive the client IP from the trusted proxy header (first element of a
//!    comma list), falling back to the transport peer address, then to
//!    `"unknown"`.
//! 3. Refuse rate-limited IPs before any validation work.
//! 4. Extract the bearer credential; a missing or malformed one records a
//!    failure and returns an opaque 401 with `WWW-Authenticate: Bearer`.
//! 5. Validate the token; failures are categorized for logs and metrics but
//!    the client always sees the same opaque 401.
//! 6. On success, inject the verified identity into the request context.
//!
//! The credential value itself is never logged.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;

use mercata_rpc::{RequestContext, RpcCode, RpcError, request_id_from};

use crate::auth::TokenValidator;

use super::matcher::PublicEndpointMatcher;
use super::ratelimit::FailureRateLimiter;

/// Shared state for the interceptor. The interceptor exclusively owns the
/// validator and rate-limiter references.
#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<TokenValidator>,
    pub rate_limiter: Arc<FailureRateLimiter>,
    pub public_endpoints: Arc<PublicEndpointMatcher>,
    /// Header the fronting proxy sets with the real client IP.
    pub trusted_proxy_header: String,
}

pub async fn authenticate(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, RpcError> {
    let procedure = req.uri().path().to_string();
    let request_id = request_id_from(req.headers());

    if state.public_endpoints.is_public(&procedure) {
        req.extensions_mut()
            .insert(RequestContext::default().with_request_id(request_id));
        return Ok(next.run(req).await);
    }

    let client_ip = extract_client_ip(&req, &state.trusted_proxy_header);

    if state.rate_limiter.is_rate_limited(&client_ip) {
        tracing::warn!(client_ip = %client_ip, procedure = %procedure, "rate limited");
        metrics::counter!("bff_auth_rate_limited_total").increment(1);
        return Err(RpcError::new(RpcCode::ResourceExhausted, ""));
    }

    let token = match extract_bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            record_failure(&state.rate_limiter, &client_ip, &procedure, "missing_token");
            return Err(unauthenticated());
        }
    };

    let claims = match state.validator.validate(&token).await {
        Ok(claims) => claims,
        Err(err) => {
            record_failure(&state.rate_limiter, &client_ip, &procedure, err.reason());
            return Err(unauthenticated());
        }
    };

    metrics::counter!("bff_auth_success_total").increment(1);
    tracing::debug!(
        user_id = %claims.subject,
        procedure = %procedure,
        request_id = %request_id,
        "authentication successful"
    );

    let scope_string = claims.scope_string();
    let ctx = RequestContext::authenticated(claims.subject, scope_string)
        .with_request_id(request_id);
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Opaque 401. The specific failure reason stays in logs and metrics.
fn unauthenticated() -> RpcError {
    RpcError::new(RpcCode::Unauthenticated, "").with_header("www-authenticate", "Bearer")
}

fn record_failure(limiter: &FailureRateLimiter, client_ip: &str, procedure: &str, reason: &str) {
    let now_limited = limiter.record_failure(client_ip);
    metrics::counter!("bff_auth_failures_total", "reason" => reason.to_string()).increment(1);
    tracing::warn!(
        reason = %reason,
        client_ip = %client_ip,
        procedure = %procedure,
        rate_limited = now_limited,
        "authentication failed"
    );
}

/// Bearer extraction rules: the scheme is the first six bytes compared
/// case-insensitively, the seventh byte must be an ASCII space, and the
/// remainder must be non-empty after trimming. Anything else is a miss.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let bytes = value.as_bytes();
    if bytes.len() < 8 {
        return None;
    }
    if !bytes[..6].eq_ignore_ascii_case(b"bearer") {
        return None;
    }
    if bytes[6] != b' ' {
        return None;
    }
    let token = value[7..].trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Client IP for rate limiting: trusted header first (taking the first
/// element of a comma-separated list), then the transport peer address
/// minus its port, then the literal `"unknown"`.
fn extract_client_ip(req: &Request, trusted_header: &str) -> String {
    if !trusted_header.is_empty() {
        if let Some(value) = req.headers().get(trusted_header) {
            if let Ok(value) = value.to_str() {
                let first = match value.find(',') {
                    Some(idx) => &value[..idx],
                    None => value,
                };
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return peer.ip().to_string();
    }

    "unknown".to_string()
}
