//! Request-scoped identity context.
//!
//! # Purpose
//! Replaces ambient/thread-local identity with an explicit value that travels
//! with each request: the verified subject, its scopes, and the correlation
//! id. Handlers receive it as an axum extension; downstream clients copy it
//! into reserved wire headers.

/// Header carrying the verified subject to downstream services.
pub const HEADER_USER_ID: &str = "x-user-id";
/// Header carrying the space-separated scope list to downstream services.
pub const HEADER_SCOPES: &str = "x-scopes";
/// Header carrying the request correlation id.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Identity headers that must never be accepted from untrusted clients.
/// The edge strips these from every inbound request before routing.
pub const RESERVED_IDENTITY_HEADERS: [&str; 4] =
    [HEADER_USER_ID, HEADER_SCOPES, "x-user-role", "x-tenant-id"];

/// Identity and correlation state for one request.
///
/// An empty `subject` means the request is unauthenticated (public endpoint
/// or a downstream call made outside any user context).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub subject: String,
    /// Space-separated scope list, exactly as carried on the wire.
    pub scopes: String,
    pub request_id: String,
}

impl RequestContext {
    pub fn authenticated(subject: impl Into<String>, scopes: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            scopes: scopes.into(),
            request_id: String::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn is_authenticated(&self) -> bool {
        !self.subject.is_empty()
    }

    /// True when the scope list contains `scope` as a whole token.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.split_whitespace().any(|s| s == scope)
    }
}
