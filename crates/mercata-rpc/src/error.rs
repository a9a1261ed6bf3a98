//! Connect error codes and the JSON error response shape.
//!
//! # Purpose
//! One error type that every handler returns and every client can parse.
//! The code vocabulary and the HTTP status mapping follow the Connect unary
//! protocol, so gRPC-aware callers see familiar semantics.
use axum::Json;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

/// Connect unary error codes used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    Aborted,
    FailedPrecondition,
    ResourceExhausted,
    Internal,
    Unavailable,
    DeadlineExceeded,
    Unknown,
}

impl RpcCode {
    /// HTTP status for this code per the Connect protocol mapping.
    pub fn http_status(self) -> StatusCode {
        match self {
            RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
            RpcCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            RpcCode::PermissionDenied => StatusCode::FORBIDDEN,
            RpcCode::NotFound => StatusCode::NOT_FOUND,
            RpcCode::AlreadyExists | RpcCode::Aborted => StatusCode::CONFLICT,
            RpcCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            RpcCode::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            RpcCode::Internal | RpcCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            RpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            RpcCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// JSON body of a Connect unary error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: RpcCode,
    pub message: String,
}

/// RPC error carrying a Connect code, a client-safe message, and optional
/// response headers (e.g. `WWW-Authenticate` on 401s).
#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct RpcError {
    code: RpcCode,
    message: String,
    headers: HeaderMap,
}

impl RpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Sanitized internal error. The original cause belongs in logs, not here.
    pub fn internal() -> Self {
        Self::new(RpcCode::Internal, "internal server error")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(RpcCode::InvalidArgument, message)
    }

    /// Attach a response header. Invalid name/value pairs are ignored rather
    /// than turning an error response into a panic.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn code(&self) -> RpcCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> axum::response::Response {
        let status = self.code.http_status();
        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (status, self.headers, Json(body)).into_response()
    }
}
