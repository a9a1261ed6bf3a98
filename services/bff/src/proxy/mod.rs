//! Proxy handlers fronting backend services.
//!
//! Every handler enforces object-level authorization before forwarding and
//! launders downstream errors: INTERNAL messages are rewritten so backend
//! detail never reaches a client.
pub mod user;

use mercata_rpc::{RpcCode, RpcError};

/// Filter an error coming back from a backend service. Internal errors are
/// logged with their original message and rewritten; everything else is
/// proxied through untouched.
pub(crate) fn launder_downstream_error(method: &str, err: RpcError) -> RpcError {
    if err.code() == RpcCode::Internal {
        tracing::error!(
            method = %method,
            error = %err.message(),
            "internal error from backend service"
        );
        return RpcError::internal();
    }
    err
}
