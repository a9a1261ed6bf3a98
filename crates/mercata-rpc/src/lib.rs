//! Connect-style RPC plumbing shared by Mercata services.
//!
//! # Purpose
//! Centralizes the wire-level pieces every service agrees on: the Connect
//! error code vocabulary and its HTTP status mapping, the JSON error body
//! shape, the reserved identity headers, and the request-scoped context that
//! carries a verified identity from the edge to downstream services.
//!
//! # How it fits
//! The BFF authenticates callers and injects a [`RequestContext`] into each
//! request; its downstream clients copy the context into reserved headers.
//! Backend services extract the same headers back into a [`RequestContext`]
//! and trust them only because the edge strips those headers from anything a
//! client sends.
//!
//! # Key invariants
//! - Reserved headers are written only when the corresponding value is
//!   non-empty.
//! - [`RpcError`] bodies never carry internal detail; callers sanitize before
//!   constructing one.

mod context;
mod error;
mod propagation;

pub use context::{
    HEADER_REQUEST_ID, HEADER_SCOPES, HEADER_USER_ID, RESERVED_IDENTITY_HEADERS, RequestContext,
};
pub use error::{ErrorBody, RpcCode, RpcError};
pub use propagation::{extract_context, inject_context, request_id_from, server_context_middleware};
