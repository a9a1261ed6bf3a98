//! Object-level authorization for per-user resources.
//!
//! This is the only line of defense against a caller reading or mutating
//! another principal's objects by supplying that principal's id. The check
//! runs at the proxy boundary, before any downstream call is made.
use mercata_rpc::{RequestContext, RpcCode, RpcError};

/// The one scope that grants cross-subject access. New capabilities are
/// modeled as additional scopes, never as special subjects.
pub const SCOPE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Copy, Default)]
pub struct Authorizer;

impl Authorizer {
    pub fn new() -> Self {
        Self
    }

    /// Allow when the caller is the target subject or holds the `admin`
    /// scope. Unauthenticated callers are rejected as such, everyone else
    /// with a mismatched subject gets PERMISSION_DENIED.
    pub fn can_access_user(
        &self,
        ctx: &RequestContext,
        target_user_id: &str,
    ) -> Result<(), RpcError> {
        if !ctx.is_authenticated() {
            return Err(RpcError::new(
                RpcCode::Unauthenticated,
                "authentication required",
            ));
        }
        if ctx.has_scope(SCOPE_ADMIN) {
            return Ok(());
        }
        if ctx.subject != target_user_id {
            return Err(RpcError::new(RpcCode::PermissionDenied, "access denied"));
        }
        Ok(())
    }

    pub fn require_authenticated(&self, ctx: &RequestContext) -> Result<(), RpcError> {
        if !ctx.is_authenticated() {
            return Err(RpcError::new(
                RpcCode::Unauthenticated,
                "authentication required",
            ));
        }
        Ok(())
    }
}
