//! Edge gateway application wiring.
//!
//! # Purpose
//! Builds the axum router, fixes the middleware order, and defines the
//! shared application state injected into handlers.
//!
//! # Middleware order (outermost first)
//! 1. `TraceLayer` for request spans.
//! 2. Header sanitizer: reserved identity headers never survive past here.
//! 3. Auth interceptor, applied to RPC procedures only; health endpoints
//!    sit outside it.
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, extract::State, middleware};
use tower_http::trace::TraceLayer;

use mercata_rpc::{RpcCode, RpcError};

use crate::auth::{Authorizer, KeySetCache};
use crate::client::ConnectClient;
use crate::middleware::{AuthState, HeaderSanitizer, authenticate, sanitizer::sanitize_headers};
use crate::proxy::user;

#[derive(Clone)]
pub struct AppState {
    pub user_client: ConnectClient,
    pub authorizer: Authorizer,
    pub key_set: Arc<KeySetCache>,
}

pub fn build_router(state: AppState, auth: AuthState, sanitizer: HeaderSanitizer) -> Router {
    let rpc = Router::new()
        .route("/api.v1.UserService/CreateUser", post(user::create_user))
        .route("/api.v1.UserService/GetUser", post(user::get_user))
        .route("/api.v1.UserService/UpdateUser", post(user::update_user))
        .route("/api.v1.UserService/DeleteUser", post(user::delete_user))
        .route(
            "/api.v1.UserService/VerifyPassword",
            post(user::verify_password),
        )
        .layer(middleware::from_fn_with_state(auth, authenticate));

    Router::new()
        .merge(rpc)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(middleware::from_fn_with_state(sanitizer, sanitize_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness reflects the key-set cache: without fresh key material every
/// token would fail opaque, so the instance should not receive traffic.
async fn readyz(State(state): State<AppState>) -> Result<impl IntoResponse, RpcError> {
    if !state.key_set.healthy() {
        return Err(RpcError::new(RpcCode::Unavailable, "key set unavailable"));
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
