//! User-service proxy.
//!
//! The BFF does not own user data; it verifies the caller may touch the
//! target user, forwards the call, and filters what comes back.
use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use mercata_rpc::{RequestContext, RpcCode, RpcError};

use crate::app::AppState;

use super::launder_downstream_error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserRequest {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserRequest {
    pub id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeleteUserResponse {}

/// Registration; typically whitelisted as a public endpoint.
pub async fn create_user(
    State(app): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>, RpcError> {
    let resp = app
        .user_client
        .call(&ctx, "/api.v1.UserService/CreateUser", &req)
        .await
        .map_err(|err| launder_downstream_error("CreateUser", err))?;
    Ok(Json(resp))
}

pub async fn get_user(
    State(app): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<GetUserRequest>,
) -> Result<Json<GetUserResponse>, RpcError> {
    authorize(&app, &ctx, "GetUser", &req.id)?;
    let resp = app
        .user_client
        .call(&ctx, "/api.v1.UserService/GetUser", &req)
        .await
        .map_err(|err| launder_downstream_error("GetUser", err))?;
    Ok(Json(resp))
}

pub async fn update_user(
    State(app): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UpdateUserResponse>, RpcError> {
    authorize(&app, &ctx, "UpdateUser", &req.id)?;
    let resp = app
        .user_client
        .call(&ctx, "/api.v1.UserService/UpdateUser", &req)
        .await
        .map_err(|err| launder_downstream_error("UpdateUser", err))?;
    Ok(Json(resp))
}

pub async fn delete_user(
    State(app): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<DeleteUserRequest>,
) -> Result<Json<DeleteUserResponse>, RpcError> {
    authorize(&app, &ctx, "DeleteUser", &req.id)?;
    let resp = app
        .user_client
        .call(&ctx, "/api.v1.UserService/DeleteUser", &req)
        .await
        .map_err(|err| launder_downstream_error("DeleteUser", err))?;
    Ok(Json(resp))
}

/// Internal-only procedure (used by the OAuth2 login provider); never
/// reachable through the public edge.
pub async fn verify_password() -> Result<Json<serde_json::Value>, RpcError> {
    Err(RpcError::new(
        RpcCode::PermissionDenied,
        "this endpoint is not available via the gateway",
    ))
}

fn authorize(
    app: &AppState,
    ctx: &RequestContext,
    method: &str,
    target_user_id: &str,
) -> Result<(), RpcError> {
    app.authorizer.can_access_user(ctx, target_user_id).map_err(|err| {
        tracing::warn!(
            method = %method,
            current_user_id = %ctx.subject,
            target_user_id = %target_user_id,
            reason = %err.message(),
            "authorization denied"
        );
        err
    })
}
