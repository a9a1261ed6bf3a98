//! Product service application wiring.
//!
//! Builds the axum router and the shared state. The server-side context
//! propagation middleware runs on every RPC route so handlers can observe
//! the identity the edge forwarded; this service trusts those headers only
//! because it is reachable solely through the sanitizing gateway.
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, extract::State, middleware};
use tower_http::trace::TraceLayer;

use mercata_rpc::{RpcCode, RpcError, server_context_middleware};

use crate::api::{inventory, product};
use crate::store::ProductStore;
use crate::usecase::ReservationUseCase;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProductStore>,
    pub reservations: Arc<ReservationUseCase>,
}

pub fn build_router(state: AppState) -> Router {
    let rpc = Router::new()
        .route(
            "/api.v1.ProductService/ListProducts",
            post(product::list_products),
        )
        .route(
            "/api.v1.ProductService/GetProduct",
            post(product::get_product),
        )
        .route(
            "/api.v1.ProductService/CreateProduct",
            post(product::create_product),
        )
        .route(
            "/api.v1.InventoryService/GetInventory",
            post(inventory::get_inventory),
        )
        .route(
            "/api.v1.InventoryService/SetQuantity",
            post(inventory::set_quantity),
        )
        .route(
            "/api.v1.InventoryService/BatchReserve",
            post(inventory::batch_reserve),
        )
        .route(
            "/api.v1.InventoryService/ConfirmReservation",
            post(inventory::confirm_reservation),
        )
        .route(
            "/api.v1.InventoryService/ReleaseReservation",
            post(inventory::release_reservation),
        )
        .route(
            "/api.v1.InventoryService/GetReservation",
            post(inventory::get_reservation),
        )
        .layer(middleware::from_fn(server_context_middleware));

    Router::new()
        .merge(rpc)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readyz(State(state): State<AppState>) -> Result<impl IntoResponse, RpcError> {
    if state.store.health_check().await.is_err() {
        return Err(RpcError::new(RpcCode::Unavailable, "storage unavailable"));
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
