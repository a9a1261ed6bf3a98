//! InventoryService handlers: stock reads, admin restock, and the
//! reservation lifecycle.
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mercata_rpc::RpcError;

use crate::app::AppState;
use crate::domain::Reservation;
use crate::usecase::{BatchReserveInput, ReserveItem};

use super::to_rpc_error;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInventoryRequest {
    pub sku_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub sku_id: Uuid,
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
    pub version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantityRequest {
    pub sku_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveItemDto {
    pub sku_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReserveRequest {
    pub items: Vec<ReserveItemDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Overrides the configured default TTL when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub reservation_id: Uuid,
    pub status: String,
    pub items: Vec<ReserveItemDto>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationActionRequest {
    pub reservation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReservationActionResponse {}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetReservationRequest {
    pub reservation_id: Uuid,
}

pub async fn get_inventory(
    State(app): State<AppState>,
    Json(req): Json<GetInventoryRequest>,
) -> Result<Json<InventoryResponse>, RpcError> {
    let inventory = app
        .reservations
        .get_inventory(req.sku_id)
        .await
        .map_err(to_rpc_error)?;
    Ok(Json(InventoryResponse {
        sku_id: inventory.sku_id,
        quantity: inventory.quantity,
        reserved: inventory.reserved,
        available: inventory.available(),
        version: inventory.version,
    }))
}

pub async fn set_quantity(
    State(app): State<AppState>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<InventoryResponse>, RpcError> {
    app.reservations
        .set_quantity(req.sku_id, req.quantity)
        .await
        .map_err(to_rpc_error)?;
    let inventory = app
        .reservations
        .get_inventory(req.sku_id)
        .await
        .map_err(to_rpc_error)?;
    Ok(Json(InventoryResponse {
        sku_id: inventory.sku_id,
        quantity: inventory.quantity,
        reserved: inventory.reserved,
        available: inventory.available(),
        version: inventory.version,
    }))
}

pub async fn batch_reserve(
    State(app): State<AppState>,
    Json(req): Json<BatchReserveRequest>,
) -> Result<Json<ReservationResponse>, RpcError> {
    let input = BatchReserveInput {
        items: req
            .items
            .iter()
            .map(|item| ReserveItem {
                sku_id: item.sku_id,
                quantity: item.quantity,
            })
            .collect(),
        idempotency_key: req.idempotency_key,
        ttl: req.ttl_seconds.map(Duration::from_secs),
    };
    let reservation = app
        .reservations
        .batch_reserve(input)
        .await
        .map_err(to_rpc_error)?;
    Ok(Json(reservation_response(reservation)))
}

pub async fn confirm_reservation(
    State(app): State<AppState>,
    Json(req): Json<ReservationActionRequest>,
) -> Result<Json<ReservationActionResponse>, RpcError> {
    app.reservations
        .confirm_reservation(req.reservation_id, req.idempotency_key.as_deref())
        .await
        .map_err(to_rpc_error)?;
    Ok(Json(ReservationActionResponse::default()))
}

pub async fn release_reservation(
    State(app): State<AppState>,
    Json(req): Json<ReservationActionRequest>,
) -> Result<Json<ReservationActionResponse>, RpcError> {
    app.reservations
        .release_reservation(req.reservation_id, req.idempotency_key.as_deref())
        .await
        .map_err(to_rpc_error)?;
    Ok(Json(ReservationActionResponse::default()))
}

pub async fn get_reservation(
    State(app): State<AppState>,
    Json(req): Json<GetReservationRequest>,
) -> Result<Json<ReservationResponse>, RpcError> {
    let reservation = app
        .reservations
        .get_reservation(req.reservation_id)
        .await
        .map_err(to_rpc_error)?;
    Ok(Json(reservation_response(reservation)))
}

fn reservation_response(reservation: Reservation) -> ReservationResponse {
    ReservationResponse {
        reservation_id: reservation.id,
        status: reservation.status.as_str().to_string(),
        items: reservation
            .items
            .iter()
            .map(|item| ReserveItemDto {
                sku_id: item.sku_id,
                quantity: item.quantity,
            })
            .collect(),
        expires_at: reservation.expires_at,
    }
}
