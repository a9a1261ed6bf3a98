//! RPC-surface tests: JSON shapes and wire-code mapping, driven through
//! the full router against the in-memory store.
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use product::app::{AppState, build_router};
use product::idempotency::MemoryIdempotencyStore;
use product::store::{ProductStore, memory::MemoryStore};
use product::usecase::{ReservationUseCase, ReservationUseCaseConfig};

fn test_app() -> (axum::Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let reservations = Arc::new(ReservationUseCase::new(
        Arc::clone(&store) as Arc<dyn ProductStore>,
        Arc::new(MemoryIdempotencyStore::new()),
        ReservationUseCaseConfig {
            max_batch_size: 50,
            default_ttl: Duration::from_secs(900),
            idempotency_ttl: Duration::from_secs(3600),
        },
    ));
    let state = AppState {
        store: Arc::clone(&store) as Arc<dyn ProductStore>,
        reservations,
    };
    (build_router(state), store)
}

fn rpc(procedure: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(procedure)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn call(app: &axum::Router, procedure: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(rpc(procedure, body))
        .await
        .expect("response");
    let status = response.status();
    (status, read_json(response).await)
}

#[tokio::test]
async fn create_list_and_reserve_through_the_wire() {
    let (app, _store) = test_app();

    let (status, created) = call(
        &app,
        "/api.v1.ProductService/CreateProduct",
        json!({
            "name": "Widget",
            "description": "A widget",
            "skuCode": "W-1",
            "priceCents": 1999,
            "initialQuantity": 10
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sku_id = created["skuId"].as_str().unwrap().to_string();

    let (status, listed) = call(&app, "/api.v1.ProductService/ListProducts", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["products"].as_array().unwrap().len(), 1);
    assert_eq!(listed["products"][0]["name"], "Widget");

    let (status, inventory) = call(
        &app,
        "/api.v1.InventoryService/GetInventory",
        json!({ "skuId": sku_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inventory["quantity"], 10);
    assert_eq!(inventory["available"], 10);

    let (status, reservation) = call(
        &app,
        "/api.v1.InventoryService/BatchReserve",
        json!({
            "items": [ { "skuId": sku_id, "quantity": 4 } ],
            "idempotencyKey": "order-1"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reservation["status"], "PENDING");
    let reservation_id = reservation["reservationId"].as_str().unwrap().to_string();

    let (status, inventory) = call(
        &app,
        "/api.v1.InventoryService/GetInventory",
        json!({ "skuId": sku_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inventory["reserved"], 4);
    assert_eq!(inventory["available"], 6);

    let (status, _) = call(
        &app,
        "/api.v1.InventoryService/ConfirmReservation",
        json!({ "reservationId": reservation_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, fetched) = call(
        &app,
        "/api.v1.InventoryService/GetReservation",
        json!({ "reservationId": reservation_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "CONFIRMED");
}

#[tokio::test]
async fn insufficient_stock_is_resource_exhausted() {
    let (app, _store) = test_app();
    let (_, created) = call(
        &app,
        "/api.v1.ProductService/CreateProduct",
        json!({ "name": "Widget", "skuCode": "W-1", "priceCents": 100, "initialQuantity": 2 }),
    )
    .await;
    let sku_id = created["skuId"].as_str().unwrap();

    let (status, body) = call(
        &app,
        "/api.v1.InventoryService/BatchReserve",
        json!({ "items": [ { "skuId": sku_id, "quantity": 5 } ] }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "resource_exhausted");
    assert_eq!(body["message"], "insufficient stock available");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let (app, _store) = test_app();

    let (status, body) = call(
        &app,
        "/api.v1.InventoryService/GetInventory",
        json!({ "skuId": uuid::Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, body) = call(
        &app,
        "/api.v1.InventoryService/GetReservation",
        json!({ "reservationId": uuid::Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn empty_batch_is_invalid_argument() {
    let (app, _store) = test_app();
    let (status, body) = call(
        &app,
        "/api.v1.InventoryService/BatchReserve",
        json!({ "items": [] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn double_confirm_is_failed_precondition() {
    let (app, _store) = test_app();
    let (_, created) = call(
        &app,
        "/api.v1.ProductService/CreateProduct",
        json!({ "name": "Widget", "skuCode": "W-1", "priceCents": 100, "initialQuantity": 5 }),
    )
    .await;
    let sku_id = created["skuId"].as_str().unwrap();
    let (_, reservation) = call(
        &app,
        "/api.v1.InventoryService/BatchReserve",
        json!({ "items": [ { "skuId": sku_id, "quantity": 1 } ] }),
    )
    .await;
    let reservation_id = reservation["reservationId"].as_str().unwrap();

    let (status, _) = call(
        &app,
        "/api.v1.InventoryService/ConfirmReservation",
        json!({ "reservationId": reservation_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "/api.v1.InventoryService/ConfirmReservation",
        json!({ "reservationId": reservation_id }),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["code"], "failed_precondition");
}

#[tokio::test]
async fn duplicate_sku_code_is_already_exists() {
    let (app, _store) = test_app();
    let (status, _) = call(
        &app,
        "/api.v1.ProductService/CreateProduct",
        json!({ "name": "Widget", "skuCode": "W-1", "priceCents": 100 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(
        &app,
        "/api.v1.ProductService/CreateProduct",
        json!({ "name": "Widget Two", "skuCode": "W-1", "priceCents": 100 }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_exists");
}

#[tokio::test]
async fn set_quantity_respects_holds() {
    let (app, _store) = test_app();
    let (_, created) = call(
        &app,
        "/api.v1.ProductService/CreateProduct",
        json!({ "name": "Widget", "skuCode": "W-1", "priceCents": 100, "initialQuantity": 10 }),
    )
    .await;
    let sku_id = created["skuId"].as_str().unwrap();
    call(
        &app,
        "/api.v1.InventoryService/BatchReserve",
        json!({ "items": [ { "skuId": sku_id, "quantity": 6 } ] }),
    )
    .await;

    let (status, body) = call(
        &app,
        "/api.v1.InventoryService/SetQuantity",
        json!({ "skuId": sku_id, "quantity": 4 }),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "resource_exhausted");

    let (status, body) = call(
        &app,
        "/api.v1.InventoryService/SetQuantity",
        json!({ "skuId": sku_id, "quantity": 20 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 20);
    assert_eq!(body["available"], 14);
}
