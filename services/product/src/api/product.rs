//! ProductService handlers: catalog reads and product creation.
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mercata_rpc::RpcError;

use crate::app::AppState;
use crate::domain::{Inventory, Product, Sku};

use super::to_rpc_error;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsRequest {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsResponse {
    pub products: Vec<ProductDto>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProductRequest {
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProductResponse {
    pub product: ProductDto,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sku_code: String,
    pub price_cents: i64,
    #[serde(default)]
    pub initial_quantity: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductResponse {
    pub product: ProductDto,
    pub sku_id: Uuid,
}

pub async fn list_products(
    State(app): State<AppState>,
    Json(req): Json<ListProductsRequest>,
) -> Result<Json<ListProductsResponse>, RpcError> {
    let limit = req
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = req.offset.unwrap_or(0).max(0);
    let products = app
        .store
        .list_products(limit, offset)
        .await
        .map_err(to_rpc_error)?;
    Ok(Json(ListProductsResponse {
        products: products.into_iter().map(product_dto).collect(),
    }))
}

pub async fn get_product(
    State(app): State<AppState>,
    Json(req): Json<GetProductRequest>,
) -> Result<Json<GetProductResponse>, RpcError> {
    let product = app.store.get_product(req.id).await.map_err(to_rpc_error)?;
    Ok(Json(GetProductResponse {
        product: product_dto(product),
    }))
}

/// Creates the product, its first SKU, and that SKU's inventory row in one
/// call so a new catalog entry is immediately reservable.
pub async fn create_product(
    State(app): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<Json<CreateProductResponse>, RpcError> {
    let product = Product::new(req.name, req.description).map_err(to_rpc_error)?;
    let sku = Sku::new(product.id, req.sku_code, req.price_cents).map_err(to_rpc_error)?;
    let inventory = Inventory::new(sku.id, req.initial_quantity).map_err(to_rpc_error)?;

    app.store.create_product(&product).await.map_err(to_rpc_error)?;
    app.store.create_sku(&sku).await.map_err(to_rpc_error)?;
    app.store
        .create_inventory(&inventory)
        .await
        .map_err(to_rpc_error)?;

    Ok(Json(CreateProductResponse {
        sku_id: sku.id,
        product: product_dto(product),
    }))
}

fn product_dto(product: Product) -> ProductDto {
    ProductDto {
        id: product.id,
        name: product.name,
        description: product.description,
    }
}
