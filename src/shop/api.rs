//! Catalog and Order API Endpoints

use crate::auth::models::SessionClaims;
use crate::models::{ApiError, SuccessResponse};
use crate::shop::{
    models::{Order, OrderStatus, PlaceOrderInput, Product, ProductInput, UpdateOrderStatusInput},
    store::{OrderError, ShopStore},
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct ShopState {
    pub store: Arc<ShopStore>,
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {} ID", what)))
}

/// The authenticated user's id, taken from the credential subject.
fn caller_id(claims: &SessionClaims) -> Result<Uuid, ApiError> {
    parse_id(&claims.subject, "user")
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::UnknownProduct(id) => {
                ApiError::invalid("items", &format!("Product {} does not exist", id))
            }
            OrderError::NotFound => ApiError::NotFound("Order not found".to_string()),
            e @ OrderError::NotCancelable(_) => ApiError::BadRequest(capitalize(&e.to_string())),
            OrderError::Storage(e) => ApiError::internal("Order storage failure", e),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---- products ----

/// POST /api/v1/products (admin)
pub async fn create_product(
    State(state): State<ShopState>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<SuccessResponse<Product>>, ApiError> {
    let Json(payload) = payload?;
    let input = payload.validate().map_err(ApiError::Validation)?;

    let product = state
        .store
        .create_product(input)
        .map_err(|e| ApiError::internal("Failed to create product", e))?;

    Ok(SuccessResponse::with_data("Product created successfully", product))
}

/// GET /api/v1/products
pub async fn list_products(
    State(state): State<ShopState>,
) -> Result<Json<SuccessResponse<Vec<Product>>>, ApiError> {
    let products = state
        .store
        .list_products()
        .map_err(|e| ApiError::internal("Failed to fetch products", e))?;

    Ok(SuccessResponse::with_data("Products retrieved successfully", products))
}

/// GET /api/v1/products/:id
pub async fn get_product(
    State(state): State<ShopState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<Product>>, ApiError> {
    let id = parse_id(&id, "product")?;

    let product = state
        .store
        .get_product(&id)
        .map_err(|e| ApiError::internal("Failed to fetch product", e))?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    Ok(SuccessResponse::with_data("Product retrieved successfully", product))
}

/// PUT /api/v1/products/:id (admin)
pub async fn update_product(
    State(state): State<ShopState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<SuccessResponse<Product>>, ApiError> {
    let id = parse_id(&id, "product")?;

    // A missing product is a 404 whatever the body holds.
    let existing = state
        .store
        .get_product(&id)
        .map_err(|e| ApiError::internal("Failed to load product", e))?;
    if existing.is_none() {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }

    let Json(payload) = payload?;
    let input = payload.validate().map_err(ApiError::Validation)?;

    let product = state
        .store
        .update_product(&id, input)
        .map_err(|e| ApiError::internal("Failed to update product", e))?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    Ok(SuccessResponse::with_data("Product updated successfully", product))
}

/// DELETE /api/v1/products/:id (admin)
pub async fn delete_product(
    State(state): State<ShopState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<()>>, ApiError> {
    let id = parse_id(&id, "product")?;

    let deleted = state
        .store
        .delete_product(&id)
        .map_err(|e| ApiError::internal("Failed to delete product", e))?;
    if !deleted {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }

    Ok(SuccessResponse::message("Product deleted successfully"))
}

// ---- orders ----

/// POST /api/v1/orders
pub async fn place_order(
    State(state): State<ShopState>,
    claims: SessionClaims,
    payload: Result<Json<PlaceOrderInput>, JsonRejection>,
) -> Result<Json<SuccessResponse<Order>>, ApiError> {
    let user_id = caller_id(&claims)?;
    let Json(payload) = payload?;
    let lines = payload.validate().map_err(ApiError::Validation)?;

    let order = state.store.place_order(&user_id, &lines)?;

    Ok(SuccessResponse::with_data("Order placed successfully", order))
}

/// GET /api/v1/orders
pub async fn list_orders(
    State(state): State<ShopState>,
    claims: SessionClaims,
) -> Result<Json<SuccessResponse<Vec<Order>>>, ApiError> {
    let user_id = caller_id(&claims)?;
    let orders = state.store.list_orders_for_user(&user_id)?;

    Ok(SuccessResponse::with_data("Orders retrieved successfully", orders))
}

/// PUT /api/v1/orders/:id/cancel
pub async fn cancel_order(
    State(state): State<ShopState>,
    claims: SessionClaims,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<()>>, ApiError> {
    let user_id = caller_id(&claims)?;
    let order_id = parse_id(&id, "order")?;

    if let Err(e) = state.store.cancel_order(&order_id, &user_id) {
        warn!("❌ Cancel of order {} by {} refused: {}", order_id, user_id, e);
        return Err(e.into());
    }

    Ok(SuccessResponse::message("Order canceled successfully"))
}

/// PUT /api/v1/orders/:id/status (admin)
pub async fn update_order_status(
    State(state): State<ShopState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateOrderStatusInput>, JsonRejection>,
) -> Result<Json<SuccessResponse<Order>>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let Json(payload) = payload?;

    let status: OrderStatus = payload.status.trim().parse().map_err(|_| {
        ApiError::invalid("status", "Status must be one of: Pending, Completed, Canceled")
    })?;

    let order = state.store.update_order_status(&order_id, status)?;

    Ok(SuccessResponse::with_data("Order status updated successfully", order))
}
