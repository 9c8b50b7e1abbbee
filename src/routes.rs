//! HTTP route table.
//!
//! Every request passes admission control first; protected routes then need a
//! valid session credential, and admin routes additionally the `admin` role.

use crate::auth::{self, api as auth_api, CredentialValidator, Role};
use crate::middleware::{rate_limit_middleware, request_logging, AdmissionController};
use crate::shop::{api as shop_api, ShopState};
use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Everything the router needs, built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub auth: auth::AuthState,
    pub shop: ShopState,
    pub validator: Arc<CredentialValidator>,
    pub limiter: AdmissionController,
}

pub fn build_router(services: AppServices) -> Router {
    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/v1/users/register", post(auth_api::register))
        .route("/api/v1/users/login", post(auth_api::login))
        .with_state(services.auth);

    let admin_routes = Router::new()
        .route("/api/v1/products", post(shop_api::create_product))
        .route(
            "/api/v1/products/:id",
            put(shop_api::update_product).delete(shop_api::delete_product),
        )
        .route(
            "/api/v1/orders/:id/status",
            put(shop_api::update_order_status),
        )
        .route_layer(middleware::from_fn_with_state(
            Role::Admin,
            auth::require_role,
        ))
        .with_state(services.shop.clone());

    let protected_routes = Router::new()
        .route("/api/v1/users/me", get(auth_api::me))
        .route("/api/v1/products", get(shop_api::list_products))
        .route("/api/v1/products/:id", get(shop_api::get_product))
        .route(
            "/api/v1/orders",
            post(shop_api::place_order).get(shop_api::list_orders),
        )
        .route("/api/v1/orders/:id/cancel", put(shop_api::cancel_order))
        .with_state(services.shop)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            services.validator,
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            services.limiter,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(request_logging))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the storefront API" }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
