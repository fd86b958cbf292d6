//! Route definitions for the agro-input inventory API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        .nest("/inventory", inventory_routes(state))
        .nest("/dosifications", dosification_routes(state))
        .nest("/protocols", protocol_routes(state))
        .nest("/orders", order_routes(state))
        .nest("/clients", client_routes(state))
        .nest("/reports", report_routes(state))
}

/// Inventory ledger routes (protected)
fn inventory_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/products", get(handlers::list_products))
        .route("/products/low-stock", get(handlers::list_low_stock))
        .route("/products/:id/available", get(handlers::get_available))
        .route("/products/:id/movements", get(handlers::get_product_movements))
        .route(
            "/movements",
            get(handlers::list_movements).post(handlers::record_movement),
        )
        .route("/adjustments", post(handlers::adjust_stock))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Dosification routes (protected)
fn dosification_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_dosifications).post(handlers::create_dosification),
        )
        .route("/reminders", get(handlers::get_dosification_alerts))
        .route("/:id", get(handlers::get_dosification))
        .route("/:id/validate", post(handlers::validate_dosification))
        .route("/:id/apply", post(handlers::apply_dosification))
        .route("/:id/complete", post(handlers::complete_dosification))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Protocol routes (protected)
fn protocol_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_protocols))
        .route(
            "/bindings",
            get(handlers::list_bindings).put(handlers::upsert_bindings),
        )
        .route("/:id", get(handlers::get_protocol))
        .route("/:id/load", post(handlers::load_protocol))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Order routes (protected)
fn order_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/:id", get(handlers::get_order))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Client-scoped routes (protected)
fn client_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/:id/dosifications",
            get(handlers::list_client_dosifications),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Reporting routes (protected)
fn report_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/consumption", get(handlers::get_consumption_report))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}
