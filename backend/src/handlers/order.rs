//! HTTP handlers for orders

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::models::Order;

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::order::{CreateOrderInput, OrderOutcome, OrderService};
use crate::AppState;

fn service(state: &AppState) -> OrderService {
    OrderService::new(state.db.clone(), state.store_policy())
}

pub async fn list_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Order>>> {
    check_permission(&current_user.0, permissions::INVENTORY_VIEW)?;
    Ok(Json(service(&state).list().await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    check_permission(&current_user.0, permissions::INVENTORY_VIEW)?;
    Ok(Json(service(&state).get(id).await?))
}

/// Create an order and take its items out of stock
pub async fn create_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<Json<OrderOutcome>> {
    check_permission(&current_user.0, permissions::INVENTORY_MANAGE)?;
    let outcome = service(&state)
        .create(input, current_user.0.user_id)
        .await?;
    Ok(Json(outcome))
}
