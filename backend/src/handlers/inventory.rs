//! HTTP handlers for the inventory ledger

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Availability, NewStockMovement, Product, StockMovement};
use shared::{Pagination, PaginatedResponse};

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::inventory::{AdjustStockInput, InventoryService};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableQuery {
    pub presentation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

fn service(state: &AppState) -> InventoryService {
    InventoryService::new(state.db.clone(), state.store_policy())
}

/// List products with presentations and stock
pub async fn list_products(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Product>>> {
    check_permission(&current_user.0, permissions::INVENTORY_VIEW)?;
    let products = service(&state).list_products().await?;
    Ok(Json(products))
}

/// Products at or below their minimum stock
pub async fn list_low_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Product>>> {
    check_permission(&current_user.0, permissions::INVENTORY_VIEW)?;
    let products = service(&state).low_stock_products().await?;
    Ok(Json(products))
}

/// Available quantity of a product or presentation
pub async fn get_available(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Query(query): Query<AvailableQuery>,
) -> AppResult<Json<Availability>> {
    check_permission(&current_user.0, permissions::INVENTORY_VIEW)?;
    let availability = service(&state)
        .get_available(product_id, query.presentation_id)
        .await?;
    Ok(Json(availability))
}

/// Movement log, newest first
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<MovementsQuery>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    check_permission(&current_user.0, permissions::INVENTORY_VIEW)?;
    let defaults = Pagination::default();
    let pagination = Pagination {
        page: query.page.unwrap_or(defaults.page),
        per_page: query.per_page.unwrap_or(defaults.per_page),
    };
    let movements = service(&state).list_movements(&pagination).await?;
    Ok(Json(movements))
}

/// Movement log of one product
pub async fn get_product_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockMovement>>> {
    check_permission(&current_user.0, permissions::INVENTORY_VIEW)?;
    let movements = service(&state).product_movements(product_id).await?;
    Ok(Json(movements))
}

/// Record a movement draft built by the client
pub async fn record_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(draft): Json<NewStockMovement>,
) -> AppResult<Json<StockMovement>> {
    check_permission(&current_user.0, permissions::INVENTORY_MANAGE)?;
    let movement = service(&state)
        .record_movement(draft, current_user.0.user_id)
        .await?;
    Ok(Json(movement))
}

/// Manual entry, exit or adjustment
pub async fn adjust_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AdjustStockInput>,
) -> AppResult<Json<StockMovement>> {
    check_permission(&current_user.0, permissions::INVENTORY_MANAGE)?;
    let movement = service(&state)
        .adjust_stock(input, current_user.0.user_id)
        .await?;
    Ok(Json(movement))
}
