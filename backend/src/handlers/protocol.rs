//! HTTP handlers for dosification protocols

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::models::{DosificationProduct, DosificationProtocol, ProductBinding};

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::protocol::{LoadProtocolInput, ProtocolService};
use crate::AppState;

fn service(state: &AppState) -> ProtocolService {
    ProtocolService::new(state.db.clone(), state.store_policy())
}

pub async fn list_protocols(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<DosificationProtocol>>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).list().await?))
}

pub async fn get_protocol(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DosificationProtocol>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).get(id).await?))
}

/// Scale a protocol stage to a field size
pub async fn load_protocol(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<LoadProtocolInput>,
) -> AppResult<Json<Vec<DosificationProduct>>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_CREATE)?;
    Ok(Json(service(&state).load(id, input).await?))
}

pub async fn list_bindings(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<ProductBinding>>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).list_bindings().await?))
}

pub async fn upsert_bindings(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(bindings): Json<Vec<ProductBinding>>,
) -> AppResult<Json<Vec<ProductBinding>>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_EDIT)?;
    Ok(Json(service(&state).upsert_bindings(bindings).await?))
}
