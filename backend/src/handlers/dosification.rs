//! HTTP handlers for dosifications

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use shared::dosing::DosificationAlerts;
use shared::ledger::AvailabilityReport;
use crate::models::Dosification;

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::dosification::{ApplyOutcome, CreateDosificationInput, DosificationService};
use crate::AppState;

fn service(state: &AppState) -> DosificationService {
    DosificationService::new(state.db.clone(), state.store_policy())
}

/// List dosifications
pub async fn list_dosifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Dosification>>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).list().await?))
}

/// Overdue pending dosifications and upcoming reapplications
pub async fn get_dosification_alerts(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<DosificationAlerts>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).alerts().await?))
}

/// Get a dosification
pub async fn get_dosification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Dosification>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).get(id).await?))
}

/// Dosifications of one client
pub async fn list_client_dosifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<Vec<Dosification>>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).list_for_client(client_id).await?))
}

/// Create a pending dosification
pub async fn create_dosification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateDosificationInput>,
) -> AppResult<Json<Dosification>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_CREATE)?;
    let dosification = service(&state)
        .create(input, current_user.0.user_id)
        .await?;
    Ok(Json(dosification))
}

/// Check stock for a dosification without applying it
pub async fn validate_dosification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AvailabilityReport>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_VIEW)?;
    Ok(Json(service(&state).validate(id).await?))
}

/// Apply a dosification, consuming stock
pub async fn apply_dosification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApplyOutcome>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_EDIT)?;
    check_permission(&current_user.0, permissions::INVENTORY_MANAGE)?;
    let outcome = service(&state).apply(id, current_user.0.user_id).await?;
    Ok(Json(outcome))
}

/// Mark an applied dosification as completed
pub async fn complete_dosification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Dosification>> {
    check_permission(&current_user.0, permissions::DOSIFICATIONS_EDIT)?;
    Ok(Json(service(&state).complete(id).await?))
}
