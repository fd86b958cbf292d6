//! Reporting handlers for consumption analytics and export

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::reporting::{ConsumptionQuery, ReportingService};
use crate::AppState;

/// Consumption report as JSON, or as CSV with `format=csv`
pub async fn get_consumption_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ConsumptionQuery>,
) -> AppResult<Response> {
    check_permission(&current_user.0, permissions::REPORTS_VIEW)?;
    let filter = query.to_filter()?;
    let service = ReportingService::new(state.db.clone(), state.store_policy());
    let report = service.consumption_report(&filter).await?;

    if query.wants_csv() {
        check_permission(&current_user.0, permissions::REPORTS_EXPORT)?;
        let csv = ReportingService::export_to_csv(&report, &state.config.reports.currency)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"consumo.csv\""),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(report).into_response())
    }
}
