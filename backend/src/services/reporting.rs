//! Reporting service for consumption analytics and CSV export

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::consumption::{build_report, ClientDirectory, ConsumptionFilter, Period};
use shared::{round2, Client, ClientStatus, ConsumptionReport, ProductCategory};

use super::inventory::{load_catalog, movements_from_rows, MovementRow, MOVEMENT_COLUMNS};
use super::retry::StorePolicy;
use crate::error::{AppError, AppResult};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
    policy: StorePolicy,
}

/// Query parameters of the consumption report
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionQuery {
    pub period: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub client_id: Option<Uuid>,
    pub category: Option<String>,
    pub include_inactive: Option<bool>,
    pub format: Option<String>,
}

impl ConsumptionQuery {
    pub fn to_filter(&self) -> AppResult<ConsumptionFilter> {
        let period_name = self.period.as_deref().unwrap_or("month");
        let period = Period::from_query(period_name, self.start, self.end).ok_or_else(|| AppError::Validation {
            field: "period".to_string(),
            message: format!("Unknown period {}", period_name),
            message_es: "Periodo no válido (week, month, quarter, year, custom, all)".to_string(),
        })?;
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(AppError::Validation {
                    field: "start".to_string(),
                    message: "Start date must not be after end date".to_string(),
                    message_es: "La fecha de inicio no puede ser posterior a la final".to_string(),
                });
            }
        }

        let category = self
            .category
            .as_deref()
            .map(str::parse::<ProductCategory>)
            .transpose()
            .map_err(|e| AppError::Validation {
                field: "category".to_string(),
                message: e.to_string(),
                message_es: format!("Categoría no válida: {}", e.value),
            })?;

        Ok(ConsumptionFilter {
            period,
            client_id: self.client_id,
            category,
            include_inactive: self.include_inactive.unwrap_or(false),
        })
    }

    pub fn wants_csv(&self) -> bool {
        self.format.as_deref() == Some("csv")
    }
}

/// Row for client query
#[derive(Debug, FromRow)]
struct ClientRow {
    id: Uuid,
    name: String,
    status: String,
    crop_type: Option<String>,
    hectares: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            name: row.name,
            status: row.status.parse().unwrap_or(ClientStatus::Activo),
            crop_type: row.crop_type,
            hectares: row.hectares,
            created_at: row.created_at,
        }
    }
}

/// Two-decimal text for CSV cells
fn fixed2(value: Decimal) -> String {
    let mut value = round2(value);
    value.rescale(2);
    value.to_string()
}

fn csv_error(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("CSV serialization error: {}", e))
}

impl ReportingService {
    pub fn new(db: PgPool, policy: StorePolicy) -> Self {
        Self { db, policy }
    }

    /// Build the consumption report for a filter at the current time
    pub async fn consumption_report(&self, filter: &ConsumptionFilter) -> AppResult<ConsumptionReport> {
        let now = Utc::now();
        let range = filter.period.bounds(now);
        let since = range.map(|r| r.start);
        let until = range.map_or(now, |r| r.end);
        let db = &self.db;

        let (rows, clients, catalog) = self
            .policy
            .read("consumption_report", || async move {
                let rows = sqlx::query_as::<_, MovementRow>(&format!(
                    r#"
                    SELECT {} FROM stock_movements
                    WHERE movement_type = 'exit'
                      AND ($1::timestamptz IS NULL OR created_at >= $1)
                      AND created_at <= $2
                    ORDER BY created_at
                    "#,
                    MOVEMENT_COLUMNS
                ))
                .bind(since)
                .bind(until)
                .fetch_all(db)
                .await?;

                let clients = sqlx::query_as::<_, ClientRow>(
                    "SELECT id, name, status, crop_type, hectares, created_at FROM clients",
                )
                .fetch_all(db)
                .await?;

                let mut conn = db.acquire().await?;
                let catalog = load_catalog(&mut conn, None, false).await?;
                Ok::<_, AppError>((rows, clients, catalog))
            })
            .await?;

        let movements = movements_from_rows(rows)?;
        let directory = ClientDirectory::new(clients.into_iter().map(Client::from));
        let report = build_report(&movements, &catalog, &directory, filter, now);

        tracing::debug!(
            movements = report.totals.movement_count,
            clients = report.by_client.len(),
            products = report.by_product.len(),
            "Consumption report built"
        );
        Ok(report)
    }

    /// Export the client and product tables of a report as CSV, separated by
    /// an empty line
    pub fn export_to_csv(report: &ConsumptionReport, currency: &str) -> AppResult<String> {
        let value_header = format!("Valor ({})", currency);

        let mut clients = csv::Writer::from_writer(vec![]);
        clients
            .write_record(["Cliente", "Cantidad total", value_header.as_str(), "Movimientos"])
            .map_err(csv_error)?;
        for row in &report.by_client {
            clients
                .write_record([
                    row.client_name.clone(),
                    fixed2(row.total_quantity),
                    fixed2(row.total_value),
                    row.movement_count.to_string(),
                ])
                .map_err(csv_error)?;
        }

        let mut products = csv::Writer::from_writer(vec![]);
        products
            .write_record(["Producto", "Categoría", "Cantidad", "Unidad", value_header.as_str(), "Clientes"])
            .map_err(csv_error)?;
        for row in &report.by_product {
            products
                .write_record([
                    row.product_name.clone(),
                    row.category.as_str().to_string(),
                    fixed2(row.total_quantity),
                    row.unit.clone(),
                    fixed2(row.total_value),
                    row.client_count.to_string(),
                ])
                .map_err(csv_error)?;
        }

        let mut sections = Vec::with_capacity(2);
        for writer in [clients, products] {
            let bytes = writer
                .into_inner()
                .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
            sections.push(
                String::from_utf8(bytes)
                    .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))?,
            );
        }
        Ok(sections.join("\n"))
    }
}
