//! Dosification service: creation, availability checks and application

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::dosing::{dosification_alerts, plan_application, validate_availability, DosificationAlerts};
use shared::ledger::AvailabilityReport;
use shared::{
    is_known_crop, validate_hectares, validate_positive_quantity, Dosification, DosificationProduct,
    DosificationStatus, ProtocolSource, StockMovement, UnknownVariant,
};

use super::inventory::{load_catalog, write_movements};
use super::retry::StorePolicy;
use crate::error::{AppError, AppResult};

/// Dosification service
#[derive(Clone)]
pub struct DosificationService {
    db: PgPool,
    policy: StorePolicy,
}

/// Row for dosification query
#[derive(Debug, FromRow)]
struct DosificationRow {
    id: Uuid,
    client_id: Uuid,
    client_name: String,
    hectares: Decimal,
    crop_type: String,
    products: Json<Vec<DosificationProduct>>,
    notes: Option<String>,
    protocol_id: Option<Uuid>,
    stage_name: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    applied_at: Option<DateTime<Utc>>,
    next_application_date: Option<NaiveDate>,
}

impl TryFrom<DosificationRow> for Dosification {
    type Error = AppError;

    fn try_from(row: DosificationRow) -> Result<Self, Self::Error> {
        let status: DosificationStatus = row
            .status
            .parse()
            .map_err(|e: UnknownVariant| AppError::Internal(e.to_string()))?;
        let protocol = match (row.protocol_id, row.stage_name) {
            (Some(protocol_id), Some(stage_name)) => Some(ProtocolSource {
                protocol_id,
                stage_name,
            }),
            _ => None,
        };

        Ok(Dosification {
            id: row.id,
            client_id: row.client_id,
            client_name: row.client_name,
            hectares: row.hectares,
            crop_type: row.crop_type,
            products: row.products.0,
            notes: row.notes,
            protocol,
            status,
            created_at: row.created_at,
            applied_at: row.applied_at,
            next_application_date: row.next_application_date,
        })
    }
}

const DOSIFICATION_COLUMNS: &str = "id, client_id, client_name, hectares, crop_type, products, notes, \
     protocol_id, stage_name, status, created_at, applied_at, next_application_date";

/// Row for client lookup
#[derive(Debug, FromRow)]
struct ClientRow {
    name: String,
    crop_type: Option<String>,
}

/// Input for creating a dosification
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDosificationInput {
    pub client_id: Uuid,
    pub hectares: Decimal,
    #[validate(length(max = 100))]
    pub crop_type: Option<String>,
    #[validate(length(min = 1))]
    pub products: Vec<DosificationProduct>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub protocol: Option<ProtocolSource>,
    pub next_application_date: Option<NaiveDate>,
}

/// Result of applying a dosification
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub dosification: Dosification,
    pub movements: Vec<StockMovement>,
}

async fn lock_dosification(conn: &mut PgConnection, id: Uuid) -> AppResult<Dosification> {
    sqlx::query_as::<_, DosificationRow>(&format!(
        "SELECT {} FROM dosifications WHERE id = $1 FOR UPDATE",
        DOSIFICATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Dosification".to_string()))?
    .try_into()
}

fn product_ids(lines: &[DosificationProduct]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = lines.iter().filter_map(|l| l.product_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

impl DosificationService {
    pub fn new(db: PgPool, policy: StorePolicy) -> Self {
        Self { db, policy }
    }

    /// List dosifications, newest first
    pub async fn list(&self) -> AppResult<Vec<Dosification>> {
        let db = &self.db;
        let rows = self
            .policy
            .read("list_dosifications", || async move {
                let rows = sqlx::query_as::<_, DosificationRow>(&format!(
                    "SELECT {} FROM dosifications ORDER BY created_at DESC",
                    DOSIFICATION_COLUMNS
                ))
                .fetch_all(db)
                .await?;
                Ok::<_, AppError>(rows)
            })
            .await?;

        rows.into_iter().map(Dosification::try_from).collect()
    }

    /// Dosifications of one client, newest first
    pub async fn list_for_client(&self, client_id: Uuid) -> AppResult<Vec<Dosification>> {
        let db = &self.db;
        let rows = self
            .policy
            .read("client_dosifications", || async move {
                let rows = sqlx::query_as::<_, DosificationRow>(&format!(
                    "SELECT {} FROM dosifications WHERE client_id = $1 ORDER BY created_at DESC",
                    DOSIFICATION_COLUMNS
                ))
                .bind(client_id)
                .fetch_all(db)
                .await?;
                Ok::<_, AppError>(rows)
            })
            .await?;

        rows.into_iter().map(Dosification::try_from).collect()
    }

    /// Overdue pending dosifications and reapplication reminders
    pub async fn alerts(&self) -> AppResult<DosificationAlerts> {
        let db = &self.db;
        let rows = self
            .policy
            .read("dosification_alerts", || async move {
                let rows = sqlx::query_as::<_, DosificationRow>(&format!(
                    "SELECT {} FROM dosifications \
                     WHERE status = 'Pendiente' OR next_application_date IS NOT NULL \
                     ORDER BY created_at",
                    DOSIFICATION_COLUMNS
                ))
                .fetch_all(db)
                .await?;
                Ok::<_, AppError>(rows)
            })
            .await?;

        let dosifications = rows
            .into_iter()
            .map(Dosification::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(dosification_alerts(&dosifications, Utc::now()))
    }

    /// Get a dosification by id
    pub async fn get(&self, id: Uuid) -> AppResult<Dosification> {
        let db = &self.db;
        let row = self
            .policy
            .read("get_dosification", || async move {
                let row = sqlx::query_as::<_, DosificationRow>(&format!(
                    "SELECT {} FROM dosifications WHERE id = $1",
                    DOSIFICATION_COLUMNS
                ))
                .bind(id)
                .fetch_optional(db)
                .await?;
                Ok::<_, AppError>(row)
            })
            .await?
            .ok_or_else(|| AppError::NotFound("Dosification".to_string()))?;

        row.try_into()
    }

    /// Create a pending dosification for a registered client
    pub async fn create(&self, input: CreateDosificationInput, user_id: Uuid) -> AppResult<Dosification> {
        input.validate()?;
        validate_hectares(input.hectares).map_err(|msg| AppError::Validation {
            field: "hectares".to_string(),
            message: msg.to_string(),
            message_es: "Las hectáreas deben ser mayores a 0 y no superar el máximo".to_string(),
        })?;
        for line in &input.products {
            validate_positive_quantity(line.quantity).map_err(|msg| AppError::Validation {
                field: "products".to_string(),
                message: format!("{}: {}", line.product_name, msg),
                message_es: format!("{}: la cantidad debe ser mayor a 0", line.product_name),
            })?;
        }
        if let Some(crop) = input.crop_type.as_deref().filter(|c| !is_known_crop(c)) {
            return Err(AppError::Validation {
                field: "cropType".to_string(),
                message: format!("Unknown crop type {}", crop),
                message_es: format!("Cultivo desconocido: {}", crop),
            });
        }

        let db = &self.db;
        let client_id = input.client_id;
        let client = self
            .policy
            .read("get_client", || async move {
                let row = sqlx::query_as::<_, ClientRow>("SELECT name, crop_type FROM clients WHERE id = $1")
                    .bind(client_id)
                    .fetch_optional(db)
                    .await?;
                Ok::<_, AppError>(row)
            })
            .await?
            .ok_or_else(|| AppError::NotFound("Client".to_string()))?;

        let dosification = Dosification {
            id: Uuid::new_v4(),
            client_id: input.client_id,
            client_name: client.name,
            hectares: input.hectares,
            crop_type: input
                .crop_type
                .or(client.crop_type)
                .unwrap_or_else(|| "Otro".to_string()),
            products: input.products,
            notes: input.notes,
            protocol: input.protocol,
            status: DosificationStatus::Pendiente,
            created_at: Utc::now(),
            applied_at: None,
            next_application_date: input.next_application_date,
        };

        self.policy
            .write("create_dosification", async {
                sqlx::query(
                    r#"
                    INSERT INTO dosifications (
                        id, client_id, client_name, hectares, crop_type, products, notes,
                        protocol_id, stage_name, status, created_at, next_application_date, created_by
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    "#,
                )
                .bind(dosification.id)
                .bind(dosification.client_id)
                .bind(&dosification.client_name)
                .bind(dosification.hectares)
                .bind(&dosification.crop_type)
                .bind(Json(&dosification.products))
                .bind(&dosification.notes)
                .bind(dosification.protocol.as_ref().map(|p| p.protocol_id))
                .bind(dosification.protocol.as_ref().map(|p| p.stage_name.clone()))
                .bind(dosification.status.as_str())
                .bind(dosification.created_at)
                .bind(dosification.next_application_date)
                .bind(user_id)
                .execute(&self.db)
                .await?;
                Ok::<_, AppError>(())
            })
            .await?;

        tracing::info!(
            dosification_id = %dosification.id,
            client_id = %dosification.client_id,
            lines = dosification.products.len(),
            "Dosification created"
        );
        Ok(dosification)
    }

    /// Check every line against current stock without writing
    pub async fn validate(&self, id: Uuid) -> AppResult<AvailabilityReport> {
        let dosification = self.get(id).await?;
        let db = &self.db;
        let ids = product_ids(&dosification.products);
        let catalog = self
            .policy
            .read("validate_dosification", || {
                let ids = ids.clone();
                async move {
                    let mut conn = db.acquire().await?;
                    load_catalog(&mut conn, Some(ids), false).await
                }
            })
            .await?;

        Ok(validate_availability(&dosification.products, &catalog))
    }

    /// Consume stock for every line and mark the dosification as applied.
    ///
    /// The dosification row and the product rows stay locked until the
    /// exits and the status change commit together.
    pub async fn apply(&self, id: Uuid, user_id: Uuid) -> AppResult<ApplyOutcome> {
        self.policy
            .write("apply_dosification", async {
                let mut tx = self.db.begin().await?;
                let mut dosification = lock_dosification(&mut tx, id).await?;
                let mut catalog = load_catalog(&mut tx, Some(product_ids(&dosification.products)), true).await?;

                let drafts = plan_application(&dosification, &catalog, Some(user_id))?;
                let now = Utc::now();
                dosification.mark_applied(now)?;
                let movements = write_movements(&mut tx, &mut catalog, drafts, now).await?;

                sqlx::query("UPDATE dosifications SET status = $2, applied_at = $3 WHERE id = $1")
                    .bind(dosification.id)
                    .bind(dosification.status.as_str())
                    .bind(dosification.applied_at)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;

                tracing::info!(
                    dosification_id = %dosification.id,
                    client_id = %dosification.client_id,
                    movements = movements.len(),
                    "Dosification applied"
                );
                Ok::<_, AppError>(ApplyOutcome {
                    dosification,
                    movements,
                })
            })
            .await
    }

    /// Move an applied dosification to `Completada`
    pub async fn complete(&self, id: Uuid) -> AppResult<Dosification> {
        self.policy
            .write("complete_dosification", async {
                let mut tx = self.db.begin().await?;
                let mut dosification = lock_dosification(&mut tx, id).await?;
                dosification.mark_completed()?;

                sqlx::query("UPDATE dosifications SET status = $2 WHERE id = $1")
                    .bind(dosification.id)
                    .bind(dosification.status.as_str())
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;

                tracing::info!(dosification_id = %dosification.id, "Dosification completed");
                Ok::<_, AppError>(dosification)
            })
            .await
    }
}
