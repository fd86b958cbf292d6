//! Dosification protocols and the protocol-to-inventory binding table

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use shared::dosing::{load_from_protocol, ProtocolBindings};
use shared::validation::validate_hectares;
use shared::{DomainError, DosificationProduct, DosificationProtocol, ProductBinding, ProtocolStage};

use super::inventory::load_catalog;
use super::retry::StorePolicy;
use crate::error::{AppError, AppResult};

/// Protocol service
#[derive(Clone)]
pub struct ProtocolService {
    db: PgPool,
    policy: StorePolicy,
}

/// Row for protocol query
#[derive(Debug, FromRow)]
struct ProtocolRow {
    id: Uuid,
    name: String,
    crop: Option<String>,
    stages: Json<Vec<ProtocolStage>>,
    created_at: DateTime<Utc>,
}

impl From<ProtocolRow> for DosificationProtocol {
    fn from(row: ProtocolRow) -> Self {
        DosificationProtocol {
            id: row.id,
            name: row.name,
            crop: row.crop,
            stages: row.stages.0,
            created_at: row.created_at,
        }
    }
}

/// Row for binding query
#[derive(Debug, FromRow)]
struct BindingRow {
    key: String,
    product_id: Uuid,
    presentation_id: Option<Uuid>,
}

impl From<BindingRow> for ProductBinding {
    fn from(row: BindingRow) -> Self {
        ProductBinding {
            key: row.key,
            product_id: row.product_id,
            presentation_id: row.presentation_id,
        }
    }
}

/// Input for scaling a protocol stage to a field
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadProtocolInput {
    pub stage: String,
    pub hectares: Decimal,
}

impl ProtocolService {
    pub fn new(db: PgPool, policy: StorePolicy) -> Self {
        Self { db, policy }
    }

    /// List protocols by name
    pub async fn list(&self) -> AppResult<Vec<DosificationProtocol>> {
        let db = &self.db;
        let rows = self
            .policy
            .read("list_protocols", || async move {
                let rows = sqlx::query_as::<_, ProtocolRow>(
                    "SELECT id, name, crop, stages, created_at FROM dosification_protocols ORDER BY name",
                )
                .fetch_all(db)
                .await?;
                Ok::<_, AppError>(rows)
            })
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Get a protocol by id
    pub async fn get(&self, id: Uuid) -> AppResult<DosificationProtocol> {
        let db = &self.db;
        let row = self
            .policy
            .read("get_protocol", || async move {
                let row = sqlx::query_as::<_, ProtocolRow>(
                    "SELECT id, name, crop, stages, created_at FROM dosification_protocols WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(db)
                .await?;
                Ok::<_, AppError>(row)
            })
            .await?
            .ok_or_else(|| AppError::NotFound("Protocol".to_string()))?;

        Ok(row.into())
    }

    /// Current binding table
    pub async fn list_bindings(&self) -> AppResult<Vec<ProductBinding>> {
        let db = &self.db;
        let rows = self
            .policy
            .read("list_bindings", || async move {
                let rows = sqlx::query_as::<_, BindingRow>(
                    "SELECT key, product_id, presentation_id FROM protocol_product_bindings ORDER BY key",
                )
                .fetch_all(db)
                .await?;
                Ok::<_, AppError>(rows)
            })
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Replace bindings by key
    pub async fn upsert_bindings(&self, bindings: Vec<ProductBinding>) -> AppResult<Vec<ProductBinding>> {
        self.policy
            .write("upsert_bindings", async {
                let mut tx = self.db.begin().await?;
                for binding in &bindings {
                    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                        .bind(binding.product_id)
                        .fetch_one(&mut *tx)
                        .await?;
                    if !exists {
                        return Err(AppError::NotFound(format!("Product {}", binding.product_id)));
                    }

                    sqlx::query(
                        r#"
                        INSERT INTO protocol_product_bindings (key, product_id, presentation_id, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (key) DO UPDATE
                        SET product_id = EXCLUDED.product_id,
                            presentation_id = EXCLUDED.presentation_id,
                            updated_at = NOW()
                        "#,
                    )
                    .bind(&binding.key)
                    .bind(binding.product_id)
                    .bind(binding.presentation_id)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                Ok::<_, AppError>(())
            })
            .await?;

        tracing::info!(count = bindings.len(), "Protocol bindings updated");
        Ok(bindings)
    }

    /// Scale a protocol stage to `hectares` and bind its products to
    /// inventory. Bindings found by name or code matching are stored.
    pub async fn load(&self, protocol_id: Uuid, input: LoadProtocolInput) -> AppResult<Vec<DosificationProduct>> {
        validate_hectares(input.hectares).map_err(|_| DomainError::InvalidHectares(input.hectares))?;

        let protocol = self.get(protocol_id).await?;
        let mut bindings = ProtocolBindings::new(self.list_bindings().await?);
        let db = &self.db;
        let catalog = self
            .policy
            .read("load_catalog", || async move {
                let mut conn = db.acquire().await?;
                load_catalog(&mut conn, None, false).await
            })
            .await?;

        let lines = load_from_protocol(&protocol, &input.stage, input.hectares, &catalog, &mut bindings)?;

        let learned = bindings.take_learned();
        if !learned.is_empty() {
            self.policy
                .write("store_learned_bindings", async {
                    for binding in &learned {
                        sqlx::query(
                            r#"
                            INSERT INTO protocol_product_bindings (key, product_id, presentation_id)
                            VALUES ($1, $2, $3)
                            ON CONFLICT (key) DO NOTHING
                            "#,
                        )
                        .bind(&binding.key)
                        .bind(binding.product_id)
                        .bind(binding.presentation_id)
                        .execute(&self.db)
                        .await?;
                    }
                    Ok::<_, AppError>(())
                })
                .await?;
            tracing::debug!(count = learned.len(), "Stored learned protocol bindings");
        }

        tracing::info!(
            protocol_id = %protocol_id,
            stage = %input.stage,
            hectares = %input.hectares,
            unbound = lines.iter().filter(|l| l.product_id.is_none()).count(),
            "Protocol stage loaded"
        );
        Ok(lines)
    }
}
