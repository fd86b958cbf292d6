//! Inventory ledger service: per-presentation stock and the movement log
//!
//! Every stock change runs in one transaction. The product rows are locked
//! `FOR UPDATE` (in id order), the shared ledger checks are applied to the
//! locked snapshot, then presentation stock, the derived product stock and
//! the movement row are written together.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use shared::ledger::{self, apply_movement, draft_movement};
use shared::{
    Availability, DomainError, MovementType, NewStockMovement, Pagination, PaginatedResponse, PaginationMeta,
    Presentation, Product, ProductCategory, RelatedTo, RelatedType, StockLevel, StockMovement, UnknownVariant,
};
use shared::validation::validate_positive_quantity;

use super::retry::StorePolicy;
use crate::error::{AppError, AppResult};

/// Inventory service for products, stock and movements
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
    policy: StorePolicy,
}

/// Row for product query
#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    code: Option<String>,
    category: String,
    unit: String,
    cost_per_unit: Option<Decimal>,
    supplier: Option<String>,
    created_at: DateTime<Utc>,
    last_restock_date: Option<DateTime<Utc>>,
}

/// Row for presentation query
#[derive(Debug, FromRow)]
struct PresentationRow {
    id: Uuid,
    product_id: Uuid,
    label: String,
    unit: String,
    pvp: Decimal,
    current_stock: Decimal,
    min_stock: Decimal,
    max_stock: Option<Decimal>,
    sku: Option<String>,
    is_default: bool,
}

impl From<PresentationRow> for Presentation {
    fn from(row: PresentationRow) -> Self {
        Presentation {
            id: row.id,
            label: row.label,
            unit: row.unit,
            pvp: row.pvp,
            stock: StockLevel::new(row.current_stock, row.min_stock, row.max_stock),
            sku: row.sku,
            is_default: row.is_default,
        }
    }
}

/// Row for movement query
#[derive(Debug, FromRow)]
pub(crate) struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    presentation_id: Option<Uuid>,
    presentation_label: Option<String>,
    movement_type: String,
    quantity: Decimal,
    previous_stock: Decimal,
    new_stock: Decimal,
    reason: String,
    related_type: Option<String>,
    related_id: Option<Uuid>,
    related_reference: Option<String>,
    client_id: Option<Uuid>,
    client_name: Option<String>,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type: MovementType = row
            .movement_type
            .parse()
            .map_err(|e: UnknownVariant| AppError::Internal(e.to_string()))?;
        let related_to = row
            .related_type
            .as_deref()
            .and_then(|kind| kind.parse::<RelatedType>().ok())
            .map(|kind| RelatedTo {
                kind,
                id: row.related_id,
                reference: row.related_reference,
            });

        Ok(StockMovement {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            presentation_id: row.presentation_id,
            presentation_label: row.presentation_label,
            movement_type,
            quantity: row.quantity,
            previous_stock: row.previous_stock,
            new_stock: row.new_stock,
            reason: row.reason,
            related_to,
            client_id: row.client_id,
            client_name: row.client_name,
            timestamp: row.created_at,
            created_by: row.created_by,
        })
    }
}

pub(crate) const MOVEMENT_COLUMNS: &str = "id, product_id, product_name, presentation_id, presentation_label, \
     movement_type, quantity, previous_stock, new_stock, reason, related_type, related_id, \
     related_reference, client_id, client_name, created_at, created_by";

pub(crate) fn movements_from_rows(rows: Vec<MovementRow>) -> AppResult<Vec<StockMovement>> {
    rows.into_iter().map(StockMovement::try_from).collect()
}

/// Input for a manual stock change
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockInput {
    pub product_id: Uuid,
    pub presentation_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Positive for entries and exits, signed for adjustments
    #[validate(custom = "validate_nonzero")]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(max = 200))]
    pub reference: Option<String>,
}

fn validate_nonzero(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_zero() {
        return Err(ValidationError::new("amount_zero"));
    }
    Ok(())
}

impl AdjustStockInput {
    /// Entries and exits take a positive amount; only adjustments are signed
    fn check_amount(&self) -> AppResult<()> {
        if self.movement_type == MovementType::Adjustment {
            return Ok(());
        }
        validate_positive_quantity(self.amount).map_err(|msg| AppError::Validation {
            field: "amount".to_string(),
            message: msg.to_string(),
            message_es: "La cantidad debe ser mayor a 0".to_string(),
        })
    }
}

/// Load products with their presentations, optionally locking the product
/// rows for the rest of the transaction
pub(crate) async fn load_catalog(
    conn: &mut PgConnection,
    ids: Option<Vec<Uuid>>,
    lock: bool,
) -> AppResult<HashMap<Uuid, Product>> {
    let mut sql = String::from(
        r#"
        SELECT id, name, code, category, unit, cost_per_unit, supplier, created_at, last_restock_date
        FROM products
        WHERE ($1::uuid[] IS NULL OR id = ANY($1))
        ORDER BY id
        "#,
    );
    if lock {
        sql.push_str(" FOR UPDATE");
    }

    let products = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    let product_ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let presentations = sqlx::query_as::<_, PresentationRow>(
        r#"
        SELECT id, product_id, label, unit, pvp, current_stock, min_stock, max_stock, sku, is_default
        FROM product_presentations
        WHERE product_id = ANY($1)
        ORDER BY product_id, position, label
        "#,
    )
    .bind(&product_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_product: HashMap<Uuid, Vec<Presentation>> = HashMap::new();
    for row in presentations {
        by_product.entry(row.product_id).or_default().push(row.into());
    }

    Ok(products
        .into_iter()
        .map(|row| {
            let product = Product {
                id: row.id,
                name: row.name,
                code: row.code,
                // Labels outside the known set are shown as "Otro"
                category: row.category.parse().unwrap_or(ProductCategory::Other),
                unit: row.unit,
                cost_per_unit: row.cost_per_unit,
                supplier: row.supplier,
                presentations: by_product.remove(&row.id).unwrap_or_default(),
                created_at: row.created_at,
                last_restock_date: row.last_restock_date,
            };
            (product.id, product)
        })
        .collect())
}

/// Apply drafts to locked products and persist presentation stock, derived
/// product stock and the movement log. Must run inside a transaction that
/// holds the product locks taken by [`load_catalog`].
pub(crate) async fn write_movements(
    conn: &mut PgConnection,
    catalog: &mut HashMap<Uuid, Product>,
    drafts: Vec<NewStockMovement>,
    at: DateTime<Utc>,
) -> AppResult<Vec<StockMovement>> {
    let mut recorded = Vec::with_capacity(drafts.len());
    let mut touched: Vec<Uuid> = Vec::new();

    for draft in drafts {
        let product = catalog
            .get_mut(&draft.product_id)
            .ok_or_else(|| AppError::NotFound(format!("Product {}", draft.product_id)))?;

        let label = apply_movement(product, &draft)?;
        let presentation_id = product.resolve_presentation(draft.presentation_id)?.id;

        let updated = sqlx::query(
            "UPDATE product_presentations SET current_stock = $2 WHERE id = $1 AND current_stock = $3",
        )
        .bind(presentation_id)
        .bind(draft.new_stock)
        .bind(draft.previous_stock)
        .execute(&mut *conn)
        .await?;
        if updated.rows_affected() != 1 {
            let actual = sqlx::query_scalar::<_, Decimal>(
                "SELECT current_stock FROM product_presentations WHERE id = $1",
            )
            .bind(presentation_id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(Decimal::ZERO);
            return Err(DomainError::StaleStock {
                expected: draft.previous_stock,
                actual,
            }
            .into());
        }

        if draft.movement_type == MovementType::Entry {
            product.last_restock_date = Some(at);
        }
        let movement = draft.into_movement(&product.name, label, at);
        let related = movement.related_to.as_ref();

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, product_name, presentation_id, presentation_label, movement_type,
                quantity, previous_stock, new_stock, reason, related_type, related_id,
                related_reference, client_id, client_name, created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(movement.id)
        .bind(movement.product_id)
        .bind(&movement.product_name)
        .bind(movement.presentation_id)
        .bind(&movement.presentation_label)
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.previous_stock)
        .bind(movement.new_stock)
        .bind(&movement.reason)
        .bind(related.map(|r| r.kind.as_str()))
        .bind(related.and_then(|r| r.id))
        .bind(related.and_then(|r| r.reference.clone()))
        .bind(movement.client_id)
        .bind(&movement.client_name)
        .bind(movement.timestamp)
        .bind(movement.created_by)
        .execute(&mut *conn)
        .await?;

        if !touched.contains(&movement.product_id) {
            touched.push(movement.product_id);
        }
        recorded.push(movement);
    }

    for product_id in touched {
        let Some(product) = catalog.get(&product_id) else {
            continue;
        };
        let summary = product.stock_summary();
        sqlx::query(
            r#"
            UPDATE products
            SET current_stock = $2, min_stock = $3, max_stock = $4, last_restock_date = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .bind(summary.current)
        .bind(summary.min)
        .bind(summary.max)
        .bind(product.last_restock_date)
        .execute(&mut *conn)
        .await?;
    }

    Ok(recorded)
}

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool, policy: StorePolicy) -> Self {
        Self { db, policy }
    }

    /// List products with presentations and derived stock
    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        let db = &self.db;
        let catalog = self
            .policy
            .read("list_products", || async move {
                let mut conn = db.acquire().await?;
                load_catalog(&mut conn, None, false).await
            })
            .await?;

        let mut products: Vec<Product> = catalog.into_values().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    /// Get a single product
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        let db = &self.db;
        let mut catalog = self
            .policy
            .read("get_product", || async move {
                let mut conn = db.acquire().await?;
                load_catalog(&mut conn, Some(vec![product_id]), false).await
            })
            .await?;

        catalog
            .remove(&product_id)
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Products whose stock is critical or low
    pub async fn low_stock_products(&self) -> AppResult<Vec<Product>> {
        let products = self.list_products().await?;
        let low: Vec<Product> = ledger::low_stock(&products).into_iter().cloned().collect();
        tracing::debug!(count = low.len(), "Low stock products");
        Ok(low)
    }

    /// Available quantity for a product or one presentation
    pub async fn get_available(&self, product_id: Uuid, presentation_id: Option<Uuid>) -> AppResult<Availability> {
        let product = self.get_product(product_id).await?;
        Ok(product.available(presentation_id)?)
    }

    /// Movement log, newest first
    pub async fn list_movements(&self, pagination: &Pagination) -> AppResult<PaginatedResponse<StockMovement>> {
        let db = &self.db;
        let (limit, offset) = (pagination.limit(), pagination.offset());

        let (rows, total) = self
            .policy
            .read("list_movements", || async move {
                let rows = sqlx::query_as::<_, MovementRow>(&format!(
                    "SELECT {} FROM stock_movements ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
                    MOVEMENT_COLUMNS
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(db)
                .await?;
                let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_movements")
                    .fetch_one(db)
                    .await?;
                Ok::<_, AppError>((rows, total))
            })
            .await?;

        Ok(PaginatedResponse {
            data: movements_from_rows(rows)?,
            pagination: PaginationMeta::new(pagination, total.max(0) as u64),
        })
    }

    /// Movement log of one product, newest first
    pub async fn product_movements(&self, product_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let db = &self.db;
        let rows = self
            .policy
            .read("product_movements", || async move {
                let rows = sqlx::query_as::<_, MovementRow>(&format!(
                    "SELECT {} FROM stock_movements WHERE product_id = $1 ORDER BY created_at DESC, id",
                    MOVEMENT_COLUMNS
                ))
                .bind(product_id)
                .fetch_all(db)
                .await?;
                Ok::<_, AppError>(rows)
            })
            .await?;

        movements_from_rows(rows)
    }

    /// Record a fully formed movement draft.
    ///
    /// The draft's `previous_stock` must still match the stored stock.
    pub async fn record_movement(&self, mut draft: NewStockMovement, user_id: Uuid) -> AppResult<StockMovement> {
        draft.created_by = Some(user_id);
        self.policy
            .write("record_movement", async {
                let mut tx = self.db.begin().await?;
                let mut catalog = load_catalog(&mut tx, Some(vec![draft.product_id]), true).await?;
                if !catalog.contains_key(&draft.product_id) {
                    return Err(AppError::NotFound("Product".to_string()));
                }

                let mut movements = write_movements(&mut tx, &mut catalog, vec![draft], Utc::now()).await?;
                tx.commit().await?;

                let movement = movements
                    .pop()
                    .ok_or_else(|| AppError::Internal("Movement was not recorded".to_string()))?;
                tracing::info!(
                    movement_id = %movement.id,
                    product_id = %movement.product_id,
                    quantity = %movement.quantity,
                    "Stock movement recorded"
                );
                Ok::<_, AppError>(movement)
            })
            .await
    }

    /// Manual entry, exit or adjustment built from current stock
    pub async fn adjust_stock(&self, input: AdjustStockInput, user_id: Uuid) -> AppResult<StockMovement> {
        input.validate()?;
        input.check_amount()?;

        self.policy
            .write("adjust_stock", async {
                let mut tx = self.db.begin().await?;
                let mut catalog = load_catalog(&mut tx, Some(vec![input.product_id]), true).await?;
                let product = catalog
                    .get(&input.product_id)
                    .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

                let mut draft = draft_movement(
                    product,
                    input.presentation_id,
                    input.movement_type,
                    input.amount,
                    &input.reason,
                )?;
                draft.related_to = Some(RelatedTo {
                    kind: RelatedType::Manual,
                    id: None,
                    reference: input.reference.clone(),
                });
                draft.created_by = Some(user_id);

                let mut movements = write_movements(&mut tx, &mut catalog, vec![draft], Utc::now()).await?;
                tx.commit().await?;

                let movement = movements
                    .pop()
                    .ok_or_else(|| AppError::Internal("Movement was not recorded".to_string()))?;
                tracing::info!(
                    movement_id = %movement.id,
                    product_id = %movement.product_id,
                    movement_type = movement.movement_type.as_str(),
                    new_stock = %movement.new_stock,
                    "Stock adjusted"
                );
                Ok::<_, AppError>(movement)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(movement_type: MovementType, amount: i64) -> AdjustStockInput {
        AdjustStockInput {
            product_id: Uuid::new_v4(),
            presentation_id: None,
            movement_type,
            amount: Decimal::from(amount),
            reason: "Conteo".to_string(),
            reference: None,
        }
    }

    #[test]
    fn test_adjustment_amounts() {
        assert!(input(MovementType::Entry, 5).check_amount().is_ok());
        assert!(input(MovementType::Adjustment, -5).check_amount().is_ok());
        assert!(matches!(
            input(MovementType::Entry, -5).check_amount(),
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            input(MovementType::Exit, -1).check_amount(),
            Err(AppError::Validation { .. })
        ));
        assert!(input(MovementType::Adjustment, 0).validate().is_err());
    }

    #[test]
    fn test_adjust_input_uses_camel_case() {
        let json = format!(
            r#"{{"productId":"{}","presentationId":null,"type":"exit","amount":"2.5","reason":"Merma"}}"#,
            Uuid::new_v4()
        );
        let input: AdjustStockInput = serde_json::from_str(&json).unwrap();
        assert_eq!(input.movement_type, MovementType::Exit);
        assert_eq!(input.amount, Decimal::new(25, 1));
        assert!(input.reference.is_none());
    }
}
