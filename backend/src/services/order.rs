//! Order service: orders consume stock through the ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::orders::{plan_order_exits, price_items, OrderLineRequest};
use shared::{Order, OrderItem, OrderStatus, PaymentStatus, StockMovement, UnknownVariant};

use super::inventory::{load_catalog, write_movements};
use super::retry::StorePolicy;
use crate::error::{AppError, AppResult};

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    policy: StorePolicy,
}

/// Row for order query
#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    client_id: Uuid,
    client_name: String,
    status: String,
    payment_status: String,
    order_date: DateTime<Utc>,
    notes: Option<String>,
    items: Json<Vec<OrderItem>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            client_id: row.client_id,
            client_name: row.client_name,
            status: row.status.parse().map_err(|e: UnknownVariant| AppError::Internal(e.to_string()))?,
            payment_status: row
                .payment_status
                .parse()
                .map_err(|e: UnknownVariant| AppError::Internal(e.to_string()))?,
            order_date: row.order_date,
            notes: row.notes,
            items: row.items.0,
        })
    }
}

const ORDER_COLUMNS: &str = "id, client_id, client_name, status, payment_status, order_date, notes, items";

/// Input for creating an order
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub client_id: Uuid,
    pub order_date: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<OrderLineRequest>,
}

/// Created order with the exits it produced
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcome {
    pub order: Order,
    pub movements: Vec<StockMovement>,
}

impl OrderService {
    pub fn new(db: PgPool, policy: StorePolicy) -> Self {
        Self { db, policy }
    }

    /// List orders, newest first
    pub async fn list(&self) -> AppResult<Vec<Order>> {
        let db = &self.db;
        let rows = self
            .policy
            .read("list_orders", || async move {
                let rows = sqlx::query_as::<_, OrderRow>(&format!(
                    "SELECT {} FROM orders ORDER BY order_date DESC",
                    ORDER_COLUMNS
                ))
                .fetch_all(db)
                .await?;
                Ok::<_, AppError>(rows)
            })
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Get an order by id
    pub async fn get(&self, id: Uuid) -> AppResult<Order> {
        let db = &self.db;
        let row = self
            .policy
            .read("get_order", || async move {
                let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                    .bind(id)
                    .fetch_optional(db)
                    .await?;
                Ok::<_, AppError>(row)
            })
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        row.try_into()
    }

    /// Create a delivered order and take its items out of stock in one
    /// transaction
    pub async fn create(&self, input: CreateOrderInput, user_id: Uuid) -> AppResult<OrderOutcome> {
        input.validate()?;

        self.policy
            .write("create_order", async {
                let mut tx = self.db.begin().await?;

                let client_name = sqlx::query_scalar::<_, String>("SELECT name FROM clients WHERE id = $1")
                    .bind(input.client_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Client".to_string()))?;

                let mut ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();
                ids.sort();
                ids.dedup();
                let mut catalog = load_catalog(&mut tx, Some(ids), true).await?;

                let order = Order {
                    id: Uuid::new_v4(),
                    client_id: input.client_id,
                    client_name,
                    status: OrderStatus::Delivered,
                    payment_status: PaymentStatus::Pending,
                    order_date: input.order_date.unwrap_or_else(Utc::now),
                    notes: input.notes.clone(),
                    items: price_items(&catalog, &input.items)?,
                };
                let drafts = plan_order_exits(&order, &catalog, Some(user_id))?;

                sqlx::query(
                    r#"
                    INSERT INTO orders (
                        id, client_id, client_name, status, payment_status, order_date, notes, items, created_by
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(order.id)
                .bind(order.client_id)
                .bind(&order.client_name)
                .bind(order.status.as_str())
                .bind(order.payment_status.as_str())
                .bind(order.order_date)
                .bind(&order.notes)
                .bind(Json(&order.items))
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

                let movements = write_movements(&mut tx, &mut catalog, drafts, Utc::now()).await?;
                tx.commit().await?;

                tracing::info!(
                    order_id = %order.id,
                    client_id = %order.client_id,
                    total = %order.total(),
                    "Order created and stock updated"
                );
                Ok::<_, AppError>(OrderOutcome { order, movements })
            })
            .await
    }
}
