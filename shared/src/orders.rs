//! Order pricing and stock consumption

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::ledger::{check_availability, draft_exits, ExitContext, StockCatalog, StockRequest};
use crate::models::{NewStockMovement, Order, OrderItem, RelatedTo, RelatedType};
use crate::types::round2;
use crate::validation::validate_positive_quantity;

pub const ORDER_MOVEMENT_REASON: &str = "Venta a cliente";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub presentation_id: Option<Uuid>,
    pub quantity: Decimal,
}

/// Turn requested lines into priced order items.
///
/// Lines on an explicit presentation are priced at its PVP; lines on a bulk
/// product carry no price.
pub fn price_items<C: StockCatalog + ?Sized>(
    catalog: &C,
    lines: &[OrderLineRequest],
) -> DomainResult<Vec<OrderItem>> {
    if lines.is_empty() {
        return Err(DomainError::validation("items", "At least one item is required"));
    }

    lines
        .iter()
        .map(|line| {
            let product = catalog
                .product(line.product_id)
                .ok_or_else(|| DomainError::NotFound(format!("Product {}", line.product_id)))?;
            validate_positive_quantity(line.quantity)
                .map_err(|_| DomainError::InvalidQuantity(product.name.clone()))?;
            let presentation = product.resolve_presentation(line.presentation_id)?;
            let priced = (!presentation.is_default).then_some(presentation);
            let line_total = match priced {
                Some(p) => Some(
                    p.pvp
                        .checked_mul(line.quantity)
                        .map(round2)
                        .ok_or_else(|| DomainError::InvalidQuantity(product.name.clone()))?,
                ),
                None => None,
            };

            Ok(OrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                presentation_id: priced.map(|p| p.id),
                presentation_label: priced.map(|p| p.label.clone()),
                unit: presentation.unit.clone(),
                quantity: line.quantity,
                unit_price: priced.map(|p| p.pvp),
                line_total,
            })
        })
        .collect()
}

/// Validate stock for every item of an order and build its exit movements
pub fn plan_order_exits<C: StockCatalog + ?Sized>(
    order: &Order,
    catalog: &C,
    created_by: Option<Uuid>,
) -> DomainResult<Vec<NewStockMovement>> {
    let requests: Vec<StockRequest> = order
        .items
        .iter()
        .map(|item| StockRequest {
            product_id: Some(item.product_id),
            product_name: item.product_name.clone(),
            presentation_id: item.presentation_id,
            quantity: item.quantity,
        })
        .collect();
    check_availability(catalog, &requests).into_result()?;

    let context = ExitContext {
        reason: ORDER_MOVEMENT_REASON.to_string(),
        client_id: Some(order.client_id),
        client_name: Some(order.client_name.clone()),
        created_by,
    };
    draft_exits(catalog, &requests, &context, |_| {
        Some(RelatedTo {
            kind: RelatedType::Order,
            id: Some(order.id),
            reference: Some(order.id.to_string()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        OrderStatus, PaymentStatus, Presentation, Product, ProductCategory, StockLevel,
    };
    use chrono::Utc;

    fn product_with_drum(stock: i64) -> Product {
        let mut product = Product::with_flat_stock(
            Uuid::new_v4(),
            "Glifosato",
            ProductCategory::Herbicide,
            "L",
            StockLevel::empty(),
            Utc::now(),
        );
        product.presentations = vec![Presentation {
            id: Uuid::new_v4(),
            label: "Bidón 20L".to_string(),
            unit: "bidón".to_string(),
            pvp: Decimal::new(4599, 2),
            stock: StockLevel::new(Decimal::from(stock), Decimal::ONE, None),
            sku: Some("GLI-20".to_string()),
            is_default: false,
        }];
        product
    }

    #[test]
    fn test_price_items_uses_presentation_pvp() {
        let product = product_with_drum(10);
        let line = OrderLineRequest {
            product_id: product.id,
            presentation_id: Some(product.presentations[0].id),
            quantity: Decimal::from(3),
        };
        let items = price_items(&vec![product], &[line]).unwrap();
        assert_eq!(items[0].line_total, Some(Decimal::new(13797, 2)));
        assert_eq!(items[0].presentation_label.as_deref(), Some("Bidón 20L"));
    }

    #[test]
    fn test_price_items_rejects_overflowing_total() {
        let product = product_with_drum(10);
        let line = OrderLineRequest {
            product_id: product.id,
            presentation_id: Some(product.presentations[0].id),
            quantity: Decimal::MAX,
        };
        assert!(matches!(
            price_items(&vec![product], &[line]),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_order_exits_carry_client() {
        let product = product_with_drum(10);
        let catalog = vec![product.clone()];
        let items = price_items(
            &catalog,
            &[OrderLineRequest {
                product_id: product.id,
                presentation_id: None,
                quantity: Decimal::from(4),
            }],
        )
        .unwrap();
        let order = Order {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Finca Y".to_string(),
            status: OrderStatus::Delivered,
            payment_status: PaymentStatus::Pending,
            order_date: Utc::now(),
            notes: None,
            items,
        };

        let drafts = plan_order_exits(&order, &catalog, None).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].quantity, Decimal::from(-4));
        assert_eq!(drafts[0].client_id, Some(order.client_id));
        assert_eq!(drafts[0].reason, ORDER_MOVEMENT_REASON);
    }

    #[test]
    fn test_order_beyond_stock_is_refused() {
        let product = product_with_drum(2);
        let catalog = vec![product.clone()];
        let items = price_items(
            &catalog,
            &[OrderLineRequest {
                product_id: product.id,
                presentation_id: None,
                quantity: Decimal::from(3),
            }],
        )
        .unwrap();
        let order = Order {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Finca Y".to_string(),
            status: OrderStatus::Delivered,
            payment_status: PaymentStatus::Pending,
            order_date: Utc::now(),
            notes: None,
            items,
        };
        assert!(matches!(
            plan_order_exits(&order, &catalog, None),
            Err(DomainError::InsufficientStock(_))
        ));
    }
}
