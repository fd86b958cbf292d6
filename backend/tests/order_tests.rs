//! Order tests
//!
//! Orders take their items out of stock through the same ledger checks as
//! dosifications.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::ledger::InMemoryLedger;
use shared::orders::{plan_order_exits, price_items, OrderLineRequest, ORDER_MOVEMENT_REASON};
use shared::{
    DomainError, Order, OrderStatus, PaymentStatus, Presentation, Product, ProductCategory, RelatedType, StockLevel,
};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn drum_product(stock: &str, pvp: &str) -> Product {
    let mut product = Product::with_flat_stock(
        Uuid::new_v4(),
        "Fungicida",
        ProductCategory::Fungicide,
        "L",
        StockLevel::empty(),
        Utc::now(),
    );
    product.presentations = vec![Presentation {
        id: Uuid::new_v4(),
        label: "Bidón 20L".to_string(),
        unit: "bidón".to_string(),
        pvp: dec(pvp),
        stock: StockLevel::new(dec(stock), Decimal::ZERO, None),
        sku: Some("FUN-20".to_string()),
        is_default: false,
    }];
    product
}

fn order_for(catalog: &[Product], lines: &[OrderLineRequest]) -> Result<Order, DomainError> {
    Ok(Order {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        client_name: "Finca X".to_string(),
        status: OrderStatus::Delivered,
        payment_status: PaymentStatus::Pending,
        order_date: Utc::now(),
        notes: None,
        items: price_items(catalog, lines)?,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_order_prices_and_consumes_stock() {
        let product = drum_product("10", "45.50");
        let presentation_id = product.presentations[0].id;
        let catalog = vec![product.clone()];
        let lines = vec![OrderLineRequest {
            product_id: product.id,
            presentation_id: Some(presentation_id),
            quantity: dec("3"),
        }];

        let order = order_for(&catalog, &lines).unwrap();
        assert_eq!(order.items[0].unit_price, Some(dec("45.50")));
        assert_eq!(order.items[0].line_total, Some(dec("136.50")));

        let drafts = plan_order_exits(&order, &catalog, None).unwrap();
        let mut ledger = InMemoryLedger::new(catalog);
        let movements = ledger.record_batch(drafts).unwrap();

        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].reason, ORDER_MOVEMENT_REASON);
        assert_eq!(movements[0].client_id, Some(order.client_id));
        assert_eq!(movements[0].related_to.as_ref().map(|r| r.kind), Some(RelatedType::Order));
        assert_eq!(ledger.available(product.id, Some(presentation_id)).unwrap().available, dec("7"));
    }

    #[test]
    fn test_order_beyond_stock_is_refused() {
        let product = drum_product("2", "45.50");
        let catalog = vec![product.clone()];
        let lines = vec![OrderLineRequest {
            product_id: product.id,
            presentation_id: Some(product.presentations[0].id),
            quantity: dec("3"),
        }];

        let order = order_for(&catalog, &lines).unwrap();
        let result = plan_order_exits(&order, &catalog, None);
        assert!(matches!(result, Err(DomainError::InsufficientStock(_))));
    }

    #[test]
    fn test_empty_order_is_rejected() {
        assert!(order_for(&[], &[]).is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Repeated lines on one presentation are checked against the
        /// combined quantity
        #[test]
        fn prop_repeated_lines_share_stock(
            stock in 0i64..100,
            quantities in prop::collection::vec(1i64..30, 1..6)
        ) {
            let product = drum_product(&stock.to_string(), "10");
            let presentation_id = product.presentations[0].id;
            let catalog = vec![product.clone()];
            let lines: Vec<OrderLineRequest> = quantities
                .iter()
                .map(|q| OrderLineRequest {
                    product_id: product.id,
                    presentation_id: Some(presentation_id),
                    quantity: Decimal::from(*q),
                })
                .collect();
            let requested: i64 = quantities.iter().sum();

            let order = order_for(&catalog, &lines).unwrap();
            let planned = plan_order_exits(&order, &catalog, None);

            prop_assert_eq!(planned.is_ok(), requested <= stock);
            if let Ok(drafts) = planned {
                let mut ledger = InMemoryLedger::new(catalog);
                ledger.record_batch(drafts).unwrap();
                let left = ledger.available(product.id, Some(presentation_id)).unwrap().available;
                prop_assert_eq!(left, Decimal::from(stock - requested));
            }
        }
    }
}
