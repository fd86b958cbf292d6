//! Dosification engine tests
//!
//! Tests for dosifications including:
//! - Property 4: Protocol scaling by hectares
//! - Property 5: Application is idempotent and creates one exit per line
//! - Property 8: Insufficient stock blocks application without side effects

use chrono::{Duration, NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::dosing::{
    apply_dosification, dosification_alerts, load_from_protocol, scale_quantity, validate_availability, ProtocolBindings,
};
use shared::ledger::{AvailabilityIssue, InMemoryLedger};
use shared::{
    DomainError, Dosification, DosificationProduct, DosificationProtocol, DosificationStatus, Product,
    ProductCategory, ProtocolProduct, ProtocolStage, RelatedType, StockLevel,
};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn product(name: &str, stock: &str) -> Product {
    Product::with_flat_stock(
        Uuid::new_v4(),
        name,
        ProductCategory::Fertilizer,
        "kg",
        StockLevel::new(dec(stock), Decimal::ZERO, None),
        Utc::now(),
    )
}

fn protocol(per_hectare: &str) -> DosificationProtocol {
    DosificationProtocol {
        id: Uuid::new_v4(),
        name: "Aguacate".to_string(),
        crop: Some("Aguacate".to_string()),
        stages: vec![ProtocolStage {
            name: "Floración".to_string(),
            products: vec![ProtocolProduct {
                code: None,
                name: "Urea".to_string(),
                quantity_per_hectare: dec(per_hectare),
                unit: "kg".to_string(),
                price: None,
            }],
        }],
        created_at: Utc::now(),
    }
}

fn line(product: &Product, quantity: Decimal) -> DosificationProduct {
    DosificationProduct {
        product_id: Some(product.id),
        product_name: product.name.clone(),
        presentation_id: None,
        quantity,
        unit: product.unit.clone(),
    }
}

fn dosification(lines: Vec<DosificationProduct>) -> Dosification {
    Dosification {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        client_name: "Finca X".to_string(),
        hectares: dec("10"),
        crop_type: "Aguacate".to_string(),
        products: lines,
        notes: None,
        protocol: None,
        status: DosificationStatus::Pendiente,
        created_at: Utc::now(),
        applied_at: None,
        next_application_date: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Property 4: 2.5 per hectare over 10 hectares
    #[test]
    fn test_load_scales_per_hectare_dose() {
        let urea = product("Urea", "100");
        let mut bindings = ProtocolBindings::new(vec![]);

        let lines = load_from_protocol(&protocol("2.5"), "Floración", dec("10"), &vec![urea.clone()], &mut bindings)
            .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, dec("25.00"));
        assert_eq!(lines[0].product_id, Some(urea.id));
    }

    #[test]
    fn test_load_rejects_non_positive_hectares() {
        let mut bindings = ProtocolBindings::new(vec![]);
        for hectares in ["0", "-1"] {
            let result = load_from_protocol(&protocol("2.5"), "Floración", dec(hectares), &Vec::<Product>::new(), &mut bindings);
            assert!(matches!(result, Err(DomainError::InvalidHectares(_))));
        }
    }

    #[test]
    fn test_load_rejects_oversized_fields_and_doses() {
        let mut bindings = ProtocolBindings::new(vec![]);
        let urea = product("Urea", "100");
        let catalog = vec![urea];

        let result = load_from_protocol(&protocol("2.5"), "Floración", Decimal::MAX, &catalog, &mut bindings);
        assert!(matches!(result, Err(DomainError::InvalidHectares(_))));

        let mut huge = protocol("2.5");
        huge.stages[0].products[0].quantity_per_hectare = Decimal::MAX;
        let result = load_from_protocol(&huge, "Floración", dec("50"), &catalog, &mut bindings);
        assert!(matches!(result, Err(DomainError::InvalidHectares(_))));
        assert!(bindings.take_learned().is_empty());
    }

    #[test]
    fn test_applied_dosification_moves_from_overdue_to_reminders() {
        let urea = product("Urea", "50");
        let mut ledger = InMemoryLedger::new(vec![urea.clone()]);
        let mut d = dosification(vec![line(&urea, dec("5"))]);
        d.next_application_date = NaiveDate::from_ymd_opt(2030, 3, 1);
        let now = d.created_at + Duration::days(2);

        let before = dosification_alerts(&[d.clone()], now);
        assert_eq!(before.overdue.len(), 1);
        assert!(before.next_applications.is_empty());

        apply_dosification(&mut ledger, &mut d, now).unwrap();

        let after = dosification_alerts(&[d.clone()], now);
        assert!(after.overdue.is_empty());
        assert_eq!(after.next_applications.len(), 1);
        assert_eq!(after.next_applications[0].dosification_id, d.id);
        assert!(after.next_applications[0].days_until > 0);
    }

    #[test]
    fn test_apply_creates_exit_per_line_and_marks_applied() {
        let urea = product("Urea", "50");
        let potasa = product("Potasa", "20");
        let mut ledger = InMemoryLedger::new(vec![urea.clone(), potasa.clone()]);
        let mut dos = dosification(vec![line(&urea, dec("10")), line(&potasa, dec("5"))]);

        let movements = apply_dosification(&mut ledger, &mut dos, Utc::now()).unwrap();

        assert_eq!(movements.len(), 2);
        assert_eq!(dos.status, DosificationStatus::Aplicada);
        assert!(dos.applied_at.is_some());
        assert_eq!(ledger.available(urea.id, None).unwrap().available, dec("40"));
        assert_eq!(ledger.available(potasa.id, None).unwrap().available, dec("15"));
        for m in &movements {
            assert_eq!(m.client_id, Some(dos.client_id));
            assert_eq!(m.related_to.as_ref().map(|r| r.kind), Some(RelatedType::Dosification));
        }
    }

    /// Property 5: applying twice changes nothing the second time
    #[test]
    fn test_apply_twice_is_rejected() {
        let urea = product("Urea", "50");
        let mut ledger = InMemoryLedger::new(vec![urea.clone()]);
        let mut dos = dosification(vec![line(&urea, dec("10"))]);
        apply_dosification(&mut ledger, &mut dos, Utc::now()).unwrap();

        let result = apply_dosification(&mut ledger, &mut dos, Utc::now());

        assert!(matches!(result, Err(DomainError::AlreadyApplied(_))));
        assert_eq!(ledger.movements().len(), 1);
        assert_eq!(ledger.available(urea.id, None).unwrap().available, dec("40"));
    }

    /// Property 8: stock 5, request 6
    #[test]
    fn test_shortfall_reports_one_issue_and_blocks_apply() {
        let urea = product("Urea", "5");
        let mut ledger = InMemoryLedger::new(vec![urea.clone()]);
        let mut dos = dosification(vec![line(&urea, dec("6"))]);

        let report = validate_availability(&dos.products, ledger.catalog());
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
        match &report.issues[0] {
            AvailabilityIssue::Insufficient(shortfall) => {
                assert_eq!(shortfall.requested, dec("6"));
                assert_eq!(shortfall.available, dec("5"));
            }
            other => panic!("unexpected issue {:?}", other),
        }

        let result = apply_dosification(&mut ledger, &mut dos, Utc::now());
        assert!(matches!(result, Err(DomainError::InsufficientStock(_))));
        assert!(ledger.movements().is_empty());
        assert_eq!(dos.status, DosificationStatus::Pendiente);
    }

    #[test]
    fn test_unbound_line_blocks_apply() {
        let urea = product("Urea", "50");
        let mut ledger = InMemoryLedger::new(vec![urea.clone()]);
        let mut unbound = line(&urea, dec("1"));
        unbound.product_id = None;
        let mut dos = dosification(vec![line(&urea, dec("1")), unbound]);

        let result = apply_dosification(&mut ledger, &mut dos, Utc::now());
        assert!(matches!(result, Err(DomainError::UnresolvedProduct(_))));
        assert!(ledger.movements().is_empty());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for per-hectare doses (0.01 to 100.00)
    fn dose_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=10000i64).prop_map(|n| Decimal::new(n, 2))
    }

    /// Strategy for field sizes (0.1 to 500.0 ha)
    fn hectares_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=5000i64).prop_map(|n| Decimal::new(n, 1))
    }

    fn stock_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=1000i64).prop_map(Decimal::from)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property 4: Scaled quantity is the rounded product of dose and area
        #[test]
        fn prop_scaled_quantity(dose in dose_strategy(), hectares in hectares_strategy()) {
            let scaled = scale_quantity(dose, hectares).unwrap();
            prop_assert!(scaled.scale() <= 2);
            prop_assert!((scaled - dose * hectares).abs() <= dec("0.005"));
        }

        /// Property 5 and 8: Application either consumes every line or
        /// nothing at all
        #[test]
        fn prop_apply_all_or_nothing(
            stocks in prop::collection::vec(stock_strategy(), 1..5),
            requests in prop::collection::vec(1i64..=500i64, 1..5)
        ) {
            let products: Vec<Product> = stocks
                .iter()
                .enumerate()
                .map(|(i, s)| product(&format!("P{}", i), &s.to_string()))
                .collect();
            let lines: Vec<DosificationProduct> = requests
                .iter()
                .enumerate()
                .map(|(i, q)| line(&products[i % products.len()], Decimal::from(*q)))
                .collect();
            let line_count = lines.len();
            let before: Vec<Decimal> = products.iter().map(|p| p.stock_summary().current).collect();
            let mut ledger = InMemoryLedger::new(products.clone());
            let mut dos = dosification(lines);

            match apply_dosification(&mut ledger, &mut dos, Utc::now()) {
                Ok(movements) => {
                    prop_assert_eq!(movements.len(), line_count);
                    prop_assert_eq!(dos.status, DosificationStatus::Aplicada);
                }
                Err(_) => {
                    prop_assert!(ledger.movements().is_empty());
                    prop_assert_eq!(dos.status, DosificationStatus::Pendiente);
                    for (p, stock) in products.iter().zip(before) {
                        prop_assert_eq!(ledger.available(p.id, None).unwrap().available, stock);
                    }
                }
            }
            for p in &products {
                prop_assert!(ledger.available(p.id, None).unwrap().available >= Decimal::ZERO);
            }
        }
    }
}
