//! Inventory ledger: per-presentation stock plus an append-only movement log
//!
//! The functions here are pure and operate on product snapshots. The backend
//! runs the same checks inside a database transaction with the product rows
//! locked; [`InMemoryLedger`] runs them against a `HashMap`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult, StockShortfall};
use crate::models::{
    Availability, MovementType, NewStockMovement, Product, RelatedTo, StockMovement, StockStatus,
};

/// Read access to the product registry
pub trait StockCatalog {
    fn product(&self, id: Uuid) -> Option<&Product>;
    fn products(&self) -> Box<dyn Iterator<Item = &Product> + '_>;
}

impl StockCatalog for HashMap<Uuid, Product> {
    fn product(&self, id: Uuid) -> Option<&Product> {
        self.get(&id)
    }

    fn products(&self) -> Box<dyn Iterator<Item = &Product> + '_> {
        Box::new(self.values())
    }
}

impl StockCatalog for [Product] {
    fn product(&self, id: Uuid) -> Option<&Product> {
        self.iter().find(|p| p.id == id)
    }

    fn products(&self) -> Box<dyn Iterator<Item = &Product> + '_> {
        Box::new(self.iter())
    }
}

impl StockCatalog for Vec<Product> {
    fn product(&self, id: Uuid) -> Option<&Product> {
        self.as_slice().product(id)
    }

    fn products(&self) -> Box<dyn Iterator<Item = &Product> + '_> {
        Box::new(self.iter())
    }
}

/// Available stock for a product, or one of its presentations
pub fn get_available<C: StockCatalog + ?Sized>(
    catalog: &C,
    product_id: Uuid,
    presentation_id: Option<Uuid>,
) -> DomainResult<Availability> {
    catalog
        .product(product_id)
        .ok_or_else(|| DomainError::NotFound(format!("Product {}", product_id)))?
        .available(presentation_id)
}

/// Products whose derived stock is critical or low
pub fn low_stock<C: StockCatalog + ?Sized>(catalog: &C) -> Vec<&Product> {
    let mut products: Vec<&Product> = catalog
        .products()
        .filter(|p| matches!(p.stock_status(), StockStatus::Critical | StockStatus::Low))
        .collect();
    products.sort_by(|a, b| a.name.cmp(&b.name));
    products
}

/// Build a movement draft from the product's current stock
pub fn draft_movement(
    product: &Product,
    presentation_id: Option<Uuid>,
    movement_type: MovementType,
    amount: Decimal,
    reason: &str,
) -> DomainResult<NewStockMovement> {
    let presentation = product.resolve_presentation(presentation_id)?;
    let quantity = movement_type.signed_delta(amount);
    if quantity.is_zero() {
        return Err(DomainError::InvalidQuantity(product.name.clone()));
    }
    let previous_stock = presentation.stock.current;
    let new_stock = previous_stock
        .checked_add(quantity)
        .ok_or_else(|| DomainError::InvalidQuantity(product.name.clone()))?;
    if new_stock < Decimal::ZERO {
        return Err(DomainError::InsufficientStock(vec![StockShortfall {
            product_id: product.id,
            product_name: product.name.clone(),
            presentation_id: Some(presentation.id),
            requested: -quantity,
            available: previous_stock,
            unit: presentation.unit.clone(),
        }]));
    }

    Ok(NewStockMovement {
        product_id: product.id,
        presentation_id: if presentation.is_default { None } else { Some(presentation.id) },
        movement_type,
        quantity,
        previous_stock,
        new_stock,
        reason: reason.to_string(),
        related_to: None,
        client_id: None,
        client_name: None,
        created_by: None,
    })
}

/// Apply a draft to a product snapshot.
///
/// Checks the snapshot, compares `previous_stock` with the stored stock and
/// refuses a negative result. Returns the presentation label to denormalize
/// into the log; the product is left untouched on error.
pub fn apply_movement(product: &mut Product, draft: &NewStockMovement) -> DomainResult<Option<String>> {
    if draft.product_id != product.id {
        return Err(DomainError::SnapshotMismatch(format!(
            "movement for {} applied to {}",
            draft.product_id, product.id
        )));
    }
    draft.check_snapshot(&product.name)?;

    let product_id = product.id;
    let product_name = product.name.clone();
    let presentation_id = product.resolve_presentation(draft.presentation_id)?.id;
    let presentation = product
        .presentation_mut(presentation_id)
        .ok_or_else(|| DomainError::NotFound(format!("Presentation {}", presentation_id)))?;

    if presentation.stock.current != draft.previous_stock {
        return Err(DomainError::StaleStock {
            expected: draft.previous_stock,
            actual: presentation.stock.current,
        });
    }
    if draft.new_stock < Decimal::ZERO {
        return Err(DomainError::InsufficientStock(vec![StockShortfall {
            product_id,
            product_name,
            presentation_id: Some(presentation.id),
            requested: draft.quantity.abs(),
            available: presentation.stock.current,
            unit: presentation.unit.clone(),
        }]));
    }

    presentation.stock.current = draft.new_stock;
    Ok(if presentation.is_default {
        None
    } else {
        Some(presentation.label.clone())
    })
}

/// A quantity some caller wants to take out of stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRequest {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub presentation_id: Option<Uuid>,
    pub quantity: Decimal,
}

/// Reason a stock request cannot be served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityIssue {
    Unbound { product_name: String },
    ProductNotFound { product_name: String },
    PresentationRequired { product_name: String },
    InvalidQuantity { product_name: String },
    Insufficient(StockShortfall),
}

impl AvailabilityIssue {
    /// Message shown to Spanish-speaking users
    pub fn message_es(&self) -> String {
        match self {
            AvailabilityIssue::Unbound { product_name }
            | AvailabilityIssue::ProductNotFound { product_name } => {
                format!("{}: Producto no encontrado en inventario", product_name)
            }
            AvailabilityIssue::PresentationRequired { product_name } => {
                format!("{}: Selecciona una presentación", product_name)
            }
            AvailabilityIssue::InvalidQuantity { product_name } => {
                format!("{}: La cantidad debe ser mayor a 0", product_name)
            }
            AvailabilityIssue::Insufficient(s) => format!(
                "{}: Stock insuficiente (Disponible: {} {}, Requerido: {} {})",
                s.product_name, s.available, s.unit, s.requested, s.unit
            ),
        }
    }

    pub fn into_error(self) -> DomainError {
        match self {
            AvailabilityIssue::Unbound { product_name } => DomainError::UnresolvedProduct(product_name),
            AvailabilityIssue::ProductNotFound { product_name } => {
                DomainError::NotFound(format!("Product {}", product_name))
            }
            AvailabilityIssue::PresentationRequired { product_name } => {
                DomainError::PresentationRequired(product_name)
            }
            AvailabilityIssue::InvalidQuantity { product_name } => DomainError::InvalidQuantity(product_name),
            AvailabilityIssue::Insufficient(shortfall) => DomainError::InsufficientStock(vec![shortfall]),
        }
    }
}

impl std::fmt::Display for AvailabilityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AvailabilityIssue::Unbound { product_name } => {
                write!(f, "{}: product is not bound to inventory", product_name)
            }
            AvailabilityIssue::ProductNotFound { product_name } => {
                write!(f, "{}: product not found in inventory", product_name)
            }
            AvailabilityIssue::PresentationRequired { product_name } => {
                write!(f, "{}: a presentation must be selected", product_name)
            }
            AvailabilityIssue::InvalidQuantity { product_name } => {
                write!(f, "{}: quantity must be positive", product_name)
            }
            AvailabilityIssue::Insufficient(shortfall) => write!(f, "{}", shortfall),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub ok: bool,
    pub issues: Vec<AvailabilityIssue>,
}

impl AvailabilityReport {
    /// Collapse the report into a single error, grouping all shortfalls
    pub fn into_result(self) -> DomainResult<()> {
        if self.ok {
            return Ok(());
        }
        let mut shortfalls = Vec::new();
        let mut first_other = None;
        for issue in self.issues {
            match issue {
                AvailabilityIssue::Insufficient(s) => shortfalls.push(s),
                other => {
                    if first_other.is_none() {
                        first_other = Some(other);
                    }
                }
            }
        }
        match first_other {
            Some(issue) => Err(issue.into_error()),
            None => Err(DomainError::InsufficientStock(shortfalls)),
        }
    }
}

/// Check every request against current stock without touching it.
///
/// Requests for the same product and presentation are summed before the
/// comparison, so two lines of 3 against a stock of 5 are reported.
pub fn check_availability<C: StockCatalog + ?Sized>(
    catalog: &C,
    requests: &[StockRequest],
) -> AvailabilityReport {
    let mut issues = Vec::new();
    // (product, presentation) -> requested
    let mut totals: Vec<((Uuid, Uuid), Decimal)> = Vec::new();

    for request in requests {
        let Some(product_id) = request.product_id else {
            issues.push(AvailabilityIssue::Unbound {
                product_name: request.product_name.clone(),
            });
            continue;
        };
        let Some(product) = catalog.product(product_id) else {
            issues.push(AvailabilityIssue::ProductNotFound {
                product_name: request.product_name.clone(),
            });
            continue;
        };
        if request.quantity <= Decimal::ZERO {
            issues.push(AvailabilityIssue::InvalidQuantity {
                product_name: product.name.clone(),
            });
            continue;
        }
        let presentation = match product.resolve_presentation(request.presentation_id) {
            Ok(presentation) => presentation,
            Err(DomainError::PresentationRequired(name)) => {
                issues.push(AvailabilityIssue::PresentationRequired { product_name: name });
                continue;
            }
            Err(_) => {
                issues.push(AvailabilityIssue::ProductNotFound {
                    product_name: product.name.clone(),
                });
                continue;
            }
        };

        let key = (product.id, presentation.id);
        match totals.iter_mut().find(|(k, _)| *k == key) {
            Some((_, total)) => match total.checked_add(request.quantity) {
                Some(sum) => *total = sum,
                None => issues.push(AvailabilityIssue::InvalidQuantity {
                    product_name: product.name.clone(),
                }),
            },
            None => totals.push((key, request.quantity)),
        }
    }

    for ((product_id, presentation_id), requested) in totals {
        let Some(product) = catalog.product(product_id) else {
            continue;
        };
        let Some(presentation) = product.presentation(presentation_id) else {
            continue;
        };
        if requested > presentation.stock.current {
            issues.push(AvailabilityIssue::Insufficient(StockShortfall {
                product_id,
                product_name: product.name.clone(),
                presentation_id: if presentation.is_default { None } else { Some(presentation_id) },
                requested,
                available: presentation.stock.current,
                unit: presentation.unit.clone(),
            }));
        }
    }

    AvailabilityReport {
        ok: issues.is_empty(),
        issues,
    }
}

/// Shared attribution for a batch of exit movements
#[derive(Debug, Clone, Default)]
pub struct ExitContext {
    pub reason: String,
    pub client_id: Option<Uuid>,
    pub client_name: Option<String>,
    pub created_by: Option<Uuid>,
}

/// Build chained exit drafts for a batch of requests.
///
/// Each draft sees the stock left by the previous one, so several lines
/// against the same presentation produce consistent snapshots. `related`
/// yields the `relatedTo` of each line.
pub fn draft_exits<C, F>(
    catalog: &C,
    requests: &[StockRequest],
    context: &ExitContext,
    mut related: F,
) -> DomainResult<Vec<NewStockMovement>>
where
    C: StockCatalog + ?Sized,
    F: FnMut(&StockRequest) -> Option<RelatedTo>,
{
    let mut scratch: HashMap<Uuid, Product> = HashMap::new();
    let mut drafts = Vec::with_capacity(requests.len());

    for request in requests {
        let product_id = request
            .product_id
            .ok_or_else(|| DomainError::UnresolvedProduct(request.product_name.clone()))?;
        if !scratch.contains_key(&product_id) {
            let product = catalog
                .product(product_id)
                .ok_or_else(|| DomainError::NotFound(format!("Product {}", request.product_name)))?;
            scratch.insert(product_id, product.clone());
        }
        let product = scratch
            .get_mut(&product_id)
            .ok_or_else(|| DomainError::NotFound(format!("Product {}", request.product_name)))?;

        let mut draft = draft_movement(
            product,
            request.presentation_id,
            MovementType::Exit,
            request.quantity,
            &context.reason,
        )?;
        draft.related_to = related(request);
        draft.client_id = context.client_id;
        draft.client_name = context.client_name.clone();
        draft.created_by = context.created_by;

        apply_movement(product, &draft)?;
        drafts.push(draft);
    }

    Ok(drafts)
}

/// Single-owner ledger kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    products: HashMap<Uuid, Product>,
    movements: Vec<StockMovement>,
}

impl InMemoryLedger {
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            movements: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &HashMap<Uuid, Product> {
        &self.products
    }

    pub fn product(&self, id: Uuid) -> Option<&Product> {
        self.products.get(&id)
    }

    /// All movements, newest first
    pub fn movements(&self) -> Vec<&StockMovement> {
        self.movements.iter().rev().collect()
    }

    pub fn movements_for_product(&self, product_id: Uuid) -> Vec<&StockMovement> {
        self.movements
            .iter()
            .rev()
            .filter(|m| m.product_id == product_id)
            .collect()
    }

    pub fn available(&self, product_id: Uuid, presentation_id: Option<Uuid>) -> DomainResult<Availability> {
        get_available(&self.products, product_id, presentation_id)
    }

    pub fn record_movement(&mut self, draft: NewStockMovement) -> DomainResult<StockMovement> {
        self.record_movement_at(draft, Utc::now())
    }

    pub fn record_movement_at(&mut self, draft: NewStockMovement, at: DateTime<Utc>) -> DomainResult<StockMovement> {
        let mut recorded = self.record_batch_at(vec![draft], at)?;
        recorded
            .pop()
            .ok_or_else(|| DomainError::validation("movement", "empty batch"))
    }

    /// Record a batch of drafts; either all of them land or none does
    pub fn record_batch(&mut self, drafts: Vec<NewStockMovement>) -> DomainResult<Vec<StockMovement>> {
        self.record_batch_at(drafts, Utc::now())
    }

    pub fn record_batch_at(
        &mut self,
        drafts: Vec<NewStockMovement>,
        at: DateTime<Utc>,
    ) -> DomainResult<Vec<StockMovement>> {
        let mut scratch: HashMap<Uuid, Product> = HashMap::new();
        let mut recorded = Vec::with_capacity(drafts.len());

        for draft in drafts {
            if !scratch.contains_key(&draft.product_id) {
                let product = self
                    .products
                    .get(&draft.product_id)
                    .ok_or_else(|| DomainError::NotFound(format!("Product {}", draft.product_id)))?;
                scratch.insert(draft.product_id, product.clone());
            }
            let product = scratch
                .get_mut(&draft.product_id)
                .ok_or_else(|| DomainError::NotFound(format!("Product {}", draft.product_id)))?;

            let label = apply_movement(product, &draft)?;
            if draft.movement_type == MovementType::Entry {
                product.last_restock_date = Some(at);
            }
            let name = product.name.clone();
            recorded.push(draft.into_movement(&name, label, at));
        }

        self.products.extend(scratch);
        self.movements.extend(recorded.iter().cloned());
        Ok(recorded)
    }

    /// Manual stock change from the adjustment form
    pub fn adjust_stock(
        &mut self,
        product_id: Uuid,
        presentation_id: Option<Uuid>,
        movement_type: MovementType,
        amount: Decimal,
        reason: &str,
        related_to: Option<RelatedTo>,
    ) -> DomainResult<StockMovement> {
        let product = self
            .products
            .get(&product_id)
            .ok_or_else(|| DomainError::NotFound(format!("Product {}", product_id)))?;
        let mut draft = draft_movement(product, presentation_id, movement_type, amount, reason)?;
        draft.related_to = related_to;
        self.record_movement(draft)
    }

    pub fn low_stock(&self) -> Vec<&Product> {
        low_stock(&self.products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Presentation, ProductCategory, StockLevel};

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn flat(name: &str, current: i64) -> Product {
        Product::with_flat_stock(
            Uuid::new_v4(),
            name,
            ProductCategory::Fertilizer,
            "kg",
            StockLevel::new(dec(current), dec(2), None),
            Utc::now(),
        )
    }

    fn with_presentations(stocks: &[i64]) -> Product {
        let mut product = flat("Fungicida X", 0);
        product.presentations = stocks
            .iter()
            .enumerate()
            .map(|(i, stock)| Presentation {
                id: Uuid::new_v4(),
                label: format!("Envase {}", i),
                unit: "L".to_string(),
                pvp: dec(50),
                stock: StockLevel::new(dec(*stock), dec(1), None),
                sku: None,
                is_default: false,
            })
            .collect();
        product
    }

    #[test]
    fn test_adjust_stock_updates_stock_and_log() {
        let product = flat("Urea", 10);
        let id = product.id;
        let mut ledger = InMemoryLedger::new(vec![product]);

        let movement = ledger
            .adjust_stock(id, None, MovementType::Exit, dec(4), "Venta", None)
            .unwrap();
        assert_eq!(movement.quantity, dec(-4));
        assert_eq!(movement.previous_stock, dec(10));
        assert_eq!(movement.new_stock, dec(6));
        assert_eq!(ledger.available(id, None).unwrap().available, dec(6));
        assert_eq!(ledger.movements().len(), 1);
    }

    #[test]
    fn test_exit_beyond_stock_is_rejected_without_side_effects() {
        let product = flat("Urea", 5);
        let id = product.id;
        let mut ledger = InMemoryLedger::new(vec![product]);

        let result = ledger.adjust_stock(id, None, MovementType::Exit, dec(6), "Venta", None);
        assert!(matches!(result, Err(DomainError::InsufficientStock(_))));
        assert_eq!(ledger.available(id, None).unwrap().available, dec(5));
        assert!(ledger.movements().is_empty());
    }

    #[test]
    fn test_stale_snapshot_is_rejected() {
        let product = flat("Urea", 10);
        let id = product.id;
        let mut ledger = InMemoryLedger::new(vec![product.clone()]);

        let first = draft_movement(&product, None, MovementType::Exit, dec(3), "a").unwrap();
        let second = draft_movement(&product, None, MovementType::Exit, dec(3), "b").unwrap();
        ledger.record_movement(first).unwrap();

        let result = ledger.record_movement(second);
        assert_eq!(
            result,
            Err(DomainError::StaleStock {
                expected: dec(10),
                actual: dec(7)
            })
        );
        assert_eq!(ledger.available(id, None).unwrap().available, dec(7));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let a = flat("Urea", 10);
        let b = flat("Potasio", 1);
        let (a_id, b_id) = (a.id, b.id);
        let mut ledger = InMemoryLedger::new(vec![a.clone(), b.clone()]);

        let ok = draft_movement(&a, None, MovementType::Exit, dec(2), "x").unwrap();
        let mut bad = draft_movement(&b, None, MovementType::Exit, dec(1), "x").unwrap();
        bad.previous_stock = dec(3);
        bad.new_stock = dec(2);

        assert!(ledger.record_batch(vec![ok, bad]).is_err());
        assert_eq!(ledger.available(a_id, None).unwrap().available, dec(10));
        assert_eq!(ledger.available(b_id, None).unwrap().available, dec(1));
        assert!(ledger.movements().is_empty());
    }

    #[test]
    fn test_presentation_required_for_multi_presentation_product() {
        let product = with_presentations(&[5, 3]);
        assert!(matches!(
            draft_movement(&product, None, MovementType::Exit, dec(1), "x"),
            Err(DomainError::PresentationRequired(_))
        ));

        let target = product.presentations[1].id;
        let id = product.id;
        let mut ledger = InMemoryLedger::new(vec![product]);
        let movement = ledger
            .adjust_stock(id, Some(target), MovementType::Exit, dec(2), "x", None)
            .unwrap();
        assert_eq!(movement.presentation_label.as_deref(), Some("Envase 1"));
        assert_eq!(ledger.product(id).unwrap().stock_summary().current, dec(6));
    }

    #[test]
    fn test_check_availability_sums_lines() {
        let product = flat("Urea", 5);
        let request = StockRequest {
            product_id: Some(product.id),
            product_name: "Urea".to_string(),
            presentation_id: None,
            quantity: dec(3),
        };
        let catalog = vec![product];

        let report = check_availability(&catalog, &[request.clone()]);
        assert!(report.ok);

        let report = check_availability(&catalog, &[request.clone(), request]);
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
        match &report.issues[0] {
            AvailabilityIssue::Insufficient(s) => {
                assert_eq!(s.requested, dec(6));
                assert_eq!(s.available, dec(5));
            }
            other => panic!("unexpected issue {:?}", other),
        }
    }

    #[test]
    fn test_draft_exits_chain_snapshots() {
        let product = flat("Urea", 10);
        let id = product.id;
        let request = StockRequest {
            product_id: Some(id),
            product_name: "Urea".to_string(),
            presentation_id: None,
            quantity: dec(3),
        };
        let catalog = vec![product.clone()];
        let drafts = draft_exits(&catalog, &[request.clone(), request], &ExitContext::default(), |_| None).unwrap();
        assert_eq!(drafts[0].new_stock, dec(7));
        assert_eq!(drafts[1].previous_stock, dec(7));
        assert_eq!(drafts[1].new_stock, dec(4));

        let mut ledger = InMemoryLedger::new(vec![product]);
        ledger.record_batch(drafts).unwrap();
        assert_eq!(ledger.available(id, None).unwrap().available, dec(4));
    }

    #[test]
    fn test_low_stock_listing() {
        let ledger = InMemoryLedger::new(vec![flat("Urea", 1), flat("Potasio", 50)]);
        let low: Vec<_> = ledger.low_stock().iter().map(|p| p.name.clone()).collect();
        assert_eq!(low, vec!["Urea".to_string()]);
    }
}
