//! Dosification engine: protocol scaling, availability checks and
//! application planning

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::ledger::{
    check_availability, draft_exits, AvailabilityReport, ExitContext, InMemoryLedger, StockCatalog,
    StockRequest,
};
use crate::models::{
    Dosification, DosificationProduct, DosificationStatus, DosificationProtocol, NewStockMovement, Product, ProductBinding,
    ProtocolProduct, RelatedTo, RelatedType, StockMovement,
};
use crate::types::round2;
use crate::validation::validate_hectares;

/// Protocol-to-inventory binding table.
///
/// Bindings found by name/code matching are also kept in `learned` so the
/// caller can persist them.
#[derive(Debug, Clone, Default)]
pub struct ProtocolBindings {
    bindings: HashMap<String, ProductBinding>,
    learned: Vec<ProductBinding>,
}

impl ProtocolBindings {
    pub fn new(bindings: impl IntoIterator<Item = ProductBinding>) -> Self {
        Self {
            bindings: bindings.into_iter().map(|b| (b.key.clone(), b)).collect(),
            learned: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ProductBinding> {
        self.bindings.get(key)
    }

    pub fn insert(&mut self, binding: ProductBinding) {
        self.bindings.insert(binding.key.clone(), binding);
    }

    fn learn(&mut self, binding: ProductBinding) {
        self.learned.push(binding.clone());
        self.insert(binding);
    }

    /// Bindings discovered since the table was built
    pub fn take_learned(&mut self) -> Vec<ProductBinding> {
        std::mem::take(&mut self.learned)
    }

    pub fn all(&self) -> Vec<&ProductBinding> {
        let mut all: Vec<_> = self.bindings.values().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}

/// Per-hectare quantity scaled to a field
pub fn scale_quantity(quantity_per_hectare: Decimal, hectares: Decimal) -> DomainResult<Decimal> {
    quantity_per_hectare
        .checked_mul(hectares)
        .map(round2)
        .ok_or(DomainError::InvalidHectares(hectares))
}

fn find_match<'a, C: StockCatalog + ?Sized>(catalog: &'a C, item: &ProtocolProduct) -> Option<&'a Product> {
    let by_name = |p: &&Product| p.matches_name_or_code(&item.name, None);
    let by_code = |p: &&Product| p.matches_name_or_code("", item.code.as_deref());

    let mut candidates: Vec<&Product> = catalog.products().filter(by_name).collect();
    if candidates.is_empty() {
        candidates = catalog.products().filter(by_code).collect();
    }
    // Deterministic pick when several products share a name
    candidates.sort_by_key(|p| p.created_at);
    candidates.into_iter().next()
}

fn resolve_line<C: StockCatalog + ?Sized>(
    item: &ProtocolProduct,
    quantity: Decimal,
    catalog: &C,
    bindings: &mut ProtocolBindings,
) -> DosificationProduct {
    let key = item.binding_key();

    if let Some(binding) = bindings.get(&key) {
        if let Some(product) = catalog.product(binding.product_id) {
            let presentation = binding.presentation_id.and_then(|id| product.presentation(id));
            return DosificationProduct {
                product_id: Some(product.id),
                product_name: product.name.clone(),
                presentation_id: presentation.map(|p| p.id),
                quantity,
                unit: presentation.map_or_else(|| product.unit.clone(), |p| p.unit.clone()),
            };
        }
    }

    if let Some(product) = find_match(catalog, item) {
        let presentation = product.presentations.first();
        bindings.learn(ProductBinding {
            key,
            product_id: product.id,
            presentation_id: presentation.map(|p| p.id),
        });
        return DosificationProduct {
            product_id: Some(product.id),
            product_name: product.name.clone(),
            presentation_id: presentation.map(|p| p.id),
            quantity,
            unit: presentation.map_or_else(|| product.unit.clone(), |p| p.unit.clone()),
        };
    }

    DosificationProduct {
        product_id: None,
        product_name: item.name.clone(),
        presentation_id: None,
        quantity,
        unit: item.unit.clone(),
    }
}

/// Scale one protocol stage to `hectares` and bind its products to inventory
pub fn load_from_protocol<C: StockCatalog + ?Sized>(
    protocol: &DosificationProtocol,
    stage_name: &str,
    hectares: Decimal,
    catalog: &C,
    bindings: &mut ProtocolBindings,
) -> DomainResult<Vec<DosificationProduct>> {
    validate_hectares(hectares).map_err(|_| DomainError::InvalidHectares(hectares))?;
    let stage = protocol
        .stage(stage_name)
        .ok_or_else(|| DomainError::NotFound(format!("Stage {} of {}", stage_name, protocol.name)))?;

    let quantities = stage
        .products
        .iter()
        .map(|item| scale_quantity(item.quantity_per_hectare, hectares))
        .collect::<DomainResult<Vec<_>>>()?;

    Ok(stage
        .products
        .iter()
        .zip(quantities)
        .map(|(item, quantity)| resolve_line(item, quantity, catalog, bindings))
        .collect())
}

fn stock_requests(lines: &[DosificationProduct]) -> Vec<StockRequest> {
    lines
        .iter()
        .map(|line| StockRequest {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            presentation_id: line.presentation_id,
            quantity: line.quantity,
        })
        .collect()
}

/// Check every line of a dosification against current stock
pub fn validate_availability<C: StockCatalog + ?Sized>(
    lines: &[DosificationProduct],
    catalog: &C,
) -> AvailabilityReport {
    check_availability(catalog, &stock_requests(lines))
}

/// Validate a dosification and build its exit movements without writing
/// anything.
///
/// Rejects applied dosifications, unbound lines and non-positive quantities,
/// then requires the availability check to pass.
pub fn plan_application<C: StockCatalog + ?Sized>(
    dosification: &Dosification,
    catalog: &C,
    created_by: Option<Uuid>,
) -> DomainResult<Vec<NewStockMovement>> {
    if dosification.status.is_applied() {
        return Err(DomainError::AlreadyApplied(dosification.id));
    }
    if dosification.products.is_empty() {
        return Err(DomainError::validation("products", "At least one product is required"));
    }
    for line in &dosification.products {
        if line.product_id.is_none() {
            return Err(DomainError::UnresolvedProduct(line.product_name.clone()));
        }
        if line.quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(line.product_name.clone()));
        }
    }

    let requests = stock_requests(&dosification.products);
    check_availability(catalog, &requests).into_result()?;

    let context = ExitContext {
        reason: dosification.movement_reason(),
        client_id: Some(dosification.client_id),
        client_name: Some(dosification.client_name.clone()),
        created_by,
    };
    let mut lines = dosification.products.iter();
    draft_exits(catalog, &requests, &context, |_| {
        lines.next().map(|line| RelatedTo {
            kind: RelatedType::Dosification,
            id: Some(dosification.id),
            reference: Some(dosification.movement_reference(line)),
        })
    })
}

/// Apply a dosification against an in-memory ledger
pub fn apply_dosification(
    ledger: &mut InMemoryLedger,
    dosification: &mut Dosification,
    at: DateTime<Utc>,
) -> DomainResult<Vec<StockMovement>> {
    let drafts = plan_application(dosification, ledger.catalog(), None)?;
    let mut next = dosification.clone();
    next.mark_applied(at)?;
    let movements = ledger.record_batch_at(drafts, at)?;
    *dosification = next;
    Ok(movements)
}

/// A dosification due to be applied again
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReapplicationReminder {
    pub dosification_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub crop_type: String,
    pub next_application_date: NaiveDate,
    /// Negative once the date has passed
    pub days_until: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DosificationAlerts {
    /// Pending dosifications created before `now`, never applied
    pub overdue: Vec<Dosification>,
    pub upcoming: Vec<Dosification>,
    /// Applied or completed dosifications with a reapplication date,
    /// soonest first
    pub next_applications: Vec<ReapplicationReminder>,
}

/// Split dosifications into overdue/upcoming pending work and
/// reapplication reminders
pub fn dosification_alerts(dosifications: &[Dosification], now: DateTime<Utc>) -> DosificationAlerts {
    let (overdue, upcoming): (Vec<_>, Vec<_>) = dosifications
        .iter()
        .filter(|d| d.status == DosificationStatus::Pendiente)
        .cloned()
        .partition(|d| d.created_at < now);

    let today = now.date_naive();
    let mut next_applications: Vec<ReapplicationReminder> = dosifications
        .iter()
        .filter(|d| d.status != DosificationStatus::Pendiente)
        .filter_map(|d| {
            let date = d.next_application_date?;
            Some(ReapplicationReminder {
                dosification_id: d.id,
                client_id: d.client_id,
                client_name: d.client_name.clone(),
                crop_type: d.crop_type.clone(),
                next_application_date: date,
                days_until: (date - today).num_days(),
            })
        })
        .collect();
    next_applications.sort_by_key(|r| r.next_application_date);

    DosificationAlerts {
        overdue,
        upcoming,
        next_applications,
    }
}
