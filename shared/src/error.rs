//! Domain errors raised by the ledger, the dosification engine and order
//! processing

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A single line that asks for more than is in stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockShortfall {
    pub product_id: Uuid,
    pub product_name: String,
    pub presentation_id: Option<Uuid>,
    pub requested: Decimal,
    pub available: Decimal,
    pub unit: String,
}

impl std::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: requested {} {}, available {} {}",
            self.product_name, self.requested, self.unit, self.available, self.unit
        )
    }
}

fn summarize(shortfalls: &[StockShortfall]) -> String {
    shortfalls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A label that names none of an enum's variants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Domain error taxonomy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Hectares must be a positive number, got {0}")]
    InvalidHectares(Decimal),

    #[error("Quantity for {0} must be positive")]
    InvalidQuantity(String),

    #[error("Insufficient stock: {}", summarize(.0))]
    InsufficientStock(Vec<StockShortfall>),

    #[error("Product {0} is not bound to an inventory product")]
    UnresolvedProduct(String),

    #[error("Product {0} has several presentations; one must be selected")]
    PresentationRequired(String),

    #[error("Dosification {0} has already been applied")]
    AlreadyApplied(Uuid),

    #[error("Cannot move from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Stock changed since it was read (expected {expected}, found {actual})")]
    StaleStock { expected: Decimal, actual: Decimal },

    #[error("Inconsistent movement snapshot: {0}")]
    SnapshotMismatch(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{field}: {message}")]
    Validation { field: String, message: String },
}

impl DomainError {
    pub fn validation(field: &str, message: &str) -> Self {
        DomainError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
