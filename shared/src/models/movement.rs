//! Stock movement log models

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult, UnknownVariant};

/// Kind of stock change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Entry,
    Exit,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entry => "entry",
            MovementType::Exit => "exit",
            MovementType::Adjustment => "adjustment",
        }
    }

    /// Signed delta for a positive amount entered on a form
    pub fn signed_delta(&self, amount: Decimal) -> Decimal {
        match self {
            MovementType::Entry => amount.abs(),
            MovementType::Exit => -amount.abs(),
            MovementType::Adjustment => amount,
        }
    }
}

impl FromStr for MovementType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(MovementType::Entry),
            "exit" => Ok(MovementType::Exit),
            "adjustment" => Ok(MovementType::Adjustment),
            _ => Err(UnknownVariant::new("movement type", s)),
        }
    }
}

/// What caused a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedType {
    Dosification,
    Order,
    Purchase,
    Manual,
}

impl RelatedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedType::Dosification => "dosification",
            RelatedType::Order => "order",
            RelatedType::Purchase => "purchase",
            RelatedType::Manual => "manual",
        }
    }
}

impl FromStr for RelatedType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dosification" => Ok(RelatedType::Dosification),
            "order" => Ok(RelatedType::Order),
            "purchase" => Ok(RelatedType::Purchase),
            "manual" => Ok(RelatedType::Manual),
            _ => Err(UnknownVariant::new("related type", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedTo {
    #[serde(rename = "type")]
    pub kind: RelatedType,
    pub id: Option<Uuid>,
    pub reference: Option<String>,
}

/// An entry in the append-only movement log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub presentation_id: Option<Uuid>,
    pub presentation_label: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Signed delta, negative for exits
    pub quantity: Decimal,
    pub previous_stock: Decimal,
    pub new_stock: Decimal,
    pub reason: String,
    pub related_to: Option<RelatedTo>,
    pub client_id: Option<Uuid>,
    pub client_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl StockMovement {
    /// Consumed amount as a positive number
    pub fn consumed_quantity(&self) -> Decimal {
        self.quantity.abs()
    }

    pub fn is_exit(&self) -> bool {
        self.movement_type == MovementType::Exit
    }
}

/// A movement about to be recorded, with the stock snapshot it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStockMovement {
    pub product_id: Uuid,
    pub presentation_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub previous_stock: Decimal,
    pub new_stock: Decimal,
    pub reason: String,
    pub related_to: Option<RelatedTo>,
    pub client_id: Option<Uuid>,
    pub client_name: Option<String>,
    pub created_by: Option<Uuid>,
}

impl NewStockMovement {
    /// Check the draft is internally consistent: the sign matches the type and
    /// `new_stock == previous_stock + quantity`. A negative result is refused
    /// later, against the stored stock, by `ledger::apply_movement`.
    pub fn check_snapshot(&self, product_name: &str) -> DomainResult<()> {
        let sign_ok = match self.movement_type {
            MovementType::Entry => self.quantity > Decimal::ZERO,
            MovementType::Exit => self.quantity < Decimal::ZERO,
            MovementType::Adjustment => !self.quantity.is_zero(),
        };
        if !sign_ok {
            return Err(DomainError::InvalidQuantity(product_name.to_string()));
        }
        if self.previous_stock.checked_add(self.quantity) != Some(self.new_stock) {
            return Err(DomainError::SnapshotMismatch(format!(
                "{}: {} + {} != {}",
                product_name, self.previous_stock, self.quantity, self.new_stock
            )));
        }
        Ok(())
    }

    /// Materialize the draft into a log entry
    pub fn into_movement(
        self,
        product_name: &str,
        presentation_label: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4(),
            product_id: self.product_id,
            product_name: product_name.to_string(),
            presentation_id: self.presentation_id,
            presentation_label,
            movement_type: self.movement_type,
            quantity: self.quantity,
            previous_stock: self.previous_stock,
            new_stock: self.new_stock,
            reason: self.reason,
            related_to: self.related_to,
            client_id: self.client_id,
            client_name: self.client_name,
            timestamp,
            created_by: self.created_by,
        }
    }
}

const CLIENT_MARKER: &str = " - Cliente: ";

/// Extract the client name from a legacy reference such as
/// `"Dosificación 42 - Cliente: Finca X - 25 L"`
pub fn parse_client_reference(reference: &str) -> Option<&str> {
    let (_, rest) = reference.split_once(CLIENT_MARKER)?;
    let name = rest.split(" - ").next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stored_labels() {
        assert_eq!("exit".parse::<MovementType>(), Ok(MovementType::Exit));
        assert_eq!("dosification".parse::<RelatedType>(), Ok(RelatedType::Dosification));
        assert!("salida".parse::<MovementType>().is_err());
    }

    fn draft(movement_type: MovementType, quantity: i64, previous: i64, new: i64) -> NewStockMovement {
        NewStockMovement {
            product_id: Uuid::new_v4(),
            presentation_id: None,
            movement_type,
            quantity: Decimal::from(quantity),
            previous_stock: Decimal::from(previous),
            new_stock: Decimal::from(new),
            reason: "test".to_string(),
            related_to: None,
            client_id: None,
            client_name: None,
            created_by: None,
        }
    }

    #[test]
    fn test_parse_client_reference() {
        assert_eq!(
            parse_client_reference("Dosificación abc - Cliente: Finca X - 25 L"),
            Some("Finca X")
        );
        assert_eq!(parse_client_reference("Dosificación abc - Cliente: Finca Y"), Some("Finca Y"));
        assert_eq!(parse_client_reference("Compra proveedor"), None);
        assert_eq!(parse_client_reference("x - Cliente:  - 3 L"), None);
    }

    #[test]
    fn test_snapshot_checks() {
        assert!(draft(MovementType::Exit, -3, 10, 7).check_snapshot("P").is_ok());
        assert!(draft(MovementType::Entry, 3, 10, 13).check_snapshot("P").is_ok());
        assert!(matches!(
            draft(MovementType::Exit, 3, 10, 13).check_snapshot("P"),
            Err(DomainError::InvalidQuantity(_))
        ));
        assert!(matches!(
            draft(MovementType::Exit, -3, 10, 8).check_snapshot("P"),
            Err(DomainError::SnapshotMismatch(_))
        ));
    }

    #[test]
    fn test_signed_delta() {
        assert_eq!(MovementType::Exit.signed_delta(Decimal::from(4)), Decimal::from(-4));
        assert_eq!(MovementType::Entry.signed_delta(Decimal::from(-4)), Decimal::from(4));
        assert_eq!(MovementType::Adjustment.signed_delta(Decimal::from(-4)), Decimal::from(-4));
    }
}
