//! Dosification (application plan) models

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult, UnknownVariant};
use crate::types::round2;

/// Lifecycle of a dosification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DosificationStatus {
    Pendiente,
    Aplicada,
    Completada,
}

impl DosificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DosificationStatus::Pendiente => "Pendiente",
            DosificationStatus::Aplicada => "Aplicada",
            DosificationStatus::Completada => "Completada",
        }
    }

    /// Stock has already been consumed for this dosification
    pub fn is_applied(&self) -> bool {
        matches!(self, DosificationStatus::Aplicada | DosificationStatus::Completada)
    }

    pub fn can_transition_to(&self, next: DosificationStatus) -> bool {
        matches!(
            (self, next),
            (DosificationStatus::Pendiente, DosificationStatus::Aplicada)
                | (DosificationStatus::Aplicada, DosificationStatus::Completada)
        )
    }
}

impl FromStr for DosificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pendiente" => Ok(DosificationStatus::Pendiente),
            "Aplicada" => Ok(DosificationStatus::Aplicada),
            "Completada" => Ok(DosificationStatus::Completada),
            _ => Err(UnknownVariant::new("dosification status", s)),
        }
    }
}

/// A line of a dosification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosificationProduct {
    /// `None` while the line is not bound to an inventory product
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub presentation_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit: String,
}

/// Protocol and stage a dosification was loaded from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSource {
    pub protocol_id: Uuid,
    pub stage_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dosification {
    pub id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub hectares: Decimal,
    pub crop_type: String,
    pub products: Vec<DosificationProduct>,
    pub notes: Option<String>,
    pub protocol: Option<ProtocolSource>,
    pub status: DosificationStatus,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub next_application_date: Option<NaiveDate>,
}

impl Dosification {
    fn transition(&mut self, next: DosificationStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Flip `Pendiente -> Aplicada`
    pub fn mark_applied(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status.is_applied() {
            return Err(DomainError::AlreadyApplied(self.id));
        }
        self.transition(DosificationStatus::Aplicada)?;
        self.applied_at = Some(at);
        Ok(())
    }

    /// Flip `Aplicada -> Completada`
    pub fn mark_completed(&mut self) -> DomainResult<()> {
        self.transition(DosificationStatus::Completada)
    }

    pub fn movement_reason(&self) -> String {
        format!("Dosificación aplicada - Cliente: {}", self.client_name)
    }

    pub fn movement_reference(&self, line: &DosificationProduct) -> String {
        format!(
            "Dosificación {} - Cliente: {} - {} {}",
            self.id, self.client_name, line.quantity, line.unit
        )
    }

    /// Quantity per hectare for display
    pub fn dose_per_hectare(&self, line: &DosificationProduct) -> DomainResult<Decimal> {
        dose_per_hectare(line.quantity, self.hectares)
    }
}

/// `quantity / hectares` rounded to 2 decimals; non-positive hectares are
/// treated as one
pub fn dose_per_hectare(quantity: Decimal, hectares: Decimal) -> DomainResult<Decimal> {
    let divisor = if hectares > Decimal::ZERO { hectares } else { Decimal::ONE };
    quantity
        .checked_div(divisor)
        .map(round2)
        .ok_or(DomainError::InvalidHectares(hectares))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dosification(status: DosificationStatus) -> Dosification {
        Dosification {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Finca X".to_string(),
            hectares: Decimal::from(4),
            crop_type: "Aguacate".to_string(),
            products: vec![],
            notes: None,
            protocol: None,
            status,
            created_at: Utc::now(),
            applied_at: None,
            next_application_date: None,
        }
    }

    #[test]
    fn test_status_flow() {
        let mut d = dosification(DosificationStatus::Pendiente);
        assert!(d.mark_completed().is_err());
        d.mark_applied(Utc::now()).unwrap();
        assert_eq!(d.status, DosificationStatus::Aplicada);
        assert!(d.applied_at.is_some());
        assert_eq!(d.mark_applied(Utc::now()), Err(DomainError::AlreadyApplied(d.id)));
        d.mark_completed().unwrap();
        assert_eq!(d.status, DosificationStatus::Completada);
        assert!(matches!(d.mark_applied(Utc::now()), Err(DomainError::AlreadyApplied(_))));
    }

    #[test]
    fn test_reference_carries_client_name() {
        let d = dosification(DosificationStatus::Pendiente);
        let line = DosificationProduct {
            product_id: None,
            product_name: "Urea".to_string(),
            presentation_id: None,
            quantity: Decimal::new(2500, 2),
            unit: "kg".to_string(),
        };
        let reference = d.movement_reference(&line);
        assert_eq!(
            crate::models::parse_client_reference(&reference),
            Some("Finca X")
        );
        assert!(reference.ends_with("25.00 kg"));
    }

    #[test]
    fn test_dose_per_hectare() {
        assert_eq!(dose_per_hectare(Decimal::from(10), Decimal::from(3)).unwrap(), Decimal::new(333, 2));
        assert_eq!(dose_per_hectare(Decimal::from(10), Decimal::ZERO).unwrap(), Decimal::from(10));
        assert!(matches!(
            dose_per_hectare(Decimal::MAX, Decimal::new(1, 10)),
            Err(DomainError::InvalidHectares(_))
        ));
    }
}
