//! Product and presentation models
//!
//! Stock always lives on presentations. A product sold in bulk only has a
//! single implicit default presentation; the flat `current/min/max` figures
//! are derived from the presentations and never stored independently.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult, UnknownVariant};
use crate::types::{round2, saturating_sum};

/// Product categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    #[serde(rename = "Fertilizante")]
    Fertilizer,
    #[serde(rename = "Insecticida")]
    Insecticide,
    #[serde(rename = "Fungicida")]
    Fungicide,
    #[serde(rename = "Herbicida")]
    Herbicide,
    #[serde(rename = "Bioestimulante")]
    Biostimulant,
    #[serde(rename = "Otro")]
    Other,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Fertilizer => "Fertilizante",
            ProductCategory::Insecticide => "Insecticida",
            ProductCategory::Fungicide => "Fungicida",
            ProductCategory::Herbicide => "Herbicida",
            ProductCategory::Biostimulant => "Bioestimulante",
            ProductCategory::Other => "Otro",
        }
    }
}

impl FromStr for ProductCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Fertilizante" => Ok(ProductCategory::Fertilizer),
            "Insecticida" => Ok(ProductCategory::Insecticide),
            "Fungicida" => Ok(ProductCategory::Fungicide),
            "Herbicida" => Ok(ProductCategory::Herbicide),
            "Bioestimulante" => Ok(ProductCategory::Biostimulant),
            "Otro" => Ok(ProductCategory::Other),
            _ => Err(UnknownVariant::new("product category", s)),
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stock triple for a presentation (or the derived product view)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub current: Decimal,
    pub min: Decimal,
    pub max: Option<Decimal>,
}

impl StockLevel {
    pub fn new(current: Decimal, min: Decimal, max: Option<Decimal>) -> Self {
        Self { current, min, max }
    }

    pub fn empty() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO, None)
    }
}

/// Stock health of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Critical,
    Low,
    Normal,
    High,
}

/// Classify a stock level
pub fn classify_stock(level: &StockLevel) -> StockStatus {
    if level.current <= level.min * Decimal::new(5, 1) {
        StockStatus::Critical
    } else if level.current <= level.min {
        StockStatus::Low
    } else if matches!(level.max, Some(max) if level.current >= max) {
        StockStatus::High
    } else {
        StockStatus::Normal
    }
}

/// Discounted prices derived from the PVP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDiscounts {
    pub d10: Decimal,
    pub d15: Decimal,
    pub d20: Decimal,
    pub d25: Decimal,
    pub d35: Decimal,
}

impl PriceDiscounts {
    pub fn from_pvp(pvp: Decimal) -> Self {
        let tier = |pct: i64| round2(pvp * Decimal::new(100 - pct, 2));
        Self {
            d10: tier(10),
            d15: tier(15),
            d20: tier(20),
            d25: tier(25),
            d35: tier(35),
        }
    }
}

/// A sellable package of a product (e.g. "20L drum")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub id: Uuid,
    pub label: String,
    pub unit: String,
    /// Price per presentation (P.V.P.)
    pub pvp: Decimal,
    pub stock: StockLevel,
    pub sku: Option<String>,
    /// Implicit presentation standing in for legacy flat stock
    #[serde(default)]
    pub is_default: bool,
}

impl Presentation {
    /// Implicit presentation for a product without real packages
    pub fn implicit(unit: &str, stock: StockLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: unit.to_string(),
            unit: unit.to_string(),
            pvp: Decimal::ZERO,
            stock,
            sku: None,
            is_default: true,
        }
    }

    pub fn discounts(&self) -> PriceDiscounts {
        PriceDiscounts::from_pvp(self.pvp)
    }
}

/// Available quantity for a product or presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub available: Decimal,
    pub unit: String,
}

/// An inventory product
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub category: ProductCategory,
    /// Base unit of measure
    pub unit: String,
    pub cost_per_unit: Option<Decimal>,
    pub supplier: Option<String>,
    pub presentations: Vec<Presentation>,
    pub created_at: DateTime<Utc>,
    pub last_restock_date: Option<DateTime<Utc>>,
}

impl Product {
    /// Build a product from the legacy flat stock fields
    pub fn with_flat_stock(
        id: Uuid,
        name: &str,
        category: ProductCategory,
        unit: &str,
        stock: StockLevel,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            code: None,
            category,
            unit: unit.to_string(),
            cost_per_unit: None,
            supplier: None,
            presentations: vec![Presentation::implicit(unit, stock)],
            created_at,
            last_restock_date: None,
        }
    }

    /// Derived flat stock: sums of current and min; max only when every
    /// presentation defines one
    pub fn stock_summary(&self) -> StockLevel {
        let current = saturating_sum(self.presentations.iter().map(|p| p.stock.current));
        let min = saturating_sum(self.presentations.iter().map(|p| p.stock.min));
        let max = if self.presentations.iter().all(|p| p.stock.max.is_some()) {
            Some(saturating_sum(self.presentations.iter().filter_map(|p| p.stock.max)))
        } else {
            None
        };
        StockLevel { current, min, max }
    }

    pub fn stock_status(&self) -> StockStatus {
        classify_stock(&self.stock_summary())
    }

    pub fn unit_cost(&self) -> Decimal {
        self.cost_per_unit.unwrap_or(Decimal::ZERO)
    }

    pub fn presentation(&self, presentation_id: Uuid) -> Option<&Presentation> {
        self.presentations.iter().find(|p| p.id == presentation_id)
    }

    pub fn presentation_mut(&mut self, presentation_id: Uuid) -> Option<&mut Presentation> {
        self.presentations.iter_mut().find(|p| p.id == presentation_id)
    }

    /// Pick the presentation a stock change applies to
    pub fn resolve_presentation(&self, presentation_id: Option<Uuid>) -> DomainResult<&Presentation> {
        match presentation_id {
            Some(id) => self
                .presentation(id)
                .ok_or_else(|| DomainError::NotFound(format!("Presentation {} of {}", id, self.name))),
            None => match self.presentations.as_slice() {
                [only] => Ok(only),
                [] => Err(DomainError::NotFound(format!("Presentation of {}", self.name))),
                _ => Err(DomainError::PresentationRequired(self.name.clone())),
            },
        }
    }

    /// Available stock for one presentation, or for the whole product in its
    /// base unit
    pub fn available(&self, presentation_id: Option<Uuid>) -> DomainResult<Availability> {
        match presentation_id {
            Some(id) => {
                let presentation = self.resolve_presentation(Some(id))?;
                Ok(Availability {
                    available: presentation.stock.current,
                    unit: presentation.unit.clone(),
                })
            }
            None => Ok(Availability {
                available: self.stock_summary().current,
                unit: self.unit.clone(),
            }),
        }
    }

    /// Case-insensitive comparison against the name or the code
    pub fn matches_name_or_code(&self, name: &str, code: Option<&str>) -> bool {
        if self.name.trim().to_lowercase() == name.trim().to_lowercase() {
            return true;
        }
        match (self.code.as_deref(), code) {
            (Some(own), Some(other)) if !own.trim().is_empty() && !other.trim().is_empty() => {
                own.trim().to_lowercase() == other.trim().to_lowercase()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_category_labels_round_trip() {
        for category in [
            ProductCategory::Fertilizer,
            ProductCategory::Insecticide,
            ProductCategory::Fungicide,
            ProductCategory::Herbicide,
            ProductCategory::Biostimulant,
            ProductCategory::Other,
        ] {
            assert_eq!(category.as_str().parse::<ProductCategory>(), Ok(category));
        }
        let err = "fertilizante".parse::<ProductCategory>().unwrap_err();
        assert_eq!(err.value, "fertilizante");
    }

    fn presentation(current: i64, min: i64, max: Option<i64>) -> Presentation {
        Presentation {
            id: Uuid::new_v4(),
            label: "20L".to_string(),
            unit: "L".to_string(),
            pvp: dec(100),
            stock: StockLevel::new(dec(current), dec(min), max.map(dec)),
            sku: None,
            is_default: false,
        }
    }

    fn product(presentations: Vec<Presentation>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Nitrofoska".to_string(),
            code: Some("NF-01".to_string()),
            category: ProductCategory::Fertilizer,
            unit: "L".to_string(),
            cost_per_unit: Some(dec(10)),
            supplier: None,
            presentations,
            created_at: Utc::now(),
            last_restock_date: None,
        }
    }

    #[test]
    fn test_summary_max_requires_every_presentation() {
        let p = product(vec![presentation(5, 1, Some(10)), presentation(3, 2, None)]);
        let summary = p.stock_summary();
        assert_eq!(summary.current, dec(8));
        assert_eq!(summary.min, dec(3));
        assert_eq!(summary.max, None);

        let p = product(vec![presentation(5, 1, Some(10)), presentation(3, 2, Some(6))]);
        assert_eq!(p.stock_summary().max, Some(dec(16)));
    }

    #[test]
    fn test_stock_status_thresholds() {
        assert_eq!(classify_stock(&StockLevel::new(dec(5), dec(10), None)), StockStatus::Critical);
        assert_eq!(classify_stock(&StockLevel::new(dec(8), dec(10), None)), StockStatus::Low);
        assert_eq!(classify_stock(&StockLevel::new(dec(20), dec(10), Some(dec(20)))), StockStatus::High);
        assert_eq!(classify_stock(&StockLevel::new(dec(15), dec(10), Some(dec(20)))), StockStatus::Normal);
    }

    #[test]
    fn test_resolve_presentation() {
        let single = product(vec![presentation(5, 0, None)]);
        assert!(single.resolve_presentation(None).is_ok());

        let multi = product(vec![presentation(5, 0, None), presentation(2, 0, None)]);
        assert!(matches!(
            multi.resolve_presentation(None),
            Err(DomainError::PresentationRequired(_))
        ));
        assert!(matches!(
            multi.resolve_presentation(Some(Uuid::new_v4())),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn test_available_without_presentation_sums_in_base_unit() {
        let p = product(vec![presentation(5, 0, None), presentation(2, 0, None)]);
        let availability = p.available(None).unwrap();
        assert_eq!(availability.available, dec(7));
        assert_eq!(availability.unit, "L");

        let first = p.presentations[0].id;
        assert_eq!(p.available(Some(first)).unwrap().available, dec(5));
    }

    #[test]
    fn test_flat_stock_product_gets_implicit_presentation() {
        let p = Product::with_flat_stock(
            Uuid::new_v4(),
            "Urea",
            ProductCategory::Fertilizer,
            "kg",
            StockLevel::new(dec(40), dec(10), None),
            Utc::now(),
        );
        assert_eq!(p.presentations.len(), 1);
        assert!(p.presentations[0].is_default);
        assert_eq!(p.stock_summary().current, dec(40));
    }

    #[test]
    fn test_discount_tiers() {
        let discounts = PriceDiscounts::from_pvp(Decimal::new(1999, 2));
        assert_eq!(discounts.d10, Decimal::new(1799, 2));
        assert_eq!(discounts.d35, Decimal::new(1299, 2));
    }

    #[test]
    fn test_match_by_name_or_code() {
        let p = product(vec![]);
        assert!(p.matches_name_or_code("  NITROFOSKA ", None));
        assert!(p.matches_name_or_code("Other name", Some("nf-01")));
        assert!(!p.matches_name_or_code("Other name", Some("")));
    }
}
