//! WebAssembly module for the agro-input inventory
//!
//! Provides client-side computation for:
//! - Protocol dose scaling
//! - Stock status classification
//! - Discount tiers from the PVP
//! - Dosification stock pre-checks against a cached catalog

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

use shared::dosing::{scale_quantity, validate_availability};

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&JsValue::from_str("agro-inventory wasm loaded"));
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::ZERO)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Scale a per-hectare protocol dose to a field, rounded to 2 decimals.
/// Returns 0 when the product does not fit a decimal.
#[wasm_bindgen]
pub fn scale_protocol_quantity(quantity_per_hectare: f64, hectares: f64) -> f64 {
    scale_quantity(to_decimal(quantity_per_hectare), to_decimal(hectares))
        .map(to_f64)
        .unwrap_or(0.0)
}

/// Dose per hectare of a dosification line
#[wasm_bindgen]
pub fn calculate_dose_per_hectare(quantity: f64, hectares: f64) -> f64 {
    dose_per_hectare(to_decimal(quantity), to_decimal(hectares))
        .map(to_f64)
        .unwrap_or(0.0)
}

/// Stock status label: critical, low, normal or high
#[wasm_bindgen]
pub fn classify_stock_level(current: f64, min: f64, max: Option<f64>) -> String {
    let level = StockLevel::new(to_decimal(current), to_decimal(min), max.map(to_decimal));
    match classify_stock(&level) {
        StockStatus::Critical => "critical",
        StockStatus::Low => "low",
        StockStatus::Normal => "normal",
        StockStatus::High => "high",
    }
    .to_string()
}

/// Discount tiers for a PVP as JSON
#[wasm_bindgen]
pub fn price_discounts(pvp: f64) -> Result<String, JsValue> {
    serde_json::to_string(&PriceDiscounts::from_pvp(to_decimal(pvp)))
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn availability_json(lines_json: &str, products_json: &str) -> Result<String, String> {
    let lines: Vec<DosificationProduct> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;
    let products: Vec<Product> =
        serde_json::from_str(products_json).map_err(|e| format!("Invalid products JSON: {}", e))?;

    let report = validate_availability(&lines, &products);
    serde_json::to_string(&report).map_err(|e| format!("Serialization error: {}", e))
}

/// Check dosification lines against a product list, returning the
/// availability report as JSON
#[wasm_bindgen]
pub fn check_dosification_stock(lines_json: &str, products_json: &str) -> Result<String, JsValue> {
    availability_json(lines_json, products_json).map_err(|e| JsValue::from_str(&e))
}

/// Validate hectares entered in a form
#[wasm_bindgen]
pub fn is_valid_hectares(hectares: f64) -> bool {
    validate_hectares(to_decimal(hectares)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_scale_protocol_quantity() {
        assert!((scale_protocol_quantity(2.5, 3.0) - 7.5).abs() < 0.001);
        assert!((scale_protocol_quantity(1.333, 3.0) - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_dose_per_hectare_guards_zero() {
        assert!((calculate_dose_per_hectare(10.0, 4.0) - 2.5).abs() < 0.001);
        assert!((calculate_dose_per_hectare(10.0, 0.0) - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_classify_stock_level() {
        assert_eq!(classify_stock_level(2.0, 10.0, None), "critical");
        assert_eq!(classify_stock_level(8.0, 10.0, None), "low");
        assert_eq!(classify_stock_level(50.0, 10.0, Some(100.0)), "normal");
        assert_eq!(classify_stock_level(120.0, 10.0, Some(100.0)), "high");
    }

    #[test]
    fn test_hectares_validation() {
        assert!(is_valid_hectares(1.5));
        assert!(!is_valid_hectares(0.0));
        assert!(!is_valid_hectares(-2.0));
    }

    #[test]
    fn test_availability_json_reports_shortfall() {
        let product = Product::with_flat_stock(
            Uuid::new_v4(),
            "Urea",
            ProductCategory::Fertilizer,
            "kg",
            StockLevel::new(Decimal::from(5), Decimal::ZERO, None),
            Utc::now(),
        );
        let lines = vec![DosificationProduct {
            product_id: Some(product.id),
            product_name: "Urea".to_string(),
            presentation_id: None,
            quantity: Decimal::from(8),
            unit: "kg".to_string(),
        }];

        let json = availability_json(
            &serde_json::to_string(&lines).unwrap(),
            &serde_json::to_string(&vec![product]).unwrap(),
        )
        .unwrap();
        let report: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(report["ok"], false);
        assert_eq!(report["issues"].as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_availability_json_rejects_garbage() {
        assert!(availability_json("not json", "[]").is_err());
    }
}
