//! Dosification protocols and their binding to inventory products

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosificationProtocol {
    pub id: Uuid,
    pub name: String,
    pub crop: Option<String>,
    pub stages: Vec<ProtocolStage>,
    pub created_at: DateTime<Utc>,
}

impl DosificationProtocol {
    /// Look up a stage by name, ignoring case and surrounding whitespace
    pub fn stage(&self, name: &str) -> Option<&ProtocolStage> {
        let wanted = name.trim().to_lowercase();
        self.stages.iter().find(|s| s.name.trim().to_lowercase() == wanted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStage {
    pub name: String,
    pub products: Vec<ProtocolProduct>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolProduct {
    pub code: Option<String>,
    pub name: String,
    pub quantity_per_hectare: Decimal,
    pub unit: String,
    pub price: Option<Decimal>,
}

impl ProtocolProduct {
    /// Key into the binding table: normalized code when present, otherwise the
    /// normalized name
    pub fn binding_key(&self) -> String {
        match self.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => format!("code:{}", normalize_key(code)),
            _ => format!("name:{}", normalize_key(&self.name)),
        }
    }
}

/// Lowercase and collapse inner whitespace
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Explicit mapping from a protocol product to an inventory product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBinding {
    pub key: String,
    pub product_id: Uuid,
    pub presentation_id: Option<Uuid>,
}
