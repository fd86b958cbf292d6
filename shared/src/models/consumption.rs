//! Consumption report rows

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProductCategory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProductConsumption {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: Decimal,
    pub value: Decimal,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionByClient {
    pub client_id: Uuid,
    pub client_name: String,
    pub total_quantity: Decimal,
    pub total_value: Decimal,
    pub movement_count: u64,
    pub products: Vec<ClientProductConsumption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionByProduct {
    pub product_id: Uuid,
    pub product_name: String,
    pub category: ProductCategory,
    pub total_quantity: Decimal,
    pub total_value: Decimal,
    pub unit: String,
    pub client_count: u64,
    pub movement_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionByCategory {
    pub category: ProductCategory,
    pub total_quantity: Decimal,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub quantity: Decimal,
    pub value: Decimal,
    pub movement_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionTotals {
    pub total_value: Decimal,
    pub movement_count: u64,
    pub active_clients: u64,
    pub products_used: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionReport {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
    pub by_client: Vec<ConsumptionByClient>,
    pub by_product: Vec<ConsumptionByProduct>,
    pub by_category: Vec<ConsumptionByCategory>,
    pub time_series: Vec<TimeSeriesPoint>,
    pub totals: ConsumptionTotals,
}
