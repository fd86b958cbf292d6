//! Consumption aggregator: read-only rollups of exit movements by client,
//! product, category and time bucket
//!
//! All computations are pure. Day boundaries are taken in UTC.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::StockCatalog;
use crate::models::{
    parse_client_reference, Client, ClientProductConsumption, ClientStatus, ConsumptionByCategory,
    ConsumptionByClient, ConsumptionByProduct, ConsumptionReport, ConsumptionTotals, Granularity,
    ProductCategory, RelatedType, StockMovement, TimeSeriesPoint,
};
use crate::types::{round2, DateRange};

/// Reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "period", rename_all = "snake_case")]
pub enum Period {
    Week,
    Month,
    Quarter,
    Year,
    Custom {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    AllTime,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}

fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

fn start_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

fn start_of_quarter(date: NaiveDate) -> NaiveDate {
    let month = start_of_month(date);
    month
        .checked_sub_months(Months::new(date.month0() % 3))
        .unwrap_or(month)
}

fn start_of_year(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.ordinal0()))
}

impl Period {
    /// Interval covered by the period at `now`; `None` for all-time
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<DateRange> {
        let today = now.date_naive();
        let (start, end) = match *self {
            Period::Week => (start_of_day(start_of_week(today)), now),
            Period::Month => (start_of_day(start_of_month(today)), now),
            Period::Quarter => (start_of_day(start_of_quarter(today)), now),
            Period::Year => (start_of_day(start_of_year(today)), now),
            Period::Custom { start, end } => (
                start.map_or_else(|| start_of_day(start_of_month(today)), start_of_day),
                end.map_or(now, end_of_day),
            ),
            Period::AllTime => return None,
        };
        Some(DateRange { start, end })
    }

    pub fn from_query(name: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Self> {
        match name {
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            "quarter" => Some(Period::Quarter),
            "year" => Some(Period::Year),
            "custom" => Some(Period::Custom { start, end }),
            "all" => Some(Period::AllTime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionFilter {
    pub period: Period,
    pub client_id: Option<Uuid>,
    pub category: Option<ProductCategory>,
    pub include_inactive: bool,
}

impl Default for ConsumptionFilter {
    fn default() -> Self {
        Self {
            period: Period::Month,
            client_id: None,
            category: None,
            include_inactive: false,
        }
    }
}

/// Client registry indexed for attribution
#[derive(Debug, Clone, Default)]
pub struct ClientDirectory {
    by_id: HashMap<Uuid, Client>,
    by_name: HashMap<String, Uuid>,
}

impl ClientDirectory {
    pub fn new(clients: impl IntoIterator<Item = Client>) -> Self {
        let mut directory = Self::default();
        for client in clients {
            directory
                .by_name
                .entry(client.name.trim().to_lowercase())
                .or_insert(client.id);
            directory.by_id.insert(client.id, client);
        }
        directory
    }

    pub fn get(&self, id: Uuid) -> Option<&Client> {
        self.by_id.get(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Client> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .and_then(|id| self.by_id.get(id))
    }
}

/// Client a movement is attributed to
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub client_id: Uuid,
    pub client_name: String,
}

/// Client name embedded in the reference of an older dosification movement
fn legacy_client_name(movement: &StockMovement) -> Option<&str> {
    let related = movement.related_to.as_ref()?;
    if related.kind != RelatedType::Dosification {
        return None;
    }
    parse_client_reference(related.reference.as_deref()?)
}

/// Attribute a movement to a client.
///
/// Uses the explicit client id, and for dosification movements written
/// before it existed falls back to the name embedded in the reference.
pub fn attribute_client(movement: &StockMovement, directory: &ClientDirectory) -> Option<Attribution> {
    if let Some(client_id) = movement.client_id {
        let client_name = directory
            .get(client_id)
            .map(|c| c.name.clone())
            .or_else(|| movement.client_name.clone())
            .unwrap_or_default();
        return Some(Attribution {
            client_id,
            client_name,
        });
    }

    let name = legacy_client_name(movement)?;
    directory.find_by_name(name).map(|client| Attribution {
        client_id: client.id,
        client_name: client.name.clone(),
    })
}

/// Exit movements matching the filter
pub fn filter_movements<'a, C: StockCatalog + ?Sized>(
    movements: &'a [StockMovement],
    filter: &ConsumptionFilter,
    now: DateTime<Utc>,
    catalog: &C,
    directory: &ClientDirectory,
) -> Vec<&'a StockMovement> {
    let range = filter.period.bounds(now);
    movements
        .iter()
        .filter(|m| m.is_exit())
        .filter(|m| range.map_or(true, |r| r.contains(m.timestamp)))
        .filter(|m| match filter.client_id {
            // Movements naming no client at all are kept; a name that is
            // no longer in the registry matches nobody.
            Some(wanted) => match attribute_client(m, directory) {
                Some(attribution) => attribution.client_id == wanted,
                None => m.client_id.is_none() && legacy_client_name(m).is_none(),
            },
            None => true,
        })
        .filter(|m| match filter.category {
            Some(category) => catalog
                .product(m.product_id)
                .is_some_and(|p| p.category == category),
            None => true,
        })
        .collect()
}

fn movement_value<C: StockCatalog + ?Sized>(catalog: &C, movement: &StockMovement) -> Decimal {
    let cost = catalog
        .product(movement.product_id)
        .map_or(Decimal::ZERO, |p| p.unit_cost());
    cost.saturating_mul(movement.consumed_quantity())
}

/// Consumption per client, highest value first
pub fn aggregate_by_client<C: StockCatalog + ?Sized>(
    movements: &[&StockMovement],
    catalog: &C,
    directory: &ClientDirectory,
    include_inactive: bool,
) -> Vec<ConsumptionByClient> {
    let mut rows: Vec<ConsumptionByClient> = Vec::new();

    for movement in movements {
        let Some(attribution) = attribute_client(movement, directory) else {
            continue;
        };
        let inactive = directory
            .get(attribution.client_id)
            .is_some_and(|c| c.status == ClientStatus::Inactivo);
        if inactive && !include_inactive {
            continue;
        }

        let quantity = movement.consumed_quantity();
        let value = movement_value(catalog, movement);
        let unit = catalog
            .product(movement.product_id)
            .map_or_else(String::new, |p| p.unit.clone());

        let row = match rows.iter().position(|r| r.client_id == attribution.client_id) {
            Some(index) => &mut rows[index],
            None => {
                rows.push(ConsumptionByClient {
                    client_id: attribution.client_id,
                    client_name: attribution.client_name,
                    total_quantity: Decimal::ZERO,
                    total_value: Decimal::ZERO,
                    movement_count: 0,
                    products: Vec::new(),
                });
                let last = rows.len() - 1;
                &mut rows[last]
            }
        };
        row.total_quantity += quantity;
        row.total_value += value;
        row.movement_count += 1;

        match row.products.iter_mut().find(|p| p.product_id == movement.product_id) {
            Some(product) => {
                product.quantity += quantity;
                product.value += value;
            }
            None => row.products.push(ClientProductConsumption {
                product_id: movement.product_id,
                product_name: movement.product_name.clone(),
                quantity,
                value,
                unit,
            }),
        }
    }

    for row in &mut rows {
        row.products.sort_by(|a, b| b.value.cmp(&a.value));
    }
    rows.sort_by(|a, b| b.total_value.cmp(&a.total_value));
    rows
}

/// Consumption per product, highest quantity first; products missing from
/// the catalog are skipped
pub fn aggregate_by_product<C: StockCatalog + ?Sized>(
    movements: &[&StockMovement],
    catalog: &C,
    directory: &ClientDirectory,
) -> Vec<ConsumptionByProduct> {
    let mut rows: Vec<ConsumptionByProduct> = Vec::new();
    let mut clients: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();

    for movement in movements {
        let Some(product) = catalog.product(movement.product_id) else {
            continue;
        };
        let quantity = movement.consumed_quantity();
        let value = product.unit_cost() * quantity;

        match rows.iter_mut().find(|r| r.product_id == product.id) {
            Some(row) => {
                row.total_quantity += quantity;
                row.total_value += value;
                row.movement_count += 1;
            }
            None => rows.push(ConsumptionByProduct {
                product_id: product.id,
                product_name: product.name.clone(),
                category: product.category,
                total_quantity: quantity,
                total_value: value,
                unit: product.unit.clone(),
                client_count: 0,
                movement_count: 1,
            }),
        }

        if let Some(attribution) = attribute_client(movement, directory) {
            clients
                .entry(product.id)
                .or_default()
                .insert(attribution.client_id);
        }
    }

    for row in &mut rows {
        row.client_count = clients.get(&row.product_id).map_or(0, |c| c.len() as u64);
    }
    rows.sort_by(|a, b| b.total_quantity.cmp(&a.total_quantity));
    rows
}

/// Consumption per product category, highest value first
pub fn aggregate_by_category<C: StockCatalog + ?Sized>(
    movements: &[&StockMovement],
    catalog: &C,
) -> Vec<ConsumptionByCategory> {
    let mut rows: Vec<ConsumptionByCategory> = Vec::new();
    for movement in movements {
        let Some(product) = catalog.product(movement.product_id) else {
            continue;
        };
        let quantity = movement.consumed_quantity();
        let value = product.unit_cost() * quantity;
        match rows.iter_mut().find(|r| r.category == product.category) {
            Some(row) => {
                row.total_quantity += quantity;
                row.total_value += value;
            }
            None => rows.push(ConsumptionByCategory {
                category: product.category,
                total_quantity: quantity,
                total_value: value,
            }),
        }
    }
    rows.sort_by(|a, b| b.total_value.cmp(&a.total_value));
    rows
}

/// Bucket size for a report span: daily up to 31 days, weekly up to 90,
/// monthly beyond
pub fn granularity_for(start: DateTime<Utc>, end: DateTime<Utc>) -> Granularity {
    let millis = (end - start).num_milliseconds().max(0);
    let day = Duration::days(1).num_milliseconds();
    let days = (millis + day - 1) / day;
    if days <= 31 {
        Granularity::Daily
    } else if days <= 90 {
        Granularity::Weekly
    } else {
        Granularity::Monthly
    }
}

fn bucket_origin(granularity: Granularity, start: DateTime<Utc>) -> NaiveDate {
    let date = start.date_naive();
    match granularity {
        Granularity::Daily => date,
        Granularity::Weekly => start_of_week(date),
        Granularity::Monthly => start_of_month(date),
    }
}

fn next_bucket(granularity: Granularity, date: NaiveDate) -> Option<NaiveDate> {
    match granularity {
        Granularity::Daily => date.checked_add_days(Days::new(1)),
        Granularity::Weekly => date.checked_add_days(Days::new(7)),
        Granularity::Monthly => date.checked_add_months(Months::new(1)),
    }
}

/// Quantity, value and movement count per bucket over `[start, end]`
pub fn time_series<C: StockCatalog + ?Sized>(
    movements: &[&StockMovement],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    catalog: &C,
) -> (Granularity, Vec<TimeSeriesPoint>) {
    let granularity = granularity_for(start, end);
    let mut points = Vec::new();
    let mut bucket = bucket_origin(granularity, start);

    while start_of_day(bucket) <= end {
        let Some(next) = next_bucket(granularity, bucket) else {
            break;
        };
        let (from, to) = (start_of_day(bucket), start_of_day(next));

        let mut point = TimeSeriesPoint {
            bucket_start: from,
            quantity: Decimal::ZERO,
            value: Decimal::ZERO,
            movement_count: 0,
        };
        for movement in movements.iter().filter(|m| m.timestamp >= from && m.timestamp < to) {
            point.quantity += movement.consumed_quantity();
            point.value += movement_value(catalog, movement);
            point.movement_count += 1;
        }
        point.quantity = round2(point.quantity);
        point.value = round2(point.value);
        points.push(point);

        bucket = next;
    }

    (granularity, points)
}

/// Headline figures for a filtered movement set
pub fn totals<C: StockCatalog + ?Sized>(
    movements: &[&StockMovement],
    by_client: &[ConsumptionByClient],
    by_product: &[ConsumptionByProduct],
    catalog: &C,
) -> ConsumptionTotals {
    ConsumptionTotals {
        total_value: movements.iter().map(|m| movement_value(catalog, m)).sum(),
        movement_count: movements.len() as u64,
        active_clients: by_client.len() as u64,
        products_used: by_product.len() as u64,
    }
}

/// Full consumption report for a filter
pub fn build_report<C: StockCatalog + ?Sized>(
    movements: &[StockMovement],
    catalog: &C,
    directory: &ClientDirectory,
    filter: &ConsumptionFilter,
    now: DateTime<Utc>,
) -> ConsumptionReport {
    let filtered = filter_movements(movements, filter, now, catalog, directory);
    let range = filter.period.bounds(now);

    let by_client = aggregate_by_client(&filtered, catalog, directory, filter.include_inactive);
    let by_product = aggregate_by_product(&filtered, catalog, directory);
    let by_category = aggregate_by_category(&filtered, catalog);

    let series_start = match range {
        Some(r) => r.start,
        None => filtered.iter().map(|m| m.timestamp).min().unwrap_or(now),
    };
    let series_end = range.map_or(now, |r| r.end);
    let (granularity, time_series) = time_series(&filtered, series_start, series_end, catalog);
    let totals = totals(&filtered, &by_client, &by_product, catalog);

    ConsumptionReport {
        start: range.map(|r| r.start),
        end: series_end,
        granularity,
        by_client,
        by_product,
        by_category,
        time_series,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_period_bounds() {
        // Wednesday
        let now = at(2024, 5, 15, 12);
        assert_eq!(Period::Week.bounds(now).unwrap().start, at(2024, 5, 13, 0));
        assert_eq!(Period::Month.bounds(now).unwrap().start, at(2024, 5, 1, 0));
        assert_eq!(Period::Quarter.bounds(now).unwrap().start, at(2024, 4, 1, 0));
        assert_eq!(Period::Year.bounds(now).unwrap().start, at(2024, 1, 1, 0));
        assert_eq!(Period::Year.bounds(now).unwrap().end, now);
        assert!(Period::AllTime.bounds(now).is_none());
    }

    #[test]
    fn test_custom_period_covers_whole_days() {
        let now = at(2024, 5, 15, 12);
        let period = Period::Custom {
            start: NaiveDate::from_ymd_opt(2024, 3, 2),
            end: NaiveDate::from_ymd_opt(2024, 3, 4),
        };
        let range = period.bounds(now).unwrap();
        assert_eq!(range.start, at(2024, 3, 2, 0));
        assert_eq!(range.end, at(2024, 3, 5, 0) - Duration::milliseconds(1));

        let open = Period::Custom { start: None, end: None }.bounds(now).unwrap();
        assert_eq!(open.start, at(2024, 5, 1, 0));
        assert_eq!(open.end, now);
    }

    #[test]
    fn test_granularity_thresholds() {
        let start = at(2024, 1, 1, 0);
        assert_eq!(granularity_for(start, start + Duration::days(31)), Granularity::Daily);
        assert_eq!(
            granularity_for(start, start + Duration::days(31) + Duration::hours(1)),
            Granularity::Weekly
        );
        assert_eq!(granularity_for(start, start + Duration::days(90)), Granularity::Weekly);
        assert_eq!(granularity_for(start, start + Duration::days(91)), Granularity::Monthly);
    }
}
