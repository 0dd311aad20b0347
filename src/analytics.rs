//! Record aggregator: pure functions from an in-memory record collection
//! to the derived views the dashboard charts and reports consume. No side
//! effects, no external calls.

use serde::Serialize;

use crate::record::SalesRecord;

/// Bucket label for records missing a city or business value.
pub const UNSPECIFIED: &str = "Sin especificar";
/// Bucket label for records whose date cannot produce a month key.
pub const NO_DATE: &str = "Sin fecha";
/// Bucket label for records missing a salesperson.
pub const NO_SALESPERSON: &str = "Sin vendedor";

/// Scalar KPIs shown at the top of the analytics view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_records: usize,
    pub total_quantity: f64,
    /// Mean quantity per record, rounded to the nearest integer; 0 when
    /// there are no records.
    pub mean_quantity: i64,
    /// Number of distinct non-empty city values.
    pub active_cities: usize,
}

/// Sums `quantity` per key, preserving first-seen key order so the result
/// is deterministic for identical input order.
fn group_sum<F>(records: &[SalesRecord], fallback: &str, key_of: F) -> Vec<(String, f64)>
where
    F: Fn(&SalesRecord) -> &str,
{
    let mut groups: Vec<(String, f64)> = Vec::new();
    for record in records {
        let key = match key_of(record).trim() {
            "" => fallback,
            k => k,
        };
        match groups.iter_mut().find(|(k, _)| k == key) {
            Some((_, sum)) => *sum += record.quantity,
            None => groups.push((key.to_string(), record.quantity)),
        }
    }
    groups
}

/// Units per city; empty cities land in the "Sin especificar" bucket.
pub fn by_city(records: &[SalesRecord]) -> Vec<(String, f64)> {
    group_sum(records, UNSPECIFIED, |r| &r.city)
}

/// Units per business type; empty values land in "Sin especificar".
pub fn by_business(records: &[SalesRecord]) -> Vec<(String, f64)> {
    group_sum(records, UNSPECIFIED, |r| &r.business)
}

/// Extracts the `YYYY-MM` month key from a canonical date string.
///
/// Prefers a literal prefix match over re-parsing so the key can never
/// drift by a day across timezones; falls back to a full parse for
/// non-canonical strings.
fn month_key(date: &str) -> Option<String> {
    let bytes = date.as_bytes();
    if bytes.len() >= 7
        && bytes[..4].iter().all(|b| b.is_ascii_digit())
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(|b| b.is_ascii_digit())
    {
        return Some(date[..7].to_string());
    }
    crate::normalize::parse_date_str(date).map(|d| d.format("%Y-%m").to_string())
}

/// Units per calendar month, sorted ascending by `YYYY-MM` key. Records
/// without a usable date are bucketed as "Sin fecha" and dropped from the
/// series (they still count toward the KPIs).
pub fn monthly_series(records: &[SalesRecord]) -> Vec<(String, f64)> {
    let mut groups: Vec<(String, f64)> = Vec::new();
    for record in records {
        let key = month_key(&record.date).unwrap_or_else(|| NO_DATE.to_string());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, sum)) => *sum += record.quantity,
            None => groups.push((key, record.quantity)),
        }
    }

    let mut series: Vec<(String, f64)> =
        groups.into_iter().filter(|(k, _)| k != NO_DATE).collect();
    series.sort_by(|(a, _), (b, _)| a.cmp(b));
    series
}

/// Top 10 salespeople by summed units, descending. The sort is stable so
/// ties keep their first-seen order.
pub fn top_salespeople(records: &[SalesRecord]) -> Vec<(String, f64)> {
    let mut groups = group_sum(records, NO_SALESPERSON, |r| &r.salesperson);
    groups.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    groups.truncate(10);
    groups
}

/// Scalar KPIs over the whole collection.
pub fn kpis(records: &[SalesRecord]) -> Kpis {
    let total_records = records.len();
    let total_quantity: f64 = records.iter().map(|r| r.quantity).sum();
    let mean_quantity = if total_records > 0 {
        (total_quantity / total_records as f64).round() as i64
    } else {
        0
    };

    let mut cities: Vec<&str> = records
        .iter()
        .map(|r| r.city.trim())
        .filter(|c| !c.is_empty())
        .collect();
    cities.sort_unstable();
    cities.dedup();

    Kpis {
        total_records,
        total_quantity,
        mean_quantity,
        active_cities: cities.len(),
    }
}
