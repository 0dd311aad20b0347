//! Geo-bucketing for the heatmap: free-text city values are matched onto a
//! fixed set of known locations by case/diacritic-insensitive containment.
//! Unmatched cities are excluded from the bucketed counts but not from any
//! other aggregate.

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::record::SalesRecord;

/// Known locations with their map coordinates, in match-priority order.
pub const KNOWN_CITIES: [(&str, f64, f64); 3] = [
    ("La Ceiba", 15.7739, -86.7964),
    ("El Porvenir", 15.7734, -86.8587),
    ("El Pino", 15.7289, -86.8621),
];

/// Intensity floor for locations that have at least one record, so sparse
/// buckets stay visible on the heat layer.
const MIN_INTENSITY: f64 = 0.35;

/// One heatmap point: a known location with its record count and
/// normalized intensity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPoint {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub count: usize,
    /// `max(0.35, count / max_count)` when count > 0, else 0.
    pub intensity: f64,
}

fn fold_city(raw: &str) -> String {
    let stripped: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the record city equals or contains the known location name,
/// ignoring case, diacritics and whitespace runs. Containment covers
/// values like "La Ceiba, Atlántida".
pub fn matches_city(value: &str, target: &str) -> bool {
    let v = fold_city(value);
    let t = fold_city(target);
    v == t || v.contains(&t)
}

/// Record count per known location, in fixed location order. Each record
/// lands in at most one bucket (first match in priority order); cities
/// matching no location are excluded entirely.
pub fn city_counts(records: &[SalesRecord]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = KNOWN_CITIES
        .iter()
        .map(|(name, _, _)| (name.to_string(), 0))
        .collect();

    for record in records {
        if record.city.is_empty() {
            continue;
        }
        for (i, (name, _, _)) in KNOWN_CITIES.iter().enumerate() {
            if matches_city(&record.city, name) {
                counts[i].1 += 1;
                break;
            }
        }
    }
    counts
}

/// Heatmap points for every known location, intensity normalized to the
/// maximum count and floored at the minimum visible intensity.
pub fn heat_points(records: &[SalesRecord]) -> Vec<HeatPoint> {
    let counts = city_counts(records);
    let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);

    counts
        .into_iter()
        .zip(KNOWN_CITIES.iter())
        .map(|((city, count), (_, lat, lon))| {
            let intensity = if count > 0 && max > 0 {
                (count as f64 / max as f64).clamp(MIN_INTENSITY, 1.0)
            } else {
                0.0
            };
            HeatPoint {
                city,
                lat: *lat,
                lon: *lon,
                count,
                intensity,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(city: &str, quantity: f64) -> SalesRecord {
        SalesRecord {
            id: None,
            salesperson: String::new(),
            city: city.into(),
            business: String::new(),
            presentation: String::new(),
            quantity,
            date: "2024-01-01".into(),
            owner_id: "o".into(),
            source_file: String::new(),
        }
    }

    #[test]
    fn matching_ignores_case_and_diacritics_and_allows_containment() {
        assert!(matches_city("la ceiba", "La Ceiba"));
        assert!(matches_city("La Ceiba, Atlántida", "La Ceiba"));
        assert!(matches_city("EL PORVENÍR", "El Porvenir"));
        assert!(!matches_city("Tegucigalpa", "La Ceiba"));
    }

    #[test]
    fn buckets_known_cities_and_excludes_the_rest() {
        let records = vec![
            record("La Ceiba", 10.0),
            record("el porvenir", 5.0),
            record("Tegucigalpa", 3.0),
        ];

        let counts = city_counts(&records);
        assert_eq!(
            counts,
            vec![
                ("La Ceiba".to_string(), 1),
                ("El Porvenir".to_string(), 1),
                ("El Pino".to_string(), 0),
            ]
        );

        let points = heat_points(&records);
        assert_eq!(points[0].intensity, 1.0);
        assert_eq!(points[1].intensity, 1.0);
        assert_eq!(points[2].intensity, 0.0);
    }

    #[test]
    fn sparse_buckets_keep_the_minimum_visible_intensity() {
        let mut records = vec![record("El Pino", 1.0)];
        for _ in 0..9 {
            records.push(record("La Ceiba", 1.0));
        }
        let points = heat_points(&records);
        assert_eq!(points[0].intensity, 1.0);
        assert_eq!(points[2].count, 1);
        assert_eq!(points[2].intensity, 0.35);
    }

    #[test]
    fn no_records_means_zero_intensity_everywhere() {
        let points = heat_points(&[]);
        assert!(points.iter().all(|p| p.count == 0 && p.intensity == 0.0));
    }
}
