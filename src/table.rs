//! Filter/sort/paginate engine for the data table view.
//!
//! Filtering is conjunctive, sorting is single-key with a toggle on
//! re-selection, pagination is 1-based and clamped. The engine is pure:
//! applying it twice with the same specs yields the same output.

use serde::{Deserialize, Serialize};

use crate::record::SalesRecord;

/// Conjunctive filter over the record collection. `None` (or an empty
/// string, since HTTP forms send those) means the criterion always passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    pub city: Option<String>,
    pub business: Option<String>,
    pub quantity_min: Option<f64>,
    pub quantity_max: Option<f64>,
    pub source_file: Option<String>,
    pub search_text: Option<String>,
}

fn given(criterion: &Option<String>) -> Option<&str> {
    criterion.as_deref().filter(|s| !s.is_empty())
}

impl FilterSpec {
    /// True when every specified criterion matches. Quantity bounds are
    /// inclusive; the free-text search is a case-insensitive substring
    /// match over salesperson, city, business and presentation.
    pub fn matches(&self, record: &SalesRecord) -> bool {
        if let Some(city) = given(&self.city) {
            if record.city != city {
                return false;
            }
        }
        if let Some(business) = given(&self.business) {
            if record.business != business {
                return false;
            }
        }
        if let Some(min) = self.quantity_min {
            if record.quantity < min {
                return false;
            }
        }
        if let Some(max) = self.quantity_max {
            if record.quantity > max {
                return false;
            }
        }
        if let Some(file) = given(&self.source_file) {
            if record.source_file != file {
                return false;
            }
        }
        if let Some(text) = given(&self.search_text) {
            let needle = text.to_lowercase();
            let hit = [
                &record.salesperson,
                &record.city,
                &record.business,
                &record.presentation,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Salesperson,
    City,
    Business,
    Presentation,
    Quantity,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub dir: SortDir,
}

impl Default for SortSpec {
    /// The table opens sorted by date descending, matching the store's
    /// read-back order.
    fn default() -> Self {
        SortSpec {
            field: SortField::Date,
            dir: SortDir::Desc,
        }
    }
}

impl SortSpec {
    /// Selecting the current key flips the direction; selecting a new key
    /// resets to ascending.
    pub fn toggled(self, field: SortField) -> SortSpec {
        if self.field == field {
            SortSpec {
                field,
                dir: match self.dir {
                    SortDir::Asc => SortDir::Desc,
                    SortDir::Desc => SortDir::Asc,
                },
            }
        } else {
            SortSpec {
                field,
                dir: SortDir::Asc,
            }
        }
    }
}

enum SortKey {
    Num(f64),
    Text(String),
}

fn sort_key(record: &SalesRecord, field: SortField) -> SortKey {
    match field {
        // Dates compare by underlying timestamp; unparsable dates sort as
        // the epoch, the numeric zero equivalent.
        SortField::Date => SortKey::Num(
            record
                .parsed_date()
                .map(|d| d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()).unwrap_or(0))
                .unwrap_or(0) as f64,
        ),
        SortField::Quantity => SortKey::Num(record.quantity),
        SortField::Salesperson => SortKey::Text(record.salesperson.to_lowercase()),
        SortField::City => SortKey::Text(record.city.to_lowercase()),
        SortField::Business => SortKey::Text(record.business.to_lowercase()),
        SortField::Presentation => SortKey::Text(record.presentation.to_lowercase()),
    }
}

/// Stable single-key sort in the requested direction.
pub fn sort_records(records: &mut [SalesRecord], spec: SortSpec) {
    records.sort_by(|a, b| {
        let ordering = match (sort_key(a, spec.field), sort_key(b, spec.field)) {
            (SortKey::Num(x), SortKey::Num(y)) => {
                x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
            }
            (SortKey::Text(x), SortKey::Text(y)) => x.cmp(&y),
            // Keys for one field are always the same variant.
            _ => std::cmp::Ordering::Equal,
        };
        match spec.dir {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    });
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageSpec {
    /// 1-based page number; clamped into range by the engine.
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageSpec {
    fn default() -> Self {
        PageSpec { page: 1, page_size: 10 }
    }
}

/// One page of the filtered, sorted collection plus the totals the client
/// needs to render pagination controls.
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub rows: Vec<SalesRecord>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
    pub page_size: usize,
}

/// Slices sorted rows into the requested page. The page number is clamped
/// to `[1, max(1, ceil(total / page_size))]`, so there is always at least
/// one (possibly empty) page.
pub fn paginate(rows: Vec<SalesRecord>, spec: PageSpec) -> TablePage {
    let page_size = spec.page_size.max(1);
    let total = rows.len();
    let total_pages = (total.div_ceil(page_size)).max(1);
    let page = spec.page.clamp(1, total_pages);

    let start = (page - 1) * page_size;
    let rows = rows
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();

    TablePage {
        rows,
        total,
        page,
        total_pages,
        page_size,
    }
}

/// Full table query: filter, sort, paginate.
pub fn query(
    records: &[SalesRecord],
    filter: &FilterSpec,
    sort: SortSpec,
    page: PageSpec,
) -> TablePage {
    let mut matching: Vec<SalesRecord> = records
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    sort_records(&mut matching, sort);
    paginate(matching, page)
}

/// Ids of the records matching `filter` that can be bulk-deleted, plus the
/// count of matching records that have no id yet and are skipped.
pub fn deletable_ids(records: &[SalesRecord], filter: &FilterSpec) -> (Vec<i64>, usize) {
    let mut ids = Vec::new();
    let mut skipped = 0usize;
    for record in records.iter().filter(|r| filter.matches(r)) {
        match record.id {
            Some(id) => ids.push(id),
            None => skipped += 1,
        }
    }
    (ids, skipped)
}

/// Per-upload provenance group shown in the files panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileGroup {
    pub file: String,
    pub count: usize,
    /// Most recent record date in the group, when any date parses.
    pub last_date: Option<String>,
}

/// Bucket label for records with no source file recorded.
pub const NO_FILE: &str = "Sin archivo";

/// Groups records by source file with per-file counts and most recent
/// dates, newest file first.
pub fn file_groups(records: &[SalesRecord]) -> Vec<FileGroup> {
    let mut groups: Vec<FileGroup> = Vec::new();
    for record in records {
        let key = if record.source_file.is_empty() {
            NO_FILE
        } else {
            &record.source_file
        };
        let date = record.parsed_date().map(|d| d.format("%Y-%m-%d").to_string());
        match groups.iter_mut().find(|g| g.file == key) {
            Some(group) => {
                group.count += 1;
                if date > group.last_date {
                    group.last_date = date;
                }
            }
            None => groups.push(FileGroup {
                file: key.to_string(),
                count: 1,
                last_date: date,
            }),
        }
    }
    groups.sort_by(|a, b| b.last_date.cmp(&a.last_date));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: Option<i64>, city: &str, quantity: f64, date: &str, file: &str) -> SalesRecord {
        SalesRecord {
            id,
            salesperson: "Ana María".into(),
            city: city.into(),
            business: "Tienda".into(),
            presentation: "500g".into(),
            quantity,
            date: date.into(),
            owner_id: "o".into(),
            source_file: file.into(),
        }
    }

    fn sample() -> Vec<SalesRecord> {
        vec![
            record(Some(1), "La Ceiba", 10.0, "2024-01-05", "enero.xlsx"),
            record(Some(2), "El Porvenir", 5.0, "2024-02-01", "febrero.xlsx"),
            record(Some(3), "La Ceiba", 3.0, "2024-03-01", "marzo.xlsx"),
            record(None, "Tela", 7.0, "2024-01-20", "enero.xlsx"),
        ]
    }

    #[test]
    fn filters_are_conjunctive_with_inclusive_bounds() {
        let records = sample();
        let filter = FilterSpec {
            city: Some("La Ceiba".into()),
            quantity_min: Some(3.0),
            quantity_max: Some(10.0),
            ..Default::default()
        };
        let matched: Vec<_> = records.iter().filter(|r| filter.matches(r)).collect();
        assert_eq!(matched.len(), 2);

        // Empty-string criteria always pass.
        let empty = FilterSpec {
            city: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(records.iter().filter(|r| empty.matches(r)).count(), 4);
    }

    #[test]
    fn search_text_is_case_insensitive_across_text_fields() {
        let records = sample();
        let filter = FilterSpec {
            search_text: Some("ana marÍa".into()),
            ..Default::default()
        };
        assert_eq!(records.iter().filter(|r| filter.matches(r)).count(), 4);

        let miss = FilterSpec {
            search_text: Some("no-existe".into()),
            ..Default::default()
        };
        assert_eq!(records.iter().filter(|r| miss.matches(r)).count(), 0);
    }

    #[test]
    fn toggling_the_same_field_flips_direction() {
        let spec = SortSpec { field: SortField::Quantity, dir: SortDir::Asc };
        let flipped = spec.toggled(SortField::Quantity);
        assert_eq!(flipped.dir, SortDir::Desc);
        let back = flipped.toggled(SortField::Quantity);
        assert_eq!(back.dir, SortDir::Asc);
        // A new field resets to ascending.
        assert_eq!(flipped.toggled(SortField::City).dir, SortDir::Asc);
    }

    #[test]
    fn sorts_by_quantity_and_by_date_timestamp() {
        let mut records = sample();
        sort_records(&mut records, SortSpec { field: SortField::Quantity, dir: SortDir::Asc });
        assert_eq!(records[0].quantity, 3.0);
        assert_eq!(records[3].quantity, 10.0);

        sort_records(&mut records, SortSpec { field: SortField::Date, dir: SortDir::Desc });
        assert_eq!(records[0].date, "2024-03-01");
        assert_eq!(records[3].date, "2024-01-05");
    }

    #[test]
    fn pagination_clamps_into_range() {
        let records = sample();
        let filter = FilterSpec::default();

        let page = query(&records, &filter, SortSpec::default(), PageSpec { page: 99, page_size: 3 });
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.rows.len(), 1);

        let below = query(&records, &filter, SortSpec::default(), PageSpec { page: 0, page_size: 3 });
        assert_eq!(below.page, 1);

        // Even an empty result keeps one page.
        let none = query(&[], &filter, SortSpec::default(), PageSpec::default());
        assert_eq!(none.total_pages, 1);
        assert_eq!(none.page, 1);
    }

    #[test]
    fn query_is_idempotent() {
        let records = sample();
        let filter = FilterSpec { search_text: Some("ceiba".into()), ..Default::default() };
        let sort = SortSpec { field: SortField::Quantity, dir: SortDir::Desc };
        let page = PageSpec { page: 1, page_size: 10 };

        let first = query(&records, &filter, sort, page);
        let second = query(&records, &filter, sort, page);
        assert_eq!(first.rows, second.rows);
        assert_eq!(first.total, second.total);
    }

    #[test]
    fn bulk_delete_skips_records_without_ids() {
        let records = sample();
        let (ids, skipped) = deletable_ids(&records, &FilterSpec::default());
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn file_groups_count_and_sort_by_most_recent_date() {
        let groups = file_groups(&sample());
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].file, "marzo.xlsx");
        let enero = groups.iter().find(|g| g.file == "enero.xlsx").unwrap();
        assert_eq!(enero.count, 2);
        assert_eq!(enero.last_date.as_deref(), Some("2024-01-20"));
    }
}
