//! Field normalizer: maps arbitrary spreadsheet headers onto the canonical
//! field set and coerces locale-ambiguous cell values into canonical
//! numbers and dates.
//!
//! Ingestion never rejects a row here: missing text fields become empty
//! strings, unparsable quantities become 0 and unparsable dates fall back
//! to the ingestion date.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::record::{CellValue, RawRow, SalesRecord};

/// Folds a header string into its canonical matching form: decompose,
/// strip diacritics, lowercase, collapse non-alphanumeric runs to a single
/// `_`, trim leading/trailing separators.
///
/// `"Presentación"`, `"PRESENTACION"` and `" presentacion "` all fold to
/// `"presentacion"`; `"Vendedor-usuario"` folds to `"vendedor_usuario"`.
pub fn fold_header(raw: &str) -> String {
    let stripped: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut folded = String::with_capacity(stripped.len());
    let mut pending_sep = false;
    for c in stripped.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !folded.is_empty() {
                folded.push('_');
            }
            pending_sep = false;
            folded.push(c);
        } else {
            pending_sep = true;
        }
    }
    folded
}

fn fold_all(variants: &[&str]) -> Vec<String> {
    variants.iter().map(|v| fold_header(v)).collect()
}

lazy_static! {
    /// Recognized header variants per canonical field, in priority order.
    /// The `Vendedor` variants are deliberately listed before the legacy
    /// `Cliente` ones so a sheet carrying both columns picks the former.
    pub static ref SALESPERSON_HEADERS: Vec<String> = fold_all(&[
        "Vendedor-usuario",
        "Vendedor Usuario",
        "Vendedor_usuario",
        "Vendedor",
        "Cliente-usuario",
        "Cliente Usuario",
        "Cliente_usuario",
        "Cliente",
    ]);
    pub static ref CITY_HEADERS: Vec<String> = fold_all(&["Ciudad", "Municipio", "City"]);
    pub static ref BUSINESS_HEADERS: Vec<String> =
        fold_all(&["Negocio", "Tipo de Negocio", "Giro", "Negocios"]);
    pub static ref PRESENTATION_HEADERS: Vec<String> =
        fold_all(&["Presentacion", "Presentación", "Presentaciones"]);
    pub static ref QUANTITY_HEADERS: Vec<String> =
        fold_all(&["Venta", "Ventas", "Monto", "Monto Venta", "Valor", "Total"]);
    pub static ref DATE_HEADERS: Vec<String> =
        fold_all(&["Fecha", "Fecha Venta", "Fecha de Venta"]);
}

/// Finds the value for a canonical field in a raw row.
///
/// Synonyms are tried in priority order; for each synonym the row headers
/// are scanned in sheet order and the first folded match wins. Returns
/// `None` when no header matches, which callers treat as an absent field.
pub fn field<'a>(row: &'a RawRow, synonyms: &[String]) -> Option<&'a CellValue> {
    for synonym in synonyms {
        for (header, value) in row {
            if fold_header(header) == *synonym {
                return Some(value);
            }
        }
    }
    None
}

fn text_of(value: Option<&CellValue>) -> String {
    match value {
        Some(CellValue::Text(s)) => s.trim().to_string(),
        // Integral values print without a fractional part; the cast-free
        // formatting keeps values beyond i64 range exact.
        Some(CellValue::Number(n)) => {
            if n.fract() == 0.0 {
                format!("{n:.0}")
            } else {
                n.to_string()
            }
        }
        Some(CellValue::Date(d)) => d.format("%Y-%m-%d").to_string(),
        Some(CellValue::Empty) | None => String::new(),
    }
}

/// Parses a quantity cell into a finite, non-negative number.
pub fn parse_quantity(value: Option<&CellValue>) -> f64 {
    let parsed = match value {
        Some(CellValue::Number(n)) => *n,
        Some(CellValue::Text(s)) => parse_quantity_str(s),
        _ => 0.0,
    };
    if parsed.is_finite() {
        parsed.max(0.0)
    } else {
        0.0
    }
}

/// Parses a locale-ambiguous numeric string.
///
/// Everything but digits, commas, periods and minus signs is stripped
/// (currency symbols, spaces). If the remainder has commas but no periods
/// the comma is the decimal separator; otherwise commas are thousands
/// separators. `"1.234,56"` and `"1,234.56"` both yield `1234.56`.
pub fn parse_quantity_str(raw: &str) -> f64 {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if stripped.is_empty() {
        return 0.0;
    }

    let has_comma = stripped.contains(',');
    let has_period = stripped.contains('.');
    let canonical = if has_comma && !has_period {
        stripped.replace(',', ".")
    } else {
        stripped.replace(',', "")
    };

    canonical.parse::<f64>().unwrap_or(0.0)
}

/// Attempts to parse a date string in any of the shapes the uploads carry.
pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // ISO datetime first: "2024-01-05T00:00:00" and friends.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

/// Decodes an Excel serial date number (1900 epoch). Serial 1 is
/// 1900-01-01; the conventional 1899-12-30 base absorbs the Lotus leap-year
/// quirk for every date in practical range.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial <= 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.trunc() as i64))
}

/// Canonicalizes a date cell to `YYYY-MM-DD`.
///
/// Structured dates convert directly (UTC calendar fields, so no
/// timezone-induced day shift), serial numbers decode via the workbook
/// epoch, strings go through [`parse_date_str`]; total failure falls back
/// to `today`, the ingestion date.
pub fn canonical_date(value: Option<&CellValue>, today: NaiveDate) -> String {
    let parsed = match value {
        Some(CellValue::Date(d)) => Some(*d),
        Some(CellValue::Number(n)) => serial_to_date(*n),
        Some(CellValue::Text(s)) => parse_date_str(s),
        Some(CellValue::Empty) | None => None,
    };
    parsed.unwrap_or(today).format("%Y-%m-%d").to_string()
}

/// Runs one decoded row through the normalizer, producing a canonical
/// record with ownership and provenance attached.
pub fn normalize_row(
    row: &RawRow,
    owner_id: &str,
    source_file: &str,
    today: NaiveDate,
) -> SalesRecord {
    SalesRecord {
        id: None,
        salesperson: text_of(field(row, &SALESPERSON_HEADERS)),
        city: text_of(field(row, &CITY_HEADERS)),
        business: text_of(field(row, &BUSINESS_HEADERS)),
        presentation: text_of(field(row, &PRESENTATION_HEADERS)),
        quantity: parse_quantity(field(row, &QUANTITY_HEADERS)),
        date: canonical_date(field(row, &DATE_HEADERS), today),
        owner_id: owner_id.to_string(),
        source_file: source_file.to_string(),
    }
}
