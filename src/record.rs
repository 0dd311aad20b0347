use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A canonical sales record, the sole domain entity.
///
/// Serde renames map the fields onto the wire/column names used by the
/// external store (`cliente_usuario`, `ciudad`, ...), so the same struct is
/// both the in-memory shape and the store row. `id` is assigned by the store
/// on insert and is absent on records that have not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    /// Store-assigned identifier; `None` before persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Salesperson name; empty string when the source row had none.
    #[serde(rename = "cliente_usuario", default)]
    pub salesperson: String,

    #[serde(rename = "ciudad", default)]
    pub city: String,

    #[serde(rename = "negocio", default)]
    pub business: String,

    /// Product packaging/size descriptor, e.g. "500g".
    #[serde(rename = "presentacion", default)]
    pub presentation: String,

    /// Units sold. Always finite and non-negative after normalization.
    #[serde(rename = "venta", default)]
    pub quantity: f64,

    /// Calendar date in canonical `YYYY-MM-DD` form.
    #[serde(rename = "fecha", default)]
    pub date: String,

    /// Identifier of the authenticated user who owns the record.
    #[serde(rename = "usuario_id")]
    pub owner_id: String,

    /// Filename of the upload this record came from, for provenance.
    #[serde(rename = "archivo_origen", default)]
    pub source_file: String,
}

impl SalesRecord {
    /// Parses the canonical date string back into a calendar date.
    /// Returns `None` only for records that predate normalization.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        crate::normalize::parse_date_str(&self.date)
    }
}

/// A single cell value as it comes out of the workbook decoder.
///
/// This is the untyped boundary shape: a row is a mapping from raw header
/// string to one of these, coerced immediately by the field normalizer into
/// a [`SalesRecord`] and never propagated past ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Empty,
}

/// A decoded sheet row: `(raw header, cell value)` pairs in sheet column
/// order. Order matters because header matching scans columns left to right.
pub type RawRow = Vec<(String, CellValue)>;
