//! Ingestion pipeline: decode an uploaded workbook, normalize each row and
//! persist the whole batch through the store collaborator.
//!
//! The pipeline is all-or-nothing per upload: a decode failure or a store
//! rejection aborts the operation with nothing persisted, and there is no
//! retry. Rows are normalized and submitted in sheet order; the store
//! decides the final persisted order.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::Utc;
use log::info;

use crate::error::DashboardError;
use crate::normalize::normalize_row;
use crate::record::{CellValue, RawRow, SalesRecord};
use crate::store::SalesStore;

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => CellValue::Date(naive.date()),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

fn header_label(data: &Data) -> String {
    match data {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Decodes workbook bytes (`.xlsx`/`.xls`) into raw rows.
///
/// Only the first sheet is read and its first row is taken as the header
/// row, mirroring the upload contract. Blank cells are dropped from the row
/// map so absent fields surface as missing headers, not empty values.
pub fn decode_rows(bytes: &[u8]) -> Result<Vec<RawRow>, DashboardError> {
    let cursor = Cursor::new(bytes);
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| DashboardError::Decode(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DashboardError::Decode("workbook has no sheets".into()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| DashboardError::Decode(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(header_label).collect(),
        None => return Ok(Vec::new()),
    };

    let mut decoded = Vec::new();
    for row in rows {
        let mut raw: RawRow = Vec::with_capacity(headers.len());
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() {
                continue;
            }
            let value = cell_value(cell);
            if value != CellValue::Empty {
                raw.push((header.clone(), value));
            }
        }
        if !raw.is_empty() {
            decoded.push(raw);
        }
    }

    Ok(decoded)
}

/// Normalizes decoded rows into canonical records with ownership and
/// provenance attached. The ingestion date is the fallback for rows whose
/// date cell cannot be parsed.
pub fn normalize_rows(rows: &[RawRow], owner_id: &str, source_file: &str) -> Vec<SalesRecord> {
    let today = Utc::now().date_naive();
    rows.iter()
        .map(|row| normalize_row(row, owner_id, source_file, today))
        .collect()
}

/// Ingests one uploaded workbook for `owner_id`: decode, normalize, one
/// bulk insert. Returns the number of rows submitted.
pub async fn ingest_workbook(
    store: &dyn SalesStore,
    owner_id: &str,
    source_file: &str,
    bytes: &[u8],
) -> Result<usize, DashboardError> {
    let rows = decode_rows(bytes)?;
    let records = normalize_rows(&rows, owner_id, source_file);
    store.insert_batch(&records).await?;
    info!(
        "ingested {} rows from {} for owner {}",
        records.len(),
        source_file,
        owner_id
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn sample_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet().set_name("Ventas").unwrap();
        let headers = ["Vendedor-usuario", "Ciudad", "Negocio", "Presentacion", "Venta", "Fecha"];
        for (col, header) in headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, *header).unwrap();
        }
        worksheet.write_string(1, 0, "Juan Pérez").unwrap();
        worksheet.write_string(1, 1, "La Ceiba").unwrap();
        worksheet.write_string(1, 2, "Tienda").unwrap();
        worksheet.write_string(1, 3, "500g").unwrap();
        worksheet.write_number(1, 4, 1200.0).unwrap();
        worksheet.write_string(1, 5, "2024-01-05").unwrap();
        // Second row leaves text fields blank and the quantity garbled.
        worksheet.write_string(2, 4, "no-se").unwrap();
        worksheet.write_string(2, 5, "2024-02-01").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn decodes_first_sheet_with_header_row() {
        let rows = decode_rows(&sample_workbook()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].0, "Vendedor-usuario");
    }

    #[test]
    fn normalizes_decoded_rows_to_canonical_records() {
        let rows = decode_rows(&sample_workbook()).unwrap();
        let records = normalize_rows(&rows, "owner-1", "ventas.xlsx");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.salesperson, "Juan Pérez");
        assert_eq!(first.city, "La Ceiba");
        assert_eq!(first.quantity, 1200.0);
        assert_eq!(first.date, "2024-01-05");
        assert_eq!(first.owner_id, "owner-1");
        assert_eq!(first.source_file, "ventas.xlsx");

        let second = &records[1];
        assert_eq!(second.salesperson, "");
        assert_eq!(second.quantity, 0.0);
        assert_eq!(second.date, "2024-02-01");
    }

    #[test]
    fn corrupt_bytes_abort_with_decode_error() {
        let err = decode_rows(b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, DashboardError::Decode(_)));
    }
}
