//! Export encoders: delimited text, styled workbook, the downloadable
//! template and the aggregate report workbook.

use chrono::Utc;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::analytics;
use crate::error::DashboardError;
use crate::record::SalesRecord;

/// Canonical header order for the template and every export.
pub const EXPORT_HEADERS: [&str; 6] = [
    "Vendedor-usuario",
    "Ciudad",
    "Negocio",
    "Presentacion",
    "Venta",
    "Fecha",
];

const COLUMN_WIDTHS: [f64; 6] = [22.0, 18.0, 18.0, 18.0, 14.0, 14.0];
const HEADER_BG: u32 = 0x1F2937;
const HEADER_BORDER: u32 = 0xE5E7EB;
const BODY_BORDER: u32 = 0xF3F4F6;

/// Builds the dated export filename: `frijolitos-<purpose>-<YYYY-MM-DD>.<ext>`.
pub fn export_filename(purpose: &str, ext: &str) -> String {
    format!(
        "frijolitos-{}-{}.{}",
        purpose,
        Utc::now().date_naive().format("%Y-%m-%d"),
        ext
    )
}

/// Formats a quantity for textual output: integers print without a
/// fractional part, everything else as-is. Formatting stays in floating
/// point so values beyond i64 range print exactly instead of saturating.
pub fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        quantity.to_string()
    }
}

/// Serializes the filtered records as comma-separated text in canonical
/// header order.
///
/// Known limitation, kept deliberately for compatibility with the original
/// exporter: field values containing the delimiter or quotes are NOT
/// escaped. The styled workbook export is the lossless path.
pub fn to_csv(records: &[SalesRecord]) -> String {
    let mut out = String::new();
    out.push_str(&EXPORT_HEADERS.join(","));
    out.push('\n');
    for record in records {
        let row = [
            record.salesperson.as_str(),
            record.city.as_str(),
            record.business.as_str(),
            record.presentation.as_str(),
            &format_quantity(record.quantity),
            record.date.as_str(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_BG))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(HEADER_BORDER))
}

fn body_format() -> Format {
    Format::new()
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(BODY_BORDER))
}

fn write_header_row(worksheet: &mut Worksheet) -> Result<(), DashboardError> {
    let format = header_format();
    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &format)?;
        worksheet.set_column_width(col as u16, COLUMN_WIDTHS[col])?;
    }
    Ok(())
}

fn write_record_row(
    worksheet: &mut Worksheet,
    row: u32,
    record: &SalesRecord,
) -> Result<(), DashboardError> {
    let body = body_format();
    let quantity = body.clone().set_num_format("#,##0");
    let date = body.clone().set_num_format("yyyy-mm-dd");

    worksheet.write_string_with_format(row, 0, &record.salesperson, &body)?;
    worksheet.write_string_with_format(row, 1, &record.city, &body)?;
    worksheet.write_string_with_format(row, 2, &record.business, &body)?;
    worksheet.write_string_with_format(row, 3, &record.presentation, &body)?;
    worksheet.write_number_with_format(row, 4, record.quantity, &quantity)?;
    match record.parsed_date() {
        Some(d) => worksheet.write_datetime_with_format(row, 5, &d, &date)?,
        None => worksheet.write_string_with_format(row, 5, &record.date, &body)?,
    };
    Ok(())
}

/// Serializes the filtered records as a styled workbook: bold
/// white-on-dark header, thin borders, grouped-integer quantities and
/// `yyyy-mm-dd` dates.
pub fn to_xlsx(records: &[SalesRecord]) -> Result<Vec<u8>, DashboardError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name("Plantilla")?;
    write_header_row(worksheet)?;
    for (i, record) in records.iter().enumerate() {
        write_record_row(worksheet, (i + 1) as u32, record)?;
    }
    Ok(workbook.save_to_buffer()?)
}

/// The downloadable upload template: canonical headers plus one example
/// row so users see the expected shapes.
pub fn template_xlsx() -> Result<Vec<u8>, DashboardError> {
    let example = SalesRecord {
        id: None,
        salesperson: "Juan Pérez".into(),
        city: "La Ceiba".into(),
        business: "Tienda".into(),
        presentation: "500g".into(),
        quantity: 1200.0,
        date: Utc::now().date_naive().format("%Y-%m-%d").to_string(),
        owner_id: String::new(),
        source_file: String::new(),
    };

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name("Plantilla")?;
    write_header_row(worksheet)?;
    write_record_row(worksheet, 1, &example)?;
    Ok(workbook.save_to_buffer()?)
}

/// Rows of the aggregate report, shared between the workbook and the PDF:
/// title, generation date, KPI block, then the two ranked tables.
pub fn report_rows(records: &[SalesRecord]) -> Vec<Vec<String>> {
    let kpis = analytics::kpis(records);
    let mut by_city = analytics::by_city(records);
    by_city.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let mut by_business = analytics::by_business(records);
    by_business.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut rows: Vec<Vec<String>> = vec![
        vec!["REPORTE DE ANALISIS - FRIJOLITOS COSTEÑOS".into()],
        vec![
            "Fecha de generación:".into(),
            Utc::now().date_naive().format("%Y-%m-%d").to_string(),
        ],
        vec![],
        vec!["RESUMEN GENERAL".into()],
        vec!["Total de registros:".into(), kpis.total_records.to_string()],
        vec![
            "Total de unidades:".into(),
            format_quantity(kpis.total_quantity),
        ],
        vec![
            "Promedio por registro:".into(),
            kpis.mean_quantity.to_string(),
        ],
        vec!["Ciudades activas:".into(), kpis.active_cities.to_string()],
        vec![],
        vec!["UNIDADES POR CIUDAD".into()],
        vec!["Ciudad".into(), "Total Unidades".into()],
    ];
    for (city, sum) in &by_city {
        rows.push(vec![city.clone(), format_quantity(*sum)]);
    }
    rows.push(vec![]);
    rows.push(vec!["UNIDADES POR TIPO DE NEGOCIO".into()]);
    rows.push(vec!["Negocio".into(), "Total Unidades".into()]);
    for (business, sum) in &by_business {
        rows.push(vec![business.clone(), format_quantity(*sum)]);
    }
    rows
}

/// The aggregate report as a plain workbook sheet.
pub fn report_xlsx(records: &[SalesRecord]) -> Result<Vec<u8>, DashboardError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name("Reporte Analisis")?;
    worksheet.set_column_width(0, 32.0)?;
    worksheet.set_column_width(1, 18.0)?;

    for (r, row) in report_rows(records).iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            worksheet.write_string(r as u32, c as u16, value)?;
        }
    }
    Ok(workbook.save_to_buffer()?)
}
