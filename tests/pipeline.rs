//! End-to-end pipeline coverage: messy workbook in, canonical records and
//! exports out, all over the in-memory store.

use rust_xlsxwriter::Workbook;

use frijolitos::ingest;
use frijolitos::store::{MemoryStore, SalesStore};
use frijolitos::{analytics, export, geo};

/// A workbook the way they actually arrive: accented headers, the legacy
/// salesperson column name, Latin American number formatting and mixed
/// date formats.
fn messy_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name("Hoja1").unwrap();

    let headers = ["Cliente/Usuario", "CIUDAD", "Tipo de Negocio", "Presentación", "Ventas", "Fecha de Venta"];
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header).unwrap();
    }

    worksheet.write_string(1, 0, "María López").unwrap();
    worksheet.write_string(1, 1, "La Ceiba").unwrap();
    worksheet.write_string(1, 2, "Pulpería").unwrap();
    worksheet.write_string(1, 3, "500g").unwrap();
    worksheet.write_string(1, 4, "1.234,56").unwrap();
    worksheet.write_string(1, 5, "15/01/2024").unwrap();

    worksheet.write_string(2, 0, "Carlos Ruiz").unwrap();
    worksheet.write_string(2, 1, "El Porvenir").unwrap();
    worksheet.write_string(2, 2, "Supermercado").unwrap();
    worksheet.write_string(2, 3, "1kg").unwrap();
    worksheet.write_number(2, 4, 800.0).unwrap();
    worksheet.write_string(2, 5, "2024-02-10").unwrap();

    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn upload_normalizes_persists_and_aggregates() {
    let store = MemoryStore::new();
    let inserted = ingest::ingest_workbook(&store, "owner-1", "enero.xlsx", &messy_workbook())
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let records = store.select_by_owner("owner-1").await.unwrap();
    assert_eq!(records.len(), 2);

    // Legacy header synonyms resolve and values are canonical.
    let maria = records.iter().find(|r| r.salesperson == "María López").unwrap();
    assert_eq!(maria.quantity, 1234.56);
    assert_eq!(maria.date, "2024-01-15");
    assert_eq!(maria.source_file, "enero.xlsx");

    let kpis = analytics::kpis(&records);
    assert_eq!(kpis.total_records, 2);
    assert!((kpis.total_quantity - 2034.56).abs() < 1e-9);
    assert_eq!(kpis.active_cities, 2);

    let months = analytics::monthly_series(&records);
    assert_eq!(months[0].0, "2024-01");
    assert_eq!(months[1].0, "2024-02");

    // Both cities land on the heatmap with full intensity.
    let points = geo::heat_points(&records);
    assert_eq!(points.iter().filter(|p| p.count == 1).count(), 2);
}

#[tokio::test]
async fn exported_workbook_reingests_to_the_same_records() {
    let store = MemoryStore::new();
    ingest::ingest_workbook(&store, "owner-1", "enero.xlsx", &messy_workbook())
        .await
        .unwrap();
    let original = store.select_by_owner("owner-1").await.unwrap();

    let exported = export::to_xlsx(&original).unwrap();
    let inserted = ingest::ingest_workbook(&store, "owner-2", "reimport.xlsx", &exported)
        .await
        .unwrap();
    assert_eq!(inserted, original.len());

    let reimported = store.select_by_owner("owner-2").await.unwrap();
    for record in &original {
        let twin = reimported
            .iter()
            .find(|r| r.salesperson == record.salesperson)
            .unwrap();
        assert_eq!(twin.city, record.city);
        assert_eq!(twin.business, record.business);
        assert_eq!(twin.presentation, record.presentation);
        assert_eq!(twin.quantity, record.quantity);
        assert_eq!(twin.date, record.date);
    }
}

#[tokio::test]
async fn the_template_itself_is_ingestible() {
    let store = MemoryStore::new();
    let template = export::template_xlsx().unwrap();
    let inserted = ingest::ingest_workbook(&store, "owner-1", "plantilla.xlsx", &template)
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let records = store.select_by_owner("owner-1").await.unwrap();
    assert_eq!(records[0].salesperson, "Juan Pérez");
    assert_eq!(records[0].quantity, 1200.0);
}
