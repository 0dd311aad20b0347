//! Chart rendering for the analytics report. Each chart draws into an
//! in-memory RGB buffer and is encoded to PNG, so concurrent requests
//! never contend on a shared temp file.

use image::{ImageOutputFormat, RgbImage};
use plotters::element::Pie;
use plotters::prelude::*;
use std::io::Cursor;

use crate::analytics;
use crate::error::DashboardError;
use crate::record::SalesRecord;

const CHART_WIDTH: u32 = 800;
const CHART_HEIGHT: u32 = 600;

/// A rendered chart ready to embed in the PDF report.
pub struct ChartImage {
    pub title: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn chart_err<E: std::fmt::Display>(e: E) -> DashboardError {
    DashboardError::Chart(e.to_string())
}

/// Encodes a raw RGB buffer as PNG.
fn encode_png(buffer: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>, DashboardError> {
    let img = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| DashboardError::Chart("rendered buffer has the wrong size".into()))?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
        .map_err(chart_err)?;
    Ok(png)
}

fn palette(i: usize) -> RGBColor {
    const COLORS: [RGBColor; 6] = [
        RGBColor(59, 130, 246),
        RGBColor(16, 185, 129),
        RGBColor(245, 158, 11),
        RGBColor(239, 68, 68),
        RGBColor(139, 92, 246),
        RGBColor(20, 184, 166),
    ];
    COLORS[i % COLORS.len()]
}

/// Units per month as a line with point markers.
pub fn monthly_trend(records: &[SalesRecord]) -> Result<ChartImage, DashboardError> {
    let series = analytics::monthly_series(records);
    if series.is_empty() {
        return Err(DashboardError::Chart("no dated records to plot".into()));
    }
    let max_y = series.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let labels: Vec<String> = series.iter().map(|(m, _)| m.clone()).collect();

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Tendencia por Mes", ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5f64..series.len() as f64 - 0.5, 0.0..max_y * 1.1 + 1.0)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .x_labels(series.len())
            .x_label_formatter(&|x| {
                let i = x.round() as usize;
                labels.get(i).cloned().unwrap_or_default()
            })
            .y_desc("Unidades")
            .draw()
            .map_err(chart_err)?;

        chart
            .draw_series(LineSeries::new(
                series.iter().enumerate().map(|(i, (_, v))| (i as f64, *v)),
                &palette(0),
            ))
            .map_err(chart_err)?;
        chart
            .draw_series(
                series
                    .iter()
                    .enumerate()
                    .map(|(i, (_, v))| Circle::new((i as f64, *v), 4, palette(0).filled())),
            )
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    Ok(ChartImage {
        title: "Tendencia por Mes".into(),
        png: encode_png(buffer, CHART_WIDTH, CHART_HEIGHT)?,
        width: CHART_WIDTH,
        height: CHART_HEIGHT,
    })
}

/// Units per business type as a pie.
pub fn business_pie(records: &[SalesRecord]) -> Result<ChartImage, DashboardError> {
    let groups = analytics::by_business(records);
    let sizes: Vec<f64> = groups.iter().map(|(_, v)| *v).filter(|v| *v > 0.0).collect();
    if sizes.is_empty() {
        return Err(DashboardError::Chart("no units to plot".into()));
    }
    let labels: Vec<String> = groups
        .iter()
        .filter(|(_, v)| *v > 0.0)
        .map(|(k, _)| k.clone())
        .collect();
    let colors: Vec<RGBColor> = (0..sizes.len()).map(palette).collect();

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;
        let plot = root
            .titled("Unidades por Tipo de Negocio", ("sans-serif", 30).into_font())
            .map_err(chart_err)?;

        let center = ((CHART_WIDTH / 2) as i32, (CHART_HEIGHT / 2) as i32);
        let radius = (CHART_HEIGHT / 3) as f64;
        let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
        pie.label_style(("sans-serif", 18).into_font());
        plot.draw(&pie).map_err(chart_err)?;

        plot.present().map_err(chart_err)?;
    }

    Ok(ChartImage {
        title: "Unidades por Tipo de Negocio".into(),
        png: encode_png(buffer, CHART_WIDTH, CHART_HEIGHT)?,
        width: CHART_WIDTH,
        height: CHART_HEIGHT,
    })
}

/// Units per city as vertical bars.
pub fn city_bars(records: &[SalesRecord]) -> Result<ChartImage, DashboardError> {
    let groups = analytics::by_city(records);
    if groups.is_empty() {
        return Err(DashboardError::Chart("no records to plot".into()));
    }
    let max_y = groups.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let labels: Vec<String> = groups.iter().map(|(k, _)| k.clone()).collect();

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Unidades por Ciudad", ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5f64..groups.len() as f64 - 0.5, 0.0..max_y * 1.1 + 1.0)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .x_labels(groups.len())
            .x_label_formatter(&|x| {
                let i = x.round() as usize;
                labels.get(i).cloned().unwrap_or_default()
            })
            .y_desc("Unidades")
            .draw()
            .map_err(chart_err)?;

        chart
            .draw_series(groups.iter().enumerate().map(|(i, (_, v))| {
                Rectangle::new(
                    [(i as f64 - 0.35, 0.0), (i as f64 + 0.35, *v)],
                    palette(i).filled(),
                )
            }))
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    Ok(ChartImage {
        title: "Unidades por Ciudad".into(),
        png: encode_png(buffer, CHART_WIDTH, CHART_HEIGHT)?,
        width: CHART_WIDTH,
        height: CHART_HEIGHT,
    })
}

/// Label for an axis row in a ranked horizontal chart. Rank 0 is drawn at
/// the top row (the highest y value), so the axis reads the ranking in the
/// same top-down order as the bars.
fn ranked_row_label(labels: &[String], y: f64) -> String {
    let row = y.round() as i64;
    if row < 0 || row >= labels.len() as i64 {
        return String::new();
    }
    labels[(labels.len() as i64 - 1 - row) as usize].clone()
}

/// Top salespeople as horizontal bars, largest on top.
pub fn top_seller_bars(records: &[SalesRecord]) -> Result<ChartImage, DashboardError> {
    let top = analytics::top_salespeople(records);
    if top.is_empty() {
        return Err(DashboardError::Chart("no records to plot".into()));
    }
    let max_x = top.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let labels: Vec<String> = top.iter().map(|(k, _)| k.clone()).collect();

    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Top Vendedores", ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(140)
            .build_cartesian_2d(0.0..max_x * 1.1 + 1.0, -0.5f64..top.len() as f64 - 0.5)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .y_labels(top.len())
            .y_label_formatter(&|y| ranked_row_label(&labels, *y))
            .x_desc("Unidades")
            .draw()
            .map_err(chart_err)?;

        // Row 0 is drawn at the top so the ranking reads downward.
        chart
            .draw_series(top.iter().enumerate().map(|(i, (_, v))| {
                let y = (top.len() - 1 - i) as f64;
                Rectangle::new([(0.0, y - 0.35), (*v, y + 0.35)], palette(0).filled())
            }))
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    Ok(ChartImage {
        title: "Top Vendedores".into(),
        png: encode_png(buffer, CHART_WIDTH, CHART_HEIGHT)?,
        width: CHART_WIDTH,
        height: CHART_HEIGHT,
    })
}

/// All report charts in presentation order. A chart that cannot be drawn
/// (for instance, no dated records for the trend) is skipped with a
/// warning rather than failing the whole report.
pub fn dashboard_charts(records: &[SalesRecord]) -> Vec<ChartImage> {
    let attempts = [
        monthly_trend(records),
        business_pie(records),
        city_bars(records),
        top_seller_bars(records),
    ];
    attempts
        .into_iter()
        .filter_map(|result| match result {
            Ok(chart) => Some(chart),
            Err(e) => {
                log::warn!("skipping report chart: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(salesperson: &str, city: &str, business: &str, quantity: f64, date: &str) -> SalesRecord {
        SalesRecord {
            id: None,
            salesperson: salesperson.into(),
            city: city.into(),
            business: business.into(),
            presentation: "500g".into(),
            quantity,
            date: date.into(),
            owner_id: "o".into(),
            source_file: String::new(),
        }
    }

    fn sample() -> Vec<SalesRecord> {
        vec![
            record("Ana", "La Ceiba", "Tienda", 120.0, "2024-01-05"),
            record("Luis", "El Porvenir", "Supermercado", 80.0, "2024-02-10"),
            record("Ana", "La Ceiba", "Tienda", 40.0, "2024-02-15"),
        ]
    }

    #[test]
    fn every_chart_renders_a_png() {
        let records = sample();
        let charts = dashboard_charts(&records);
        assert_eq!(charts.len(), 4);
        for chart in charts {
            // PNG magic bytes.
            assert_eq!(&chart.png[..4], &[0x89, b'P', b'N', b'G']);
            assert_eq!(chart.width, 800);
            assert_eq!(chart.height, 600);
        }
    }

    #[test]
    fn ranked_axis_labels_follow_the_bar_rows() {
        let labels = vec!["Ana".to_string(), "Bo".to_string(), "Cata".to_string()];
        // Rank 0 is the top row, at the highest y value.
        assert_eq!(ranked_row_label(&labels, 2.0), "Ana");
        assert_eq!(ranked_row_label(&labels, 1.0), "Bo");
        assert_eq!(ranked_row_label(&labels, 0.0), "Cata");
        // Off-axis values print nothing.
        assert_eq!(ranked_row_label(&labels, 5.0), "");
        assert_eq!(ranked_row_label(&labels, -1.0), "");
    }

    #[test]
    fn undated_records_drop_the_trend_chart_only() {
        let records = vec![record("Ana", "La Ceiba", "Tienda", 10.0, "sin fecha")];
        let charts = dashboard_charts(&records);
        let titles: Vec<&str> = charts.iter().map(|c| c.title.as_str()).collect();
        assert!(!titles.contains(&"Tendencia por Mes"));
        assert!(titles.contains(&"Unidades por Ciudad"));
    }
}
