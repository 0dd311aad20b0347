//! PDF rendering of the analysis report: KPI summary, the ranked city and
//! business tables, then every dashboard chart on its own page.

use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerIndex, PdfPageIndex,
};

use crate::charts::{self, ChartImage};
use crate::error::DashboardError;
use crate::export;
use crate::record::SalesRecord;

const PAGE_WIDTH: f64 = 210.0;
const PAGE_HEIGHT: f64 = 297.0;
const MARGIN: f64 = 18.0;
const FOOTER_HEIGHT: f64 = 14.0;
const LINE_HEIGHT: f64 = 7.0;
const CHART_DPI: f64 = 300.0;

fn export_err<E: std::fmt::Display>(e: E) -> DashboardError {
    DashboardError::Export(e.to_string())
}

/// Page cursor over the document. Text flows top-down with automatic page
/// breaks; printpdf itself addresses from the bottom-left corner.
struct PdfWriter {
    doc: PdfDocumentReference,
    pages: Vec<(PdfPageIndex, PdfLayerIndex)>,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the top edge, in millimetres.
    y: f64,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, DashboardError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "contenido");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(export_err)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(export_err)?;
        Ok(Self {
            doc,
            pages: vec![(page, layer)],
            regular,
            bold,
            y: MARGIN,
        })
    }

    fn current_layer(&self) -> printpdf::PdfLayerReference {
        let (page, layer) = *self.pages.last().unwrap_or(&self.pages[0]);
        self.doc.get_page(page).get_layer(layer)
    }

    fn add_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "contenido");
        self.pages.push((page, layer));
        self.y = MARGIN;
    }

    /// Breaks the page unless `needed` millimetres still fit above the
    /// footer band.
    fn ensure_space(&mut self, needed: f64) {
        if self.y + needed > PAGE_HEIGHT - MARGIN - FOOTER_HEIGHT {
            self.add_page();
        }
    }

    fn text(&mut self, text: &str, size: f64, bold: bool, indent: f64) {
        self.ensure_space(LINE_HEIGHT);
        let font = if bold { &self.bold } else { &self.regular };
        self.current_layer().use_text(
            text,
            size,
            Mm(MARGIN + indent),
            Mm(PAGE_HEIGHT - self.y - LINE_HEIGHT),
            font,
        );
        self.y += LINE_HEIGHT;
    }

    fn heading(&mut self, text: &str) {
        self.ensure_space(LINE_HEIGHT * 2.0);
        self.y += LINE_HEIGHT * 0.5;
        self.text(text, 13.0, true, 0.0);
        self.y += LINE_HEIGHT * 0.3;
    }

    /// Two-column row: label on the left, value right-aligned by a fixed
    /// second-column offset.
    fn table_row(&mut self, label: &str, value: &str, bold: bool) {
        self.ensure_space(LINE_HEIGHT);
        let font = if bold { &self.bold } else { &self.regular };
        let layer = self.current_layer();
        let baseline = Mm(PAGE_HEIGHT - self.y - LINE_HEIGHT);
        layer.use_text(label, 11.0, Mm(MARGIN + 2.0), baseline, font);
        layer.use_text(value, 11.0, Mm(MARGIN + 90.0), baseline, font);
        self.y += LINE_HEIGHT;
    }

    /// Embeds a chart PNG scaled to the printable width, with its title as
    /// a caption. Charts always start on a fresh region tall enough to
    /// hold them.
    fn chart(&mut self, chart: &ChartImage) -> Result<(), DashboardError> {
        let target_width = PAGE_WIDTH - 2.0 * MARGIN;
        let natural_width = chart.width as f64 * 25.4 / CHART_DPI;
        let scale = target_width / natural_width;
        let height_mm = chart.height as f64 * 25.4 / CHART_DPI * scale;

        self.ensure_space(height_mm + LINE_HEIGHT * 2.5);
        self.text(&chart.title, 13.0, true, 0.0);
        self.y += LINE_HEIGHT * 0.3;

        let dynamic = printpdf::image_crate::load_from_memory(&chart.png).map_err(export_err)?;
        let image = Image::from_dynamic_image(&dynamic);
        image.add_to_layer(
            self.current_layer(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN)),
                translate_y: Some(Mm(PAGE_HEIGHT - self.y - height_mm)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(CHART_DPI),
                ..Default::default()
            },
        );
        self.y += height_mm + LINE_HEIGHT;
        Ok(())
    }

    /// Stamps "Página i de N" on every page and serializes the document.
    fn finish(self) -> Result<Vec<u8>, DashboardError> {
        let total = self.pages.len();
        for (i, (page, layer)) in self.pages.iter().enumerate() {
            self.doc.get_page(*page).get_layer(*layer).use_text(
                format!("Página {} de {}", i + 1, total),
                9.0,
                Mm(PAGE_WIDTH / 2.0 - 12.0),
                Mm(8.0),
                &self.regular,
            );
        }
        self.doc.save_to_bytes().map_err(export_err)
    }
}

/// Renders the full analysis report as PDF bytes.
pub fn report_pdf(records: &[SalesRecord]) -> Result<Vec<u8>, DashboardError> {
    let mut writer = PdfWriter::new("Reporte de Análisis")?;

    for row in export::report_rows(records) {
        match row.len() {
            0 => writer.y += LINE_HEIGHT * 0.5,
            1 if writer.y <= MARGIN + LINE_HEIGHT => {
                // Document title on the first line.
                writer.text(&row[0], 16.0, true, 0.0);
                writer.y += LINE_HEIGHT * 0.5;
            }
            1 => writer.heading(&row[0]),
            _ => {
                let header = row[1] == "Total Unidades";
                writer.table_row(&row[0], &row[1], header);
            }
        }
    }

    for chart in charts::dashboard_charts(records) {
        writer.chart(&chart)?;
    }

    writer.finish()
}
