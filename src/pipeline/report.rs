use std::io::BufWriter;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use printpdf::image_crate::GenericImageView;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{DiagnosisError, Result};
use crate::models::DiagnosisRecord;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 15.0;
const TOP_Y: f32 = 280.0;

/// Bounded region the embedded photograph must fit into, in mm.
const IMAGE_MAX_WIDTH: f32 = 170.0;
const IMAGE_MAX_HEIGHT: f32 = 105.0;
const IMAGE_DPI: f32 = 300.0;

/// Assembles the full report PDF in memory. Pure CPU work; callers offload it
/// with `spawn_blocking`.
pub fn render_report(record: &DiagnosisRecord, image: Option<&str>) -> Result<Vec<u8>> {
    let mut writer = ReportWriter::new("Crop Analysis Report")?;

    writer.title("Crop Analysis Report");
    writer.line(
        &format!("Date: {}", chrono::Utc::now().format("%Y-%m-%d")),
        14.0,
    );
    writer.gap(4.0);

    writer.line(&format!("Disease: {}", record.disease), 16.0);
    writer.line(&format!("Severity: {:?}", record.severity), 14.0);
    writer.line(
        &format!("Confidence: {:.1}%", record.confidence * 100.0),
        14.0,
    );
    writer.line(&format!("Crop Type: {}", record.crop_type), 14.0);
    writer.line(&format!("Affected Area: {}", record.affected_area), 14.0);
    writer.line(&format!("Spread Risk: {:?}", record.spread_risk), 14.0);
    writer.line(&format!("Treatment Cost: {}", record.treatment_cost), 14.0);
    writer.gap(4.0);

    writer.heading("Treatment Recommendations:");
    writer.numbered_list(&record.recommendations);
    writer.gap(4.0);

    writer.heading("Prevention Tips:");
    writer.numbered_list(&record.prevention_tips);

    if let Some(data_url) = image {
        writer.embed_image(data_url)?;
    }

    writer.finish()
}

/// The report on disk, deleted on drop. Handed to the response only after the
/// write has fully flushed.
pub struct ReportFile {
    pub path: PathBuf,
    pub filename: String,
}

impl Drop for ReportFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove transient report {:?}: {}", self.path, e);
        }
    }
}

/// Writes the document to transient storage and waits for the flush/sync
/// signal before returning; the file is complete once this resolves.
pub async fn write_report_file(reports_dir: &Path, bytes: &[u8]) -> Result<ReportFile> {
    let io_err = |e: std::io::Error| DiagnosisError::ReportGeneration(e.to_string());

    tokio::fs::create_dir_all(reports_dir).await.map_err(io_err)?;

    let filename = format!(
        "crop_analysis_report_{}.pdf",
        chrono::Utc::now().timestamp_millis()
    );
    let report = ReportFile {
        path: reports_dir.join(&filename),
        filename,
    };

    let mut file = tokio::fs::File::create(&report.path).await.map_err(io_err)?;
    file.write_all(bytes).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;

    Ok(report)
}

struct ReportWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl ReportWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| DiagnosisError::ReportGeneration(format!("font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| DiagnosisError::ReportGeneration(format!("font error: {e}")))?;
        Ok(Self {
            doc,
            layer,
            font,
            bold,
            y: TOP_Y,
        })
    }

    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < MARGIN_BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP_Y;
        }
    }

    fn title(&mut self, text: &str) {
        // Rough centering; the builtin fonts expose no metrics.
        let approx_width = text.len() as f32 * 24.0 * 0.18;
        let x = ((PAGE_WIDTH - approx_width) / 2.0).max(MARGIN_LEFT);
        self.layer.use_text(text, 24.0, Mm(x), Mm(self.y), &self.bold);
        self.y -= 14.0;
    }

    fn heading(&mut self, text: &str) {
        self.ensure_space(10.0);
        self.layer
            .use_text(text, 16.0, Mm(MARGIN_LEFT), Mm(self.y), &self.bold);
        self.y -= 8.0;
    }

    fn line(&mut self, text: &str, size: f32) {
        for chunk in wrap_text(text, 90) {
            self.ensure_space(8.0);
            self.layer
                .use_text(chunk, size, Mm(MARGIN_LEFT), Mm(self.y), &self.font);
            self.y -= 7.0;
        }
    }

    fn numbered_list(&mut self, items: &[String]) {
        for (i, item) in items.iter().enumerate() {
            let text = format!("{}. {}", i + 1, item);
            for chunk in wrap_text(&text, 85) {
                self.ensure_space(7.0);
                self.layer
                    .use_text(chunk, 12.0, Mm(MARGIN_LEFT + 5.0), Mm(self.y), &self.font);
                self.y -= 6.0;
            }
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Decodes the data-URL photograph and places it after the text sections,
    /// scaled proportionally to fit the bounded region.
    fn embed_image(&mut self, data_url: &str) -> Result<()> {
        let bytes = decode_data_url(data_url)?;
        let decoded = printpdf::image_crate::load_from_memory(&bytes)
            .map_err(|e| DiagnosisError::ReportGeneration(format!("image decode failed: {e}")))?;

        let (px_w, px_h) = decoded.dimensions();
        let native_w = px_w as f32 * 25.4 / IMAGE_DPI;
        let native_h = px_h as f32 * 25.4 / IMAGE_DPI;
        let scale = (IMAGE_MAX_WIDTH / native_w).min(IMAGE_MAX_HEIGHT / native_h);
        let height = native_h * scale;

        self.gap(6.0);
        self.ensure_space(height + 4.0);
        self.y -= height;

        Image::from_dynamic_image(&decoded).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN_LEFT)),
                translate_y: Some(Mm(self.y)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| DiagnosisError::ReportGeneration(format!("save failed: {e}")))?;
        buf.into_inner()
            .map_err(|e| DiagnosisError::ReportGeneration(format!("buffer error: {e}")))
    }
}

/// Accepts both a full `data:<type>;base64,<payload>` URL and a bare base64
/// payload, matching what diagnosis responses hand back to callers.
fn decode_data_url(image: &str) -> Result<Vec<u8>> {
    let payload = match image.find("base64,") {
        Some(idx) => &image[idx + "base64,".len()..],
        None => image,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| DiagnosisError::ReportGeneration(format!("image decode failed: {e}")))
}

/// Greedy word wrap by character budget; builtin fonts expose no metrics.
/// Words longer than the budget are split at the budget so no line can
/// overflow the right margin.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            for c in word.chars() {
                if current_len == max_chars {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(c);
                current_len += 1;
            }
            continue;
        }

        if current_len > 0 && current_len + word_len + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if current_len > 0 {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Severity, SpreadRisk};
    use crate::pipeline::normalize::normalize;
    use std::io::Cursor;

    fn record() -> DiagnosisRecord {
        DiagnosisRecord {
            disease: "Leaf Blight".to_string(),
            confidence: 0.85,
            severity: Severity::Moderate,
            recommendations: vec!["A".to_string(), "B".to_string()],
            healthy: false,
            alternative_diseases: vec![],
            crop_type: "Tomato".to_string(),
            affected_area: "25-35%".to_string(),
            spread_risk: SpreadRisk::Medium,
            treatment_cost: "Varies".to_string(),
            prevention_tips: vec!["Rotate crops".to_string()],
        }
    }

    fn png_data_url() -> String {
        let img = printpdf::image_crate::DynamicImage::new_rgb8(8, 8);
        let mut bytes = Vec::new();
        img.write_to(
            &mut Cursor::new(&mut bytes),
            printpdf::image_crate::ImageOutputFormat::Png,
        )
        .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn renders_text_only_report() {
        let pdf = render_report(&record(), None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert!(pdf.len() > 500);
    }

    #[test]
    fn renders_report_with_embedded_image() {
        let data_url = png_data_url();
        let pdf = render_report(&record(), Some(&data_url)).unwrap();
        assert!(pdf.starts_with(b"%PDF"));

        // The image adds an XObject stream, so the document must grow.
        let without = render_report(&record(), None).unwrap();
        assert!(pdf.len() > without.len());
    }

    #[test]
    fn long_lists_spill_onto_additional_pages() {
        let mut many = record();
        many.recommendations = (0..120).map(|i| format!("recommendation {i}")).collect();
        let pdf = render_report(&many, None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn garbage_image_payload_is_a_report_error() {
        let err = render_report(&record(), Some("data:image/png;base64,@@@@")).unwrap_err();
        assert!(matches!(err, DiagnosisError::ReportGeneration(_)));

        // Valid base64 that is not an image fails at decode, not at save.
        let err = render_report(&record(), Some(&STANDARD.encode(b"not an image"))).unwrap_err();
        assert!(matches!(err, DiagnosisError::ReportGeneration(_)));
    }

    #[test]
    fn report_survives_any_normalized_record() {
        // The report endpoint re-normalizes loose input before rendering, so
        // rendering the all-defaults record must work.
        let pdf = render_report(&normalize(&serde_json::json!({})), None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn wrap_text_respects_budget() {
        let wrapped = wrap_text("one two three four five", 9);
        assert_eq!(wrapped, vec!["one two", "three", "four five"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }

    #[test]
    fn wrap_text_splits_words_longer_than_the_budget() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);

        let wrapped = wrap_text("aa bbbbbbb cc", 4);
        assert_eq!(wrapped, vec!["aa", "bbbb", "bbb", "cc"]);
        assert!(wrapped.iter().all(|line| line.chars().count() <= 4));
    }

    #[test]
    fn decode_accepts_prefixed_and_bare_payloads() {
        assert_eq!(decode_data_url("data:image/png;base64,QUJD").unwrap(), b"ABC");
        assert_eq!(decode_data_url("QUJD").unwrap(), b"ABC");
        assert!(decode_data_url("data:image/png;base64,!!").is_err());
    }

    #[tokio::test]
    async fn transient_file_is_synced_then_deleted() {
        let dir = std::env::temp_dir().join(format!("report-test-{}", uuid::Uuid::new_v4()));
        let report = write_report_file(&dir, b"%PDF-fake").await.unwrap();
        let path = report.path.clone();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-fake");
        assert!(report.filename.ends_with(".pdf"));

        drop(report);
        assert!(!path.exists());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
