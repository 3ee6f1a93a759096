//! End-to-end integration tests for edgequake-pdf2csv.
//!
//! The document tests open real PDFs in `./test_cases/` through pdfium and
//! run tesseract (or a scripted engine). They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test e2e -- --nocapture
//!
//! Expected files:
//!   test_cases/scanned_invoice.pdf   one page, one full-page scan of an invoice
//!   test_cases/digital_invoice.pdf   generated invoice with a text layer, no images

use edgequake_pdf2csv::{
    extract, extract_from_bytes, extract_stream, extract_to_csv_file, inspect, ExtractedImage,
    ExtractionConfig, ExtractionMode, InvoiceField, OcrEngine, OcrError, PageSelection,
    Pdf2CsvError, Recognition, TableLayout,
};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Returns the same invoice text for every image.
struct ScriptedEngine(&'static str);

impl OcrEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn recognize<'a>(
        &'a self,
        _image: &'a ExtractedImage,
    ) -> BoxFuture<'a, Result<Recognition, OcrError>> {
        Box::pin(async move { Ok(Recognition::text(self.0)) })
    }
}

const SCRIPTED_INVOICE: &str = "ACME Supplies Ltd\n\nInvoice No: INV-2024-001\nInvoice Date: 2024-03-15\n\nBill To:\nGlobex Corp\n1 Main St\n\nTotal: $1,250.00\n";

fn scripted_config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .engine(Arc::new(ScriptedEngine(SCRIPTED_INVOICE)))
        .paragraph(false)
        .build()
        .unwrap()
}

// ── Input errors (no pdfium needed) ──────────────────────────────────────────

#[tokio::test]
async fn test_extract_nonexistent() {
    let err = extract("/definitely/not/a/real/file.pdf", &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2CsvError::FileNotFound { .. }), "{err}");
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    let result = inspect("/definitely/not/a/real/file.pdf", &ExtractionConfig::default()).await;
    assert!(result.is_err(), "inspect() should return Err for nonexistent file");
}

#[tokio::test]
async fn test_bytes_that_are_not_a_pdf() {
    let err = extract_from_bytes(b"GIF89a....", "cat.gif", &ExtractionConfig::default())
        .await
        .unwrap_err();
    match err {
        Pdf2CsvError::NotAPdf { magic, .. } => assert_eq!(&magic, b"GIF8"),
        other => panic!("unexpected: {other}"),
    }
}

// ── Page selection ───────────────────────────────────────────────────────────

#[test]
fn test_page_selection_out_of_range_is_empty() {
    assert_eq!(PageSelection::Single(100).to_indices(4), Vec::<usize>::new());
}

#[test]
fn test_page_selection_set_dedup_and_sort() {
    let indices = PageSelection::Set(vec![3, 1, 3, 2]).to_indices(5);
    assert_eq!(indices, vec![0, 1, 2]);
}

// ── Documents (need pdfium) ──────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_scanned_invoice() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_invoice.pdf"));

    let meta = inspect(path.to_str().unwrap(), &ExtractionConfig::default())
        .await
        .expect("inspect() should succeed");
    assert!(meta.page_count >= 1);
    assert!(!meta.pdf_version.is_empty());
}

#[tokio::test]
async fn test_scanned_invoice_with_scripted_engine() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_invoice.pdf"));

    let output = extract(path.to_str().unwrap(), &scripted_config())
        .await
        .expect("extract() should succeed");

    assert_eq!(output.file_name, "scanned_invoice.pdf");
    assert!(output.stats.images_found >= 1, "expected an embedded scan");
    assert_eq!(output.stats.images_failed, 0);
    assert!(output.images.iter().all(|m| m.width >= 16 && m.height >= 16));
    assert_eq!(output.invoice.get(InvoiceField::InvoiceNumber), Some("INV-2024-001"));
    assert_eq!(output.invoice.get(InvoiceField::Total), Some("$1,250.00"));
    assert!(output.lines.iter().all(|l| l.image_num.is_some()));
}

#[tokio::test]
async fn test_scanned_invoice_with_tesseract() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_invoice.pdf"));

    let output = extract(path.to_str().unwrap(), &ExtractionConfig::default())
        .await
        .expect("extract() should succeed with tesseract installed");
    assert!(output.stats.line_count > 0, "tesseract produced no text");
    println!("{:#?}", output.invoice);
}

#[tokio::test]
async fn test_digital_invoice_text_mode() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("digital_invoice.pdf"));

    let config = ExtractionConfig::builder()
        .mode(ExtractionMode::Text)
        .build()
        .unwrap();
    let output = extract(path.to_str().unwrap(), &config).await.unwrap();
    assert_eq!(output.stats.images_found, 0);
    assert!(output.stats.text_layer_pages >= 1);
    assert!(output.lines.iter().all(|l| l.image_num.is_none()));
    assert!(!output.invoice.is_empty(), "no fields in {:?}", output.text());
}

#[tokio::test]
async fn test_digital_invoice_images_mode_has_no_lines() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("digital_invoice.pdf"));

    // No images means the engine is never consulted, even a broken one.
    let config = ExtractionConfig::builder()
        .tesseract_path("/nonexistent/tesseract")
        .build()
        .unwrap();
    let output = extract(path.to_str().unwrap(), &config).await.unwrap();
    assert!(output.lines.is_empty());
    assert!(output.invoice.is_empty());
}

#[tokio::test]
async fn test_page_out_of_range() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_invoice.pdf"));

    let config = ExtractionConfig::builder()
        .pages(PageSelection::Single(999))
        .engine(Arc::new(ScriptedEngine("")))
        .build()
        .unwrap();
    let err = extract(path.to_str().unwrap(), &config).await.unwrap_err();
    assert!(matches!(err, Pdf2CsvError::PageOutOfRange { page: 999, .. }), "{err}");
}

#[tokio::test]
async fn test_stream_yields_every_image() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_invoice.pdf"));

    let config = scripted_config();
    let expected = extract(path.to_str().unwrap(), &config)
        .await
        .unwrap()
        .stats
        .images_found;

    let stream = extract_stream(path.to_str().unwrap(), &config).await.unwrap();
    let results: Vec<_> = stream.collect().await;
    assert_eq!(results.len(), expected);
    assert!(results.iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn test_csv_file_for_many_documents() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned_invoice.pdf"));
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("invoices.csv");
    let input = path.to_str().unwrap();

    let stats = extract_to_csv_file(
        &[input, "/missing/other.pdf", input],
        &out,
        TableLayout::Invoice,
        &scripted_config(),
    )
    .await
    .unwrap();
    assert_eq!(stats.len(), 2, "the missing document is skipped");

    let csv = std::fs::read_to_string(&out).unwrap();
    let mut rows = csv.lines();
    assert!(rows.next().unwrap().starts_with("File,Invoice Number,Invoice Date"));
    assert_eq!(rows.count(), 2);
    assert!(csv.contains("scanned_invoice.pdf,INV-2024-001,2024-03-15"));
}
