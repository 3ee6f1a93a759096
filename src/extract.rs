//! Eager (whole-document) extraction entry points.
//!
//! These wait for every image of a document to finish OCR, then segment the
//! text into invoice fields. Use [`crate::stream::extract_stream`] to receive
//! image results as they complete instead.

use crate::config::{ExtractionConfig, ExtractionMode, PageSelection};
use crate::error::Pdf2CsvError;
use crate::fields;
use crate::output::{
    DocumentMetadata, ExtractionOutput, ExtractionStats, ImageMetadata, ImageResult,
    LineSource, TextLine,
};
use crate::pipeline::extract::{self as pdf, ExtractedImage};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::{ocr, postprocess};
use crate::table::{Table, TableLayout};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract text and invoice fields from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ExtractionOutput)` on success, even if some images failed OCR
/// (check `output.failures`). A document without embedded images yields an
/// output with no lines.
///
/// # Errors
/// Returns `Err(Pdf2CsvError)` only for fatal errors:
/// - File not found / permission denied / not a PDF
/// - Wrong or missing password
/// - OCR engine unavailable
/// - Every image failed OCR
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2CsvError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    extract_resolved(&resolved, config).await
}

/// Extract from PDF bytes held in memory.
///
/// `file_name` fills the `File` column. The bytes are staged in a temporary
/// directory that is removed before this function returns.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2csv::{extract_from_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("invoice.pdf")?;
/// let output = extract_from_bytes(&bytes, "invoice.pdf", &ExtractionConfig::default()).await?;
/// for (field, value) in output.invoice.iter() {
///     println!("{field}: {value}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_from_bytes(
    bytes: &[u8],
    file_name: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2CsvError> {
    let resolved = input::resolve_bytes(bytes, file_name).await?;
    extract_resolved(&resolved, config).await
}

/// Extract several documents one after another.
///
/// A failing document is logged and its error returned in its slot; the
/// remaining documents are still processed. Results are in input order.
pub async fn extract_many<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Vec<Result<ExtractionOutput, Pdf2CsvError>> {
    let mut results = Vec::with_capacity(inputs.len());
    for (i, input_str) in inputs.iter().enumerate() {
        let input_str = input_str.as_ref();
        debug!("Document {}/{}: {}", i + 1, inputs.len(), input_str);
        let result = extract(input_str, config).await;
        if let Err(ref e) = result {
            warn!("Skipping '{}': {}", input_str, e);
        }
        results.push(result);
    }
    results
}

/// Extract several documents and write one CSV table for all of them.
///
/// Documents that fail are left out of the table. Fails only when every
/// document failed (with the first error) or the file cannot be written.
///
/// # Returns
/// Statistics of the documents that made it into the table.
pub async fn extract_to_csv_file<S: AsRef<str>>(
    inputs: &[S],
    output_path: impl AsRef<Path>,
    layout: TableLayout,
    config: &ExtractionConfig,
) -> Result<Vec<ExtractionStats>, Pdf2CsvError> {
    if inputs.is_empty() {
        return Err(Pdf2CsvError::InvalidConfig("No input documents".into()));
    }

    let mut outputs = Vec::with_capacity(inputs.len());
    let mut first_err = None;
    for result in extract_many(inputs, config).await {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) if first_err.is_none() => first_err = Some(e),
            Err(_) => {}
        }
    }

    if outputs.is_empty() {
        if let Some(e) = first_err {
            return Err(e);
        }
    }

    let table = Table::build(layout, &outputs);
    write_csv_file(output_path.as_ref(), &table.to_csv()).await?;
    Ok(outputs.into_iter().map(|o| o.stats).collect())
}

/// Write `csv` to `path` atomically (temp file + rename).
pub async fn write_csv_file(path: &Path, csv: &str) -> Result<(), Pdf2CsvError> {
    let write_err = |e| Pdf2CsvError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp_path, csv).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} bytes to {}", csv.len(), path.display());
    Ok(())
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2CsvError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2CsvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Read PDF metadata without extracting content or running OCR.
///
/// Only `password` and `download_timeout_secs` of `config` are used.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentMetadata, Pdf2CsvError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    pdf::extract_metadata(resolved.path(), config.password.as_deref()).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn extract_resolved(
    resolved: &ResolvedInput,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2CsvError> {
    let total_start = Instant::now();
    let file_name = resolved.file_name().to_string();

    // ── Step 1: Metadata and page selection ──────────────────────────────
    let (metadata, page_indices) = select_pages(resolved.path(), config).await?;

    // ── Step 2: Pull images / text out of the PDF ────────────────────────
    let extract_start = Instant::now();
    let pages = pdf::extract_content(resolved.path(), config, &page_indices).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    let PageTally {
        images,
        text_pages,
        images_skipped,
    } = tally_pages(pages);
    let image_meta: Vec<ImageMetadata> = images.iter().map(ExtractedImage::metadata).collect();
    info!(
        "{}: {} images, {} text-layer pages in {}ms",
        file_name,
        images.len(),
        text_pages.len(),
        extract_duration_ms
    );

    if images.is_empty() && config.mode == ExtractionMode::Images {
        warn!("No embedded images found in '{}'", file_name);
    }

    // ── Step 3: OCR ──────────────────────────────────────────────────────
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(images.len());
    }

    let ocr_start = Instant::now();
    let results = if images.is_empty() {
        Vec::new()
    } else {
        let engine = ocr::resolve_engine(config).await?;
        ocr::recognize_images(engine.as_ref(), &images, config).await
    };
    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
    drop(images);

    let recognised = results.iter().filter(|r| r.error.is_none()).count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(results.len(), recognised);
    }

    if !results.is_empty() && recognised == 0 {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(Pdf2CsvError::AllImagesFailed {
            total: results.len(),
            first_error,
        });
    }

    // ── Step 4: Lines in page order ──────────────────────────────────────
    let text_pages: Vec<(usize, String)> = text_pages
        .into_iter()
        .map(|(page, raw)| (page, postprocess::clean_ocr_text(&raw)))
        .collect();
    let lines = assemble_lines(&results, &text_pages);

    // ── Step 5: Field segmentation ───────────────────────────────────────
    let invoice = fields::segment(&document_text(&results, &text_pages));
    debug!("{}: {} invoice fields found", file_name, invoice.found_count());

    // ── Step 6: Stats ────────────────────────────────────────────────────
    let stats = ExtractionStats {
        total_pages: metadata.page_count,
        selected_pages: page_indices.len(),
        images_found: results.len(),
        images_recognised: recognised,
        images_failed: results.len() - recognised,
        images_skipped,
        text_layer_pages: text_pages.len(),
        line_count: lines.len(),
        fields_found: invoice.found_count(),
        input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
        output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
        extract_duration_ms,
        ocr_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {} lines, {} fields, {}ms total",
        stats.line_count, stats.fields_found, stats.total_duration_ms
    );

    let failures = results.into_iter().filter_map(|r| r.error).collect();

    Ok(ExtractionOutput {
        file_name,
        metadata,
        images: image_meta,
        lines,
        invoice,
        failures,
        stats,
    })
}

struct PageTally {
    images: Vec<ExtractedImage>,
    /// (page number, raw text layer)
    text_pages: Vec<(usize, String)>,
    images_skipped: usize,
}

fn tally_pages(pages: Vec<pdf::PageContent>) -> PageTally {
    let mut tally = PageTally {
        images: Vec::new(),
        text_pages: Vec::new(),
        images_skipped: 0,
    };
    for page in pages {
        tally.images_skipped += page.skipped_images;
        tally.images.extend(page.images);
        if let Some(text) = page.text {
            tally.text_pages.push((page.page_num, text));
        }
    }
    tally
}

/// Read metadata and expand the page selection against the real page count.
pub(crate) async fn select_pages(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<(DocumentMetadata, Vec<usize>), Pdf2CsvError> {
    let metadata = pdf::extract_metadata(pdf_path, config.password.as_deref()).await?;
    let total_pages = metadata.page_count;

    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(Pdf2CsvError::PageOutOfRange {
            page: first_requested_page(&config.pages),
            total: total_pages,
        });
    }
    debug!("Selected {} of {} pages", page_indices.len(), total_pages);
    Ok((metadata, page_indices))
}

fn first_requested_page(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 1,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

/// Cleaned text of every recognised image and text-layer page in page
/// order, one block per source separated by a blank line.
///
/// Segmentation needs the blank lines and line breaks that `split_lines`
/// removes, so it runs on this rather than on the table lines.
fn document_text(results: &[ImageResult], text_pages: &[(usize, String)]) -> String {
    let mut blocks: Vec<(usize, usize, &str)> = results
        .iter()
        .filter(|r| r.error.is_none())
        .map(|r| (r.page_num, r.image_num, r.text.as_str()))
        .chain(text_pages.iter().map(|(page, text)| (*page, 0, text.as_str())))
        .collect();
    blocks.sort_by_key(|&(page, image, _)| (page, image));

    blocks
        .into_iter()
        .map(|(_, _, text)| text.trim_end())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Merge OCR lines and text-layer lines into one page-ordered list.
///
/// `text_pages` holds cleaned text. The text layer keeps its own line
/// structure, so it is always split line by line regardless of the
/// paragraph setting.
fn assemble_lines(results: &[ImageResult], text_pages: &[(usize, String)]) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = results
        .iter()
        .filter(|r| r.error.is_none())
        .flat_map(|r| {
            r.lines.iter().map(move |text| TextLine {
                page_num: r.page_num,
                image_num: Some(r.image_num),
                source: LineSource::Ocr,
                text: text.clone(),
            })
        })
        .collect();

    for (page_num, text) in text_pages {
        lines.extend(
            ocr::split_lines(text, false)
                .into_iter()
                .map(|text| TextLine {
                    page_num: *page_num,
                    image_num: None,
                    source: LineSource::TextLayer,
                    text,
                }),
        );
    }

    // Stable: keeps line order within each image.
    lines.sort_by_key(|l| (l.page_num, l.image_num.unwrap_or(0)));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;

    fn result(page: usize, image: usize, lines: &[&str]) -> ImageResult {
        ImageResult {
            page_num: page,
            image_num: image,
            text: lines.join("\n"),
            lines: lines.iter().map(|s| s.to_string()).collect(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }

    #[test]
    fn lines_are_page_ordered() {
        let mut failed = result(1, 2, &["ignored"]);
        failed.error = Some(ImageError::Timeout {
            page: 1,
            image: 2,
            secs: 5,
        });
        let results = vec![
            result(1, 1, &["Invoice No: 7", "Bill To: ACME"]),
            failed,
            result(3, 1, &["Total: 5.00"]),
        ];
        let text_pages = vec![(2, postprocess::clean_ocr_text("Page two line\r\nsecond\r\n"))];

        let lines = assemble_lines(&results, &text_pages);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            ["Invoice No: 7", "Bill To: ACME", "Page two line", "second", "Total: 5.00"]
        );
        assert_eq!(lines[2].source, LineSource::TextLayer);
        assert_eq!(lines[2].image_num, None);
        assert_eq!(lines[4].image_num, Some(1));
    }

    #[test]
    fn first_requested_page_for_errors() {
        assert_eq!(first_requested_page(&PageSelection::Single(9)), 9);
        assert_eq!(first_requested_page(&PageSelection::Range(4, 6)), 4);
        assert_eq!(first_requested_page(&PageSelection::Set(vec![8, 5])), 5);
        assert_eq!(first_requested_page(&PageSelection::All), 1);
    }

    /// Returns a fixed text per page; page 0 is never asked for.
    struct PageEngine(Vec<&'static str>);

    impl ocr::OcrEngine for PageEngine {
        fn name(&self) -> &'static str {
            "page"
        }

        fn recognize<'a>(
            &'a self,
            image: &'a ExtractedImage,
        ) -> futures::future::BoxFuture<'a, Result<ocr::Recognition, crate::error::OcrError>>
        {
            Box::pin(async move { Ok(ocr::Recognition::text(self.0[image.page_num - 1])) })
        }
    }

    fn scan(page_num: usize) -> ExtractedImage {
        ExtractedImage {
            page_num,
            image_num: 1,
            image: image::DynamicImage::ImageLuma8(image::GrayImage::new(32, 32)),
        }
    }

    const LETTER: &str = "Invoice No: 77\n\nBill To:\nGlobex Corp\n1 Main St\n\nThank you for your business\nPlease pay promptly\n";
    const TABLE: &str = "Bill To:\nGlobex Corp\n1 Main St\nSpringfield\nUSA\nDescription Qty Price\nWidgets 10 125.00\n";

    #[tokio::test]
    async fn address_limits_hold_through_ocr_in_both_split_modes() {
        for paragraph in [true, false] {
            let config = ExtractionConfig::builder().paragraph(paragraph).build().unwrap();

            let results =
                ocr::recognize_images(&PageEngine(vec![LETTER]), &[scan(1)], &config).await;
            let invoice = fields::segment(&document_text(&results, &[]));
            assert_eq!(
                invoice.get(fields::InvoiceField::BillTo),
                Some("Globex Corp, 1 Main St"),
                "paragraph={paragraph}"
            );

            let results =
                ocr::recognize_images(&PageEngine(vec![TABLE]), &[scan(1)], &config).await;
            let invoice = fields::segment(&document_text(&results, &[]));
            assert_eq!(
                invoice.get(fields::InvoiceField::BillTo),
                Some("Globex Corp, 1 Main St, Springfield, USA"),
                "paragraph={paragraph}"
            );
        }
    }

    #[tokio::test]
    async fn auto_mode_mixes_ocr_and_text_layer_pages() {
        // Page 1 is a scan; page 2 had no image and fell back to its text layer.
        let config = ExtractionConfig::builder()
            .mode(ExtractionMode::Auto)
            .build()
            .unwrap();
        let results = ocr::recognize_images(
            &PageEngine(vec!["Invoice No: A-9\nDate: 2024-05-01\n"]),
            &[scan(1)],
            &config,
        )
        .await;
        let text_pages = vec![(
            2,
            postprocess::clean_ocr_text("Subtotal  90.00\r\nTotal Due  99.00\r\n"),
        )];

        let lines = assemble_lines(&results, &text_pages);
        let sources: Vec<_> = lines.iter().map(|l| (l.page_num, l.source)).collect();
        assert_eq!(
            sources,
            [
                (1, LineSource::Ocr),
                (2, LineSource::TextLayer),
                (2, LineSource::TextLayer)
            ]
        );
        assert_eq!(lines[0].text, "Invoice No: A-9 Date: 2024-05-01");

        let text = document_text(&results, &text_pages);
        assert_eq!(
            text,
            "Invoice No: A-9\nDate: 2024-05-01\n\nSubtotal  90.00\nTotal Due  99.00"
        );
        let invoice = fields::segment(&text);
        assert_eq!(invoice.get(fields::InvoiceField::InvoiceNumber), Some("A-9"));
        assert_eq!(invoice.get(fields::InvoiceField::Total), Some("99.00"));
    }

    #[test]
    fn tally_counts_skipped_images_and_text_pages() {
        let pages = vec![
            pdf::PageContent {
                page_num: 1,
                images: vec![scan(1)],
                text: None,
                skipped_images: 2,
            },
            pdf::PageContent {
                page_num: 2,
                images: vec![],
                text: Some("Total 5.00".into()),
                skipped_images: 1,
            },
        ];
        let tally = tally_pages(pages);
        assert_eq!(tally.images.len(), 1);
        assert_eq!(tally.images_skipped, 3);
        assert_eq!(tally.text_pages, vec![(2, "Total 5.00".to_string())]);
    }

    #[tokio::test]
    async fn inspect_honours_download_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = ExtractionConfig::builder()
            .download_timeout_secs(1)
            .build()
            .unwrap();
        let err = inspect(format!("http://{addr}/slow.pdf"), &config)
            .await
            .unwrap_err();
        assert!(
            matches!(err, Pdf2CsvError::DownloadTimeout { secs: 1, .. }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn write_csv_is_atomic_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/invoices.csv");
        write_csv_file(&path, "File\na.pdf\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "File\na.pdf\n");
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[tokio::test]
    async fn csv_file_needs_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: [&str; 0] = [];
        let err = extract_to_csv_file(
            &inputs,
            dir.path().join("x.csv"),
            TableLayout::Invoice,
            &ExtractionConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2CsvError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn csv_file_reports_error_when_every_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.csv");
        let err = extract_to_csv_file(
            &["/no/such/a.pdf", "/no/such/b.pdf"],
            &out,
            TableLayout::Lines,
            &ExtractionConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2CsvError::FileNotFound { .. }));
        assert!(!out.exists());
    }
}
