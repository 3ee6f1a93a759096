//! # edgequake-pdf2csv
//!
//! Turn scanned PDF invoices into CSV: decode the raster images embedded in
//! each page, OCR them, recover invoice fields from their printed labels and
//! tabulate the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file, URL download or in-memory bytes
//!  ├─ 2. Extract  embedded images / text layer via pdfium (spawn_blocking)
//!  ├─ 3. OCR      tesseract or a vision LLM, concurrent with retry
//!  ├─ 4. Clean    deterministic text cleanup, split into lines
//!  ├─ 5. Fields   label-driven regex segmentation into invoice fields
//!  └─ 6. Table    lines / invoice / image-metadata layouts → CSV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2csv::{extract, ExtractionConfig, Table, TableLayout};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default(); // tesseract, English
//!     let output = extract("invoice.pdf", &config).await?;
//!     let table = Table::build(TableLayout::Invoice, &[output]);
//!     print!("{}", table.to_csv());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2csv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2csv = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! - a pdfium shared library (`PDFIUM_LIB_PATH`, next to the binary, or system-wide)
//! - the `tesseract` executable for the default OCR backend, or an LLM API key
//!   (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …) for [`OcrBackend::Vision`]

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod fields;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, ExtractionMode, OcrBackend, PageSelection,
};
pub use error::{ImageError, OcrError, Pdf2CsvError};
pub use extract::{
    extract, extract_from_bytes, extract_many, extract_sync, extract_to_csv_file, inspect,
    write_csv_file,
};
pub use fields::{segment, InvoiceField, InvoiceFields};
pub use output::{
    DocumentMetadata, ExtractionOutput, ExtractionStats, ImageMetadata, ImageResult, LineSource,
    TextLine,
};
pub use pipeline::extract::ExtractedImage;
pub use pipeline::ocr::{OcrEngine, Recognition, TesseractEngine};
pub use pipeline::vision::VisionEngine;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, extract_stream_from_bytes, ImageStream};
pub use table::{Table, TableLayout};
