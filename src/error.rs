//! Error types for the edgequake-pdf2csv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2CsvError`]: **Fatal**: the extraction cannot proceed at all
//!   (bad input file, wrong password, OCR engine not installed). Returned as
//!   `Err(Pdf2CsvError)` from the top-level `extract*` functions.
//!
//! * [`ImageError`]: **Non-fatal**: a single embedded image could not be
//!   decoded or recognised, but the other images are fine. Stored inside
//!   [`crate::output::ImageResult`] so callers can inspect partial success
//!   rather than losing the whole document to one unreadable scan.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2csv library.
#[derive(Debug, Error)]
pub enum Pdf2CsvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error while walking the objects of a page.
    #[error("Image extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The configured OCR engine cannot run (binary missing, no API key).
    #[error("OCR engine '{engine}' is not available.\n{hint}")]
    OcrEngineUnavailable { engine: String, hint: String },

    /// Every image failed OCR; output would be empty.
    #[error("All {total} images failed OCR.\nFirst error: {first_error}")]
    AllImagesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output CSV file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the executable, install it system-wide, or\n\
set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single embedded image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The image could not be re-encoded for the OCR engine.
    #[error("Page {page} image {image}: encoding failed: {detail}")]
    EncodeFailed {
        page: usize,
        image: usize,
        detail: String,
    },

    /// The OCR engine failed after retries.
    #[error("Page {page} image {image}: OCR failed after {retries} retries: {detail}")]
    OcrFailed {
        page: usize,
        image: usize,
        retries: u8,
        detail: String,
    },

    /// The OCR call timed out.
    #[error("Page {page} image {image}: OCR timed out after {secs}s")]
    Timeout {
        page: usize,
        image: usize,
        secs: u64,
    },
}

impl ImageError {
    /// The 1-indexed page the failing image lives on.
    pub fn page(&self) -> usize {
        match self {
            ImageError::EncodeFailed { page, .. }
            | ImageError::OcrFailed { page, .. }
            | ImageError::Timeout { page, .. } => *page,
        }
    }

    /// The 1-indexed image number within its page.
    pub fn image(&self) -> usize {
        match self {
            ImageError::EncodeFailed { image, .. }
            | ImageError::OcrFailed { image, .. }
            | ImageError::Timeout { image, .. } => *image,
        }
    }
}

/// Errors raised inside an [`crate::pipeline::ocr::OcrEngine`].
///
/// These never escape the library directly: the OCR stage wraps them in
/// [`ImageError`] (per image) or [`Pdf2CsvError::OcrEngineUnavailable`].
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("engine not available: {0}")]
    EngineUnavailable(String),

    #[error("OCR failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_images_failed_display() {
        let e = Pdf2CsvError::AllImagesFailed {
            total: 3,
            first_error: "tesseract exited 1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 3 images"), "got: {msg}");
        assert!(msg.contains("tesseract exited 1"));
    }

    #[test]
    fn engine_unavailable_display() {
        let e = Pdf2CsvError::OcrEngineUnavailable {
            engine: "tesseract".into(),
            hint: "apt install tesseract-ocr".into(),
        };
        assert!(e.to_string().contains("tesseract"));
        assert!(e.to_string().contains("apt install"));
    }

    #[test]
    fn image_error_accessors() {
        let e = ImageError::Timeout {
            page: 2,
            image: 5,
            secs: 30,
        };
        assert_eq!(e.page(), 2);
        assert_eq!(e.image(), 5);
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn ocr_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let e: OcrError = io.into();
        assert!(matches!(e, OcrError::Io(_)));
    }
}
