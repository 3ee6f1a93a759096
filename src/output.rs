//! Output types produced by an extraction run.

use crate::error::ImageError;
use crate::fields::InvoiceFields;
use serde::{Deserialize, Serialize};

/// Everything extracted from one PDF document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Display name of the source (file name or last URL segment).
    pub file_name: String,
    /// Document-level metadata.
    pub metadata: DocumentMetadata,
    /// Metadata for every embedded image that was extracted.
    pub images: Vec<ImageMetadata>,
    /// Text lines in page/image order.
    pub lines: Vec<TextLine>,
    /// Invoice fields segmented from `lines`.
    pub invoice: InvoiceFields,
    /// Images that could not be recognised.
    pub failures: Vec<ImageError>,
    /// Counters and timings.
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// All line texts joined with `\n`.
    pub fn text(&self) -> String {
        join_lines(&self.lines)
    }
}

/// Join line texts with `\n`.
pub(crate) fn join_lines(lines: &[TextLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// PDF document metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Metadata of one embedded raster image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// 1-indexed page number.
    pub page_num: usize,
    /// 1-indexed image number within the page, in object order.
    pub image_num: usize,
    pub width: u32,
    pub height: u32,
    /// Pixel layout as decoded, e.g. `L8`, `Rgb8`, `Rgba8`.
    pub color_mode: String,
}

/// Where a line of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSource {
    /// OCR of an embedded image.
    Ocr,
    /// The PDF text layer.
    TextLayer,
}

/// One line (or paragraph) of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLine {
    pub page_num: usize,
    /// Image number for OCR lines; `None` for text-layer lines.
    pub image_num: Option<usize>,
    pub source: LineSource,
    pub text: String,
}

/// Result of recognising a single image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    pub page_num: usize,
    pub image_num: usize,
    /// Cleaned OCR text with its line breaks and blank lines intact.
    pub text: String,
    /// `text` split into lines/paragraphs.
    pub lines: Vec<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u8,
    pub error: Option<ImageError>,
}

/// Aggregate statistics for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub selected_pages: usize,
    pub images_found: usize,
    pub images_recognised: usize,
    pub images_failed: usize,
    /// Image objects left out as too small or undecodable.
    pub images_skipped: usize,
    /// Pages read through the text layer (text / auto mode).
    pub text_layer_pages: usize,
    pub line_count: usize,
    pub fields_found: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub extract_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}
