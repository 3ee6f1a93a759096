//! Configuration types for PDF-to-CSV extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct per run keeps configs easy
//! to share across tasks and to print when two runs disagree.

use crate::error::Pdf2CsvError;
use crate::pipeline::ocr::OcrEngine;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound for [`ExtractionConfigBuilder::max_retries`].
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Configuration for a PDF-to-CSV extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2csv::{ExtractionConfig, OcrBackend};
///
/// let config = ExtractionConfig::builder()
///     .ocr_backend(OcrBackend::Tesseract)
///     .language("eng+deu")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Where the text comes from. Default: [`ExtractionMode::Images`].
    pub mode: ExtractionMode,

    /// Which OCR engine recognises the extracted images. Default: Tesseract.
    pub ocr_backend: OcrBackend,

    /// Pre-constructed OCR engine. Takes precedence over `ocr_backend`.
    pub engine: Option<Arc<dyn OcrEngine>>,

    /// OCR language(s) in tesseract notation, e.g. "eng" or "eng+fra". Default: "eng".
    pub language: String,

    /// Tesseract page segmentation mode. Default: 3 (fully automatic).
    pub page_seg_mode: u8,

    /// Path to the tesseract executable. Default: "tesseract" on `PATH`.
    pub tesseract_path: PathBuf,

    /// Merge the lines of each OCR block into one paragraph. Default: true.
    ///
    /// Invoices print labels and values on the same visual line, so
    /// paragraph merging keeps "Invoice No: 123" together even when the
    /// engine reports the two halves on separate lines.
    pub paragraph: bool,

    /// Number of images recognised concurrently. Default: 4.
    pub concurrency: usize,

    /// LLM model identifier for the vision backend.
    pub model: Option<String>,

    /// LLM provider name for the vision backend (e.g. "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider for the vision backend.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Maximum retry attempts per image on a transient OCR failure. Default: 2, at most 10.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles each attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-image OCR timeout in seconds. Default: 60.
    pub ocr_timeout_secs: u64,

    /// Skip images smaller than this on either edge (logos, rules, bullets). Default: 16.
    pub min_image_edge: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::default(),
            ocr_backend: OcrBackend::default(),
            engine: None,
            language: "eng".to_string(),
            page_seg_mode: 3,
            tesseract_path: PathBuf::from("tesseract"),
            paragraph: true,
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            max_retries: 2,
            retry_backoff_ms: 500,
            ocr_timeout_secs: 60,
            min_image_edge: 16,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("mode", &self.mode)
            .field("ocr_backend", &self.ocr_backend)
            .field("engine", &self.engine.as_ref().map(|e| e.name()))
            .field("language", &self.language)
            .field("page_seg_mode", &self.page_seg_mode)
            .field("tesseract_path", &self.tesseract_path)
            .field("paragraph", &self.paragraph)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("min_image_edge", &self.min_image_edge)
            .field("pages", &self.pages)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn ocr_backend(mut self, backend: OcrBackend) -> Self {
        self.config.ocr_backend = backend;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn page_seg_mode(mut self, psm: u8) -> Self {
        self.config.page_seg_mode = psm.min(13);
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn paragraph(mut self, v: bool) -> Self {
        self.config.paragraph = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES_LIMIT);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn min_image_edge(mut self, px: u32) -> Self {
        self.config.min_image_edge = px;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2CsvError> {
        let c = &self.config;
        if c.language.trim().is_empty() {
            return Err(Pdf2CsvError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c
            .language
            .split('+')
            .any(|l| l.is_empty() || !l.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_'))
        {
            return Err(Pdf2CsvError::InvalidConfig(format!(
                "Invalid OCR language '{}': expected e.g. 'eng' or 'eng+fra'",
                c.language
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2CsvError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.ocr_timeout_secs == 0 {
            return Err(Pdf2CsvError::InvalidConfig(
                "OCR timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where the text of each page comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// OCR every embedded raster image (default). Right for scanned invoices.
    #[default]
    Images,
    /// Read the PDF text layer; no OCR. Right for digitally generated PDFs.
    Text,
    /// OCR images; pages without any image fall back to their text layer.
    Auto,
}

/// Built-in OCR engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrBackend {
    /// The `tesseract` command-line engine (default, fully local).
    #[default]
    Tesseract,
    /// A vision LLM reached through edgequake-llm.
    Vision,
}

impl OcrBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackend::Tesseract => "tesseract",
            OcrBackend::Vision => "vision",
        }
    }
}

impl fmt::Display for OcrBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.mode, ExtractionMode::Images);
        assert_eq!(c.ocr_backend, OcrBackend::Tesseract);
        assert_eq!(c.language, "eng");
        assert_eq!(c.page_seg_mode, 3);
        assert!(c.paragraph);
        assert_eq!(c.concurrency, 4);
    }

    #[test]
    fn builder_clamps_values() {
        let c = ExtractionConfig::builder()
            .concurrency(0)
            .page_seg_mode(99)
            .max_retries(1000)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.page_seg_mode, 13);
        assert_eq!(c.max_retries, MAX_RETRIES_LIMIT);
    }

    #[test]
    fn builder_rejects_bad_language() {
        let err = ExtractionConfig::builder()
            .language("eng; rm -rf /")
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2CsvError::InvalidConfig(_)));

        let err = ExtractionConfig::builder().language("eng+").build().unwrap_err();
        assert!(matches!(err, Pdf2CsvError::InvalidConfig(_)));

        assert!(ExtractionConfig::builder()
            .language("eng+chi_sim")
            .build()
            .is_ok());
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ExtractionConfig::builder()
            .ocr_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(2).to_indices(3), vec![1]);
        assert_eq!(PageSelection::Single(0).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(3), vec![1, 2]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2]
        );
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", ExtractionConfig::default());
        assert!(dbg.contains("ExtractionConfig"));
        assert!(dbg.contains("provider: None"));
    }

    #[test]
    fn backend_display() {
        assert_eq!(OcrBackend::Tesseract.to_string(), "tesseract");
        assert_eq!(OcrBackend::Vision.to_string(), "vision");
    }
}
