//! OCR stage: the engine seam, the tesseract engine and the concurrent
//! driver that turns extracted images into cleaned text lines.
//!
//! ## Retry Strategy
//!
//! Retries live in the driver, not in the engines, so every engine gets the
//! same policy: `retry_backoff_ms * 2^(attempt-1)` between attempts, each
//! attempt bounded by `ocr_timeout_secs`. An engine that reports itself
//! unavailable or an image that cannot be encoded is not retried.

use crate::config::{ExtractionConfig, OcrBackend};
use crate::error::{ImageError, OcrError, Pdf2CsvError};
use crate::output::ImageResult;
use crate::pipeline::extract::ExtractedImage;
use crate::pipeline::{encode, postprocess, vision};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Text recognised in one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    pub text: String,
    /// Prompt tokens, for engines billed per token. Zero otherwise.
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Recognition {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// An OCR engine: one image in, raw text out.
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    fn recognize<'a>(
        &'a self,
        image: &'a ExtractedImage,
    ) -> BoxFuture<'a, Result<Recognition, OcrError>>;

    /// Probe the engine once before any image is queued.
    fn check_available(&self) -> BoxFuture<'_, Result<(), OcrError>> {
        Box::pin(async { Ok(()) })
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────────

/// Runs the `tesseract` executable on a temporary PNG per image.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
    page_seg_mode: u8,
}

impl TesseractEngine {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: language.into(),
            page_seg_mode: 3,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            page_seg_mode: config.page_seg_mode,
        }
    }

    fn args(&self, image_path: &Path) -> Vec<OsString> {
        vec![
            image_path.as_os_str().to_owned(),
            "stdout".into(),
            "-l".into(),
            self.language.as_str().into(),
            "--psm".into(),
            self.page_seg_mode.to_string().into(),
        ]
    }

    fn not_found(&self) -> OcrError {
        OcrError::EngineUnavailable(format!(
            "'{}' not found. Install with: apt install tesseract-ocr (or brew install tesseract), \
             or point --tesseract-path at the executable",
            self.binary.display()
        ))
    }

    async fn run(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = tokio::process::Command::new(&self.binary)
            .args(self.args(image_path))
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::Failed(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.not_found()),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize<'a>(
        &'a self,
        image: &'a ExtractedImage,
    ) -> BoxFuture<'a, Result<Recognition, OcrError>> {
        Box::pin(async move {
            let png = encode::encode_png(&image.image).map_err(|e| OcrError::Image(e.to_string()))?;

            let mut file = tempfile::Builder::new()
                .prefix("pdf2csv-")
                .suffix(".png")
                .tempfile()?;
            file.write_all(&png)?;
            file.flush()?;

            let text = self.run(file.path()).await?;
            Ok(Recognition::text(text))
        })
    }

    fn check_available(&self) -> BoxFuture<'_, Result<(), OcrError>> {
        Box::pin(async move {
            match tokio::process::Command::new(&self.binary)
                .arg("--version")
                .output()
                .await
            {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.not_found()),
                Err(e) => Err(OcrError::Io(e)),
            }
        })
    }
}

// ── Engine selection ─────────────────────────────────────────────────────────

/// Pick the engine for this run and check it can be reached.
///
/// A pre-built `config.engine` wins; otherwise `config.ocr_backend` decides.
pub async fn resolve_engine(config: &ExtractionConfig) -> Result<Arc<dyn OcrEngine>, Pdf2CsvError> {
    let engine: Arc<dyn OcrEngine> = match (&config.engine, config.ocr_backend) {
        (Some(engine), _) => Arc::clone(engine),
        (None, OcrBackend::Tesseract) => Arc::new(TesseractEngine::from_config(config)),
        (None, OcrBackend::Vision) => Arc::new(vision::VisionEngine::from_config(config)?),
    };

    engine.check_available().await.map_err(|e| {
        let hint = match e {
            OcrError::EngineUnavailable(msg) => msg,
            other => other.to_string(),
        };
        Pdf2CsvError::OcrEngineUnavailable {
            engine: engine.name().to_string(),
            hint,
        }
    })?;

    debug!("Using OCR engine: {}", engine.name());
    Ok(engine)
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Recognise every image with up to `config.concurrency` calls in flight.
///
/// # Returns
/// One [`ImageResult`] per image, sorted by (page, image). Failures are
/// stored in `ImageResult::error`.
pub async fn recognize_images(
    engine: &dyn OcrEngine,
    images: &[ExtractedImage],
    config: &ExtractionConfig,
) -> Vec<ImageResult> {
    let total = images.len();
    info!("Running {} OCR on {} images", engine.name(), total);

    let mut results: Vec<ImageResult> = stream::iter(
        images
            .iter()
            .map(|image| recognize_one(engine, image, config, total)),
    )
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    results.sort_by_key(|r| (r.page_num, r.image_num));
    results
}

/// Recognise a single image with retry, timeout, cleanup and progress events.
pub(crate) async fn recognize_one(
    engine: &dyn OcrEngine,
    image: &ExtractedImage,
    config: &ExtractionConfig,
    total: usize,
) -> ImageResult {
    let (page, num) = (image.page_num, image.image_num);
    if let Some(ref cb) = config.progress_callback {
        cb.on_image_start(page, num, total);
    }

    let start = Instant::now();
    let limit = Duration::from_secs(config.ocr_timeout_secs);
    let mut last_err: Option<ImageError> = None;
    let mut attempts_made: u32 = 0;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {} image {}: retry {}/{} after {}ms",
                page, num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        attempts_made = attempt;

        match timeout(limit, engine.recognize(image)).await {
            Ok(Ok(recognition)) => {
                let cleaned = postprocess::clean_ocr_text(&recognition.text);
                let lines = split_lines(&cleaned, config.paragraph);
                debug!(
                    "Page {} image {}: {} lines in {:?}",
                    page,
                    num,
                    lines.len(),
                    start.elapsed()
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_image_complete(page, num, total, lines.len());
                }
                return ImageResult {
                    page_num: page,
                    image_num: num,
                    text: cleaned,
                    lines,
                    input_tokens: recognition.input_tokens,
                    output_tokens: recognition.output_tokens,
                    duration_ms: start.elapsed().as_millis() as u64,
                    retries: retries_u8(attempt),
                    error: None,
                };
            }
            Ok(Err(OcrError::Image(detail))) => {
                last_err = Some(ImageError::EncodeFailed {
                    page,
                    image: num,
                    detail,
                });
                break;
            }
            Ok(Err(OcrError::EngineUnavailable(detail))) => {
                last_err = Some(ImageError::OcrFailed {
                    page,
                    image: num,
                    retries: retries_u8(attempt),
                    detail,
                });
                break;
            }
            Ok(Err(e)) => {
                warn!("Page {} image {}: attempt {} failed: {}", page, num, attempt + 1, e);
                last_err = Some(ImageError::OcrFailed {
                    page,
                    image: num,
                    retries: retries_u8(attempt),
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "Page {} image {}: attempt {} timed out after {}s",
                    page,
                    num,
                    attempt + 1,
                    config.ocr_timeout_secs
                );
                last_err = Some(ImageError::Timeout {
                    page,
                    image: num,
                    secs: config.ocr_timeout_secs,
                });
            }
        }
    }

    let error = last_err.unwrap_or_else(|| ImageError::OcrFailed {
        page,
        image: num,
        retries: retries_u8(attempts_made),
        detail: "Unknown error".to_string(),
    });
    if let Some(ref cb) = config.progress_callback {
        cb.on_image_error(page, num, total, &error.to_string());
    }

    ImageResult {
        page_num: page,
        image_num: num,
        text: String::new(),
        lines: Vec::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: start.elapsed().as_millis() as u64,
        retries: retries_u8(attempts_made),
        error: Some(error),
    }
}

/// Delay before retry `attempt` (1-based), saturating instead of overflowing.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn retries_u8(attempt: u32) -> u8 {
    attempt.min(u8::MAX as u32) as u8
}

/// Split cleaned OCR text into the lines that make up the output table.
///
/// With `paragraph` set, each blank-line separated block becomes one entry
/// with its lines joined by single spaces. Otherwise every non-empty line is
/// its own entry.
pub fn split_lines(text: &str, paragraph: bool) -> Vec<String> {
    if paragraph {
        text.split("\n\n")
            .map(|block| {
                block
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|p| !p.is_empty())
            .collect()
    } else {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image(page_num: usize, image_num: usize) -> ExtractedImage {
        ExtractedImage {
            page_num,
            image_num,
            image: DynamicImage::ImageRgb8(RgbImage::new(32, 32)),
        }
    }

    /// Fails the first `failures` calls, then returns `text`.
    struct FlakyEngine {
        failures: usize,
        calls: AtomicUsize,
        error: fn() -> OcrError,
    }

    impl OcrEngine for FlakyEngine {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn recognize<'a>(
            &'a self,
            image: &'a ExtractedImage,
        ) -> BoxFuture<'a, Result<Recognition, OcrError>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    Err((self.error)())
                } else {
                    Ok(Recognition::text(format!(
                        "Page {} image {}\n\nTotal: 9.00\n",
                        image.page_num, image.image_num
                    )))
                }
            })
        }
    }

    fn flaky(failures: usize, error: fn() -> OcrError) -> FlakyEngine {
        FlakyEngine {
            failures,
            calls: AtomicUsize::new(0),
            error,
        }
    }

    fn fast_config(max_retries: u32) -> ExtractionConfig {
        ExtractionConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[test]
    fn split_paragraphs() {
        let text = "Invoice No: 12\nDate: 2024-01-02\n\nBill To:\nACME\n";
        assert_eq!(
            split_lines(text, true),
            vec!["Invoice No: 12 Date: 2024-01-02", "Bill To: ACME"]
        );
    }

    #[test]
    fn split_plain_lines() {
        let text = "Invoice No: 12\n\n  Bill To:  \nACME\n";
        assert_eq!(
            split_lines(text, false),
            vec!["Invoice No: 12", "Bill To:", "ACME"]
        );
        assert!(split_lines("", false).is_empty());
        assert!(split_lines("\n\n", true).is_empty());
    }

    #[test]
    fn tesseract_args() {
        let engine = TesseractEngine::from_config(
            &ExtractionConfig::builder()
                .language("eng+deu")
                .page_seg_mode(6)
                .build()
                .unwrap(),
        );
        let args = engine.args(Path::new("/tmp/x.png"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["/tmp/x.png", "stdout", "-l", "eng+deu", "--psm", "6"]);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 70), u64::MAX);
        assert_eq!(backoff_ms(0, 200), 0);
    }

    #[tokio::test]
    async fn missing_tesseract_is_unavailable() {
        let config = ExtractionConfig::builder()
            .tesseract_path("/nonexistent/bin/tesseract")
            .build()
            .unwrap();
        let err = match resolve_engine(&config).await {
            Err(e) => e,
            Ok(_) => panic!("expected missing binary"),
        };
        match err {
            Pdf2CsvError::OcrEngineUnavailable { engine, hint } => {
                assert_eq!(engine, "tesseract");
                assert!(hint.contains("not found"), "hint: {hint}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let engine = flaky(2, || OcrError::Failed("busy".into()));
        let result = recognize_one(&engine, &image(1, 1), &fast_config(2), 1).await;
        assert!(result.error.is_none());
        assert_eq!(result.retries, 2);
        assert_eq!(result.lines, vec!["Page 1 image 1", "Total: 9.00"]);
    }

    #[tokio::test]
    async fn exhausted_retries_record_error() {
        let engine = flaky(10, || OcrError::Failed("busy".into()));
        let result = recognize_one(&engine, &image(3, 2), &fast_config(1), 1).await;
        assert!(result.lines.is_empty());
        match result.error {
            Some(ImageError::OcrFailed {
                page,
                image,
                retries,
                ..
            }) => assert_eq!((page, image, retries), (3, 2, 1)),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn encode_failure_is_not_retried() {
        let engine = flaky(10, || OcrError::Image("bad raster".into()));
        let result = recognize_one(&engine, &image(1, 1), &fast_config(3), 1).await;
        assert!(matches!(result.error, Some(ImageError::EncodeFailed { .. })));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn results_sorted_by_page_then_image() {
        let engine = flaky(0, || OcrError::Failed(String::new()));
        let images = vec![image(2, 1), image(1, 2), image(1, 1)];
        let config = ExtractionConfig::builder().concurrency(3).build().unwrap();
        let results = recognize_images(&engine, &images, &config).await;
        let order: Vec<_> = results.iter().map(|r| (r.page_num, r.image_num)).collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);
    }

    struct SlowEngine;

    impl OcrEngine for SlowEngine {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn recognize<'a>(
            &'a self,
            _image: &'a ExtractedImage,
        ) -> BoxFuture<'a, Result<Recognition, OcrError>> {
            Box::pin(async {
                sleep(Duration::from_secs(30)).await;
                Ok(Recognition::default())
            })
        }
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let config = ExtractionConfig::builder()
            .max_retries(0)
            .ocr_timeout_secs(1)
            .build()
            .unwrap();
        let result = recognize_one(&SlowEngine, &image(1, 1), &config, 1).await;
        assert!(matches!(
            result.error,
            Some(ImageError::Timeout { secs: 1, .. })
        ));
    }
}
