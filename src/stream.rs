//! Streaming extraction API: emit image results as OCR completes.
//!
//! Unlike [`crate::extract::extract`], which returns only after every image
//! is done and the fields are segmented, [`extract_stream`] yields one
//! [`ImageResult`] per embedded image as soon as its OCR finishes. Results
//! arrive in completion order; sort by `(page_num, image_num)` if order
//! matters. Text-layer pages are not part of the stream.

use crate::config::{ExtractionConfig, ExtractionMode};
use crate::error::{ImageError, Pdf2CsvError};
use crate::extract::select_pages;
use crate::output::ImageResult;
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::{extract as pdf, ocr};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of per-image OCR results.
pub type ImageStream = Pin<Box<dyn Stream<Item = Result<ImageResult, ImageError>> + Send>>;

/// Extract a PDF, streaming image results as they are recognised.
///
/// # Returns
/// - `Ok(ImageStream)`: a stream of `Result<ImageResult, ImageError>`
/// - `Err(Pdf2CsvError)`: fatal error (file not found, not a PDF, engine
///   unavailable, etc.)
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2csv::{extract_stream, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut stream = extract_stream("scan.pdf", &ExtractionConfig::default()).await?;
/// while let Some(item) = stream.next().await {
///     match item {
///         Ok(r) => println!("p{} i{}: {:?}", r.page_num, r.image_num, r.lines),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ImageStream, Pdf2CsvError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming extraction: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    stream_resolved(&resolved, config).await
}

/// Streaming equivalent of [`crate::extract::extract_from_bytes`].
///
/// The images are decoded before this returns, so the staged copy of the
/// bytes is already gone while the stream runs.
pub async fn extract_stream_from_bytes(
    bytes: &[u8],
    file_name: &str,
    config: &ExtractionConfig,
) -> Result<ImageStream, Pdf2CsvError> {
    let resolved = input::resolve_bytes(bytes, file_name).await?;
    stream_resolved(&resolved, config).await
}

async fn stream_resolved(
    resolved: &ResolvedInput,
    config: &ExtractionConfig,
) -> Result<ImageStream, Pdf2CsvError> {
    if config.mode == ExtractionMode::Text {
        warn!("Text mode runs no OCR; the image stream is empty");
        return Ok(Box::pin(stream::empty()));
    }

    let (_metadata, page_indices) = select_pages(resolved.path(), config).await?;
    let images = pdf::extract_images(resolved.path(), config, &page_indices).await?;
    if images.is_empty() {
        warn!("No embedded images found in '{}'", resolved.file_name());
        return Ok(Box::pin(stream::empty()));
    }

    let engine = ocr::resolve_engine(config).await?;
    let total = images.len();
    let concurrency = config.concurrency;
    let config_clone = config.clone();

    let s = stream::iter(images)
        .map(move |image| {
            let engine = Arc::clone(&engine);
            let cfg = config_clone.clone();
            async move {
                let mut result = ocr::recognize_one(engine.as_ref(), &image, &cfg, total).await;
                match result.error.take() {
                    None => Ok(result),
                    Some(err) => Err(err),
                }
            }
        })
        .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
