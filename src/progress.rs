//! Progress-callback trait for per-image extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline recognises each embedded image.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2csv::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, page_num: usize, image_num: usize, total: usize, lines: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("p{page_num} img{image_num} ({total} total): {lines} lines");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it recognises each image.
///
/// Images are recognised concurrently, so every method may be called from
/// several threads at once. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once per document before OCR starts.
    fn on_extraction_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called just before an image is handed to the OCR engine.
    fn on_image_start(&self, page_num: usize, image_num: usize, total_images: usize) {
        let _ = (page_num, image_num, total_images);
    }

    /// Called when an image was recognised.
    ///
    /// `line_count` is the number of text lines the image produced.
    fn on_image_complete(
        &self,
        page_num: usize,
        image_num: usize,
        total_images: usize,
        line_count: usize,
    ) {
        let _ = (page_num, image_num, total_images, line_count);
    }

    /// Called when an image fails after all retries are exhausted.
    fn on_image_error(&self, page_num: usize, image_num: usize, total_images: usize, error: &str) {
        let _ = (page_num, image_num, total_images, error);
    }

    /// Called once per document after all images have been attempted.
    fn on_extraction_complete(&self, total_images: usize, success_count: usize) {
        let _ = (total_images, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        lines: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_image_start(&self, _p: usize, _i: usize, _t: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_complete(&self, _p: usize, _i: usize, _t: usize, line_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.lines.fetch_add(line_count, Ordering::SeqCst);
        }

        fn on_image_error(&self, _p: usize, _i: usize, _t: usize, _e: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(2);
        cb.on_image_start(1, 1, 2);
        cb.on_image_complete(1, 1, 2, 7);
        cb.on_image_error(1, 2, 2, "boom");
        cb.on_extraction_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = TrackingCallback::default();
        t.on_image_start(1, 1, 2);
        t.on_image_complete(1, 1, 2, 4);
        t.on_image_start(1, 2, 2);
        t.on_image_error(1, 2, 2, "timeout");

        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.lines.load(Ordering::SeqCst), 4);
    }
}
