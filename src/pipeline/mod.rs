//! Pipeline stages for PDF-to-CSV extraction.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ encode ──▶ ocr ──▶ postprocess ──▶ fields ──▶ table
//! (URL/path) (pdfium)   (PNG)   (engine)  (cleanup)     (regex)    (CSV)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path, URL or bytes to a local file
//! 2. [`extract`]: decode embedded images and/or the text layer; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode each raster for the engine
//! 4. [`ocr`]: drive the engine with retry/timeout; [`vision`] is the
//!    LLM-backed engine
//! 5. [`postprocess`]: deterministic cleanup of engine output
//!
//! Field segmentation ([`crate::fields`]) and tabulation ([`crate::table`])
//! work on plain text and live at the crate root.

pub mod encode;
pub mod extract;
pub mod input;
pub mod ocr;
pub mod postprocess;
pub mod vision;
