//! PDF content extraction via pdfium: embedded raster images, the page text
//! layer and document metadata.
//!
//! pdfium keeps thread-local state and must not be driven from async tasks,
//! so every entry point hops onto `spawn_blocking` and opens its own
//! document handle there.
//!
//! Images are the rasters stored in the PDF, not renders of the page: a
//! scanned invoice is typically one full-page image per page, and decoding it
//! directly keeps the scanner's native resolution for OCR.

use crate::config::{ExtractionConfig, ExtractionMode};
use crate::error::Pdf2CsvError;
use crate::output::{DocumentMetadata, ImageMetadata};
use image::{DynamicImage, GenericImageView};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A raster image decoded from a page object.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// 1-indexed position among the page's image objects.
    pub image_num: usize,
    pub image: DynamicImage,
}

impl ExtractedImage {
    pub fn metadata(&self) -> ImageMetadata {
        let (width, height) = self.image.dimensions();
        ImageMetadata {
            page_num: self.page_num,
            image_num: self.image_num,
            width,
            height,
            color_mode: format!("{:?}", self.image.color()),
        }
    }
}

/// What was pulled out of one page.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// 1-indexed page number.
    pub page_num: usize,
    pub images: Vec<ExtractedImage>,
    /// Text layer, present in text mode and for image-less pages in auto mode.
    pub text: Option<String>,
    /// Image objects skipped as too small or undecodable.
    pub skipped_images: usize,
}

/// Extract the content `config.mode` asks for from the selected pages.
///
/// # Returns
/// One [`PageContent`] per selected page, in page order.
pub async fn extract_content(
    pdf_path: &Path,
    config: &ExtractionConfig,
    page_indices: &[usize],
) -> Result<Vec<PageContent>, Pdf2CsvError> {
    run_extraction(pdf_path, config, config.mode, page_indices).await
}

/// Every decodable embedded image of the selected pages, in page order.
pub async fn extract_images(
    pdf_path: &Path,
    config: &ExtractionConfig,
    page_indices: &[usize],
) -> Result<Vec<ExtractedImage>, Pdf2CsvError> {
    let pages = run_extraction(pdf_path, config, ExtractionMode::Images, page_indices).await?;
    Ok(pages.into_iter().flat_map(|p| p.images).collect())
}

async fn run_extraction(
    pdf_path: &Path,
    config: &ExtractionConfig,
    mode: ExtractionMode,
    page_indices: &[usize],
) -> Result<Vec<PageContent>, Pdf2CsvError> {
    let path = pdf_path.to_path_buf();
    let min_edge = config.min_image_edge;
    let password = config.password.clone();
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || {
        extract_content_blocking(&path, mode, min_edge, password.as_deref(), &indices)
    })
    .await
    .map_err(|e| Pdf2CsvError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn extract_content_blocking(
    pdf_path: &Path,
    mode: ExtractionMode,
    min_edge: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<Vec<PageContent>, Pdf2CsvError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }
        let page_num = idx + 1;

        let page = pages
            .get(idx as u16)
            .map_err(|e| Pdf2CsvError::ExtractionFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let mut content = PageContent {
            page_num,
            images: Vec::new(),
            text: None,
            skipped_images: 0,
        };

        if mode != ExtractionMode::Text {
            let mut image_num = 0;
            for object in page.objects().iter() {
                let Some(image_object) = object.as_image_object() else {
                    continue;
                };
                image_num += 1;

                match image_object.get_raw_image() {
                    Ok(image) if image.width() < min_edge || image.height() < min_edge => {
                        debug!(
                            "Page {} image {}: {}x{} below {} px, skipped",
                            page_num,
                            image_num,
                            image.width(),
                            image.height(),
                            min_edge
                        );
                        content.skipped_images += 1;
                    }
                    Ok(image) => {
                        debug!(
                            "Page {} image {}: {}x{} {:?}",
                            page_num,
                            image_num,
                            image.width(),
                            image.height(),
                            image.color()
                        );
                        content.images.push(ExtractedImage {
                            page_num,
                            image_num,
                            image,
                        });
                    }
                    Err(e) => {
                        warn!(
                            "Page {} image {}: could not decode raster: {:?}",
                            page_num, image_num, e
                        );
                        content.skipped_images += 1;
                    }
                }
            }
        }

        if wants_text_layer(mode, !content.images.is_empty()) {
            let text = page
                .text()
                .map_err(|e| Pdf2CsvError::ExtractionFailed {
                    page: page_num,
                    detail: format!("text layer: {:?}", e),
                })?
                .all();
            content.text = Some(text);
        }

        results.push(content);
    }

    Ok(results)
}

/// Whether a page's text layer is read, given whether it yielded images.
fn wants_text_layer(mode: ExtractionMode, has_images: bool) -> bool {
    match mode {
        ExtractionMode::Text => true,
        ExtractionMode::Auto => !has_images,
        ExtractionMode::Images => false,
    }
}

/// Extract document metadata without touching page content.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2CsvError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| Pdf2CsvError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2CsvError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

// ── pdfium plumbing ──────────────────────────────────────────────────────────

/// Bind to pdfium: `PDFIUM_LIB_PATH` (file or directory) first, then the
/// library next to the executable, then the system library.
fn bind_pdfium() -> Result<Pdfium, Pdf2CsvError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(raw) => {
            let path = library_from_env(PathBuf::from(raw));
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", path.display());
            Pdfium::bind_to_library(&path)
        }
        None => match std::env::current_exe().ok().and_then(|exe| library_next_to(&exe)) {
            Some(path) => {
                Pdfium::bind_to_library(&path).or_else(|_| Pdfium::bind_to_system_library())
            }
            None => Pdfium::bind_to_system_library(),
        },
    }
    .map_err(|e| Pdf2CsvError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// `PDFIUM_LIB_PATH` may name the library itself or its directory.
fn library_from_env(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(&path)
    } else {
        path
    }
}

fn library_next_to(exe: &Path) -> Option<PathBuf> {
    exe.parent()
        .map(|dir| Pdfium::pdfium_platform_library_name_at_path(dir))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2CsvError> {
    pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| classify_load_error(pdf_path, password.is_some(), format!("{:?}", e)))
}

/// pdfium reports a bad or missing password as a generic load failure whose
/// debug text names the password error.
fn classify_load_error(path: &Path, had_password: bool, detail: String) -> Pdf2CsvError {
    if detail.to_lowercase().contains("password") {
        if had_password {
            Pdf2CsvError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2CsvError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2CsvError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}
