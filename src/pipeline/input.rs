//! Input resolution: turn a path, URL or byte buffer into a local PDF file.
//!
//! pdfium opens files by path, so downloads and in-memory buffers are staged
//! in a [`TempDir`] owned by the returned [`ResolvedInput`]; the directory is
//! removed when the input is dropped. Every source is checked for the `%PDF`
//! magic before it reaches pdfium.

use crate::error::Pdf2CsvError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF ready to be opened by pdfium.
#[derive(Debug)]
pub struct ResolvedInput {
    path: PathBuf,
    file_name: String,
    _temp_dir: Option<TempDir>,
}

impl ResolvedInput {
    /// Path to the PDF file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name shown in the `File` column of the output table.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Whether the file lives in a temporary directory owned by this value.
    pub fn is_staged(&self) -> bool {
        self._temp_dir.is_some()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2CsvError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Stage an in-memory PDF in a temp directory under `file_name`.
pub async fn resolve_bytes(bytes: &[u8], file_name: &str) -> Result<ResolvedInput, Pdf2CsvError> {
    let name = sanitise_file_name(file_name);
    check_magic(bytes, Path::new(&name))?;
    stage(bytes, name).await
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2CsvError> {
    if !path.exists() {
        return Err(Pdf2CsvError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut magic = [0u8; 4];
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let read = f.read(&mut magic).map_err(|_| Pdf2CsvError::FileNotFound {
                path: path.to_path_buf(),
            })?;
            check_magic(&magic[..read], path)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2CsvError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2CsvError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput {
        path: path.to_path_buf(),
        file_name,
        _temp_dir: None,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2CsvError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2CsvError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2CsvError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let name = file_name_from_url(url);
    check_magic(&bytes, Path::new(&name))?;

    let resolved = stage(&bytes, name).await?;
    info!("Downloaded {} bytes to: {}", bytes.len(), resolved.path.display());
    Ok(resolved)
}

async fn stage(bytes: &[u8], file_name: String) -> Result<ResolvedInput, Pdf2CsvError> {
    let temp_dir = TempDir::new().map_err(|e| Pdf2CsvError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(&file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Pdf2CsvError::Internal(format!("Failed to write temp file: {}", e)))?;

    Ok(ResolvedInput {
        path,
        file_name,
        _temp_dir: Some(temp_dir),
    })
}

fn check_magic(head: &[u8], path: &Path) -> Result<(), Pdf2CsvError> {
    if head.len() >= 4 && &head[..4] == PDF_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(Pdf2CsvError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// Last non-empty path segment of the URL, or `downloaded.pdf`.
pub fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .map(|last| sanitise_file_name(&last))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

/// Keep only the final component of a caller-supplied name.
fn sanitise_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "document.pdf".to_string()
    } else {
        base.to_string()
    }
}
