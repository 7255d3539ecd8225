//! Input resolution: turn an uploaded file, a local path or a URL into a
//! validated in-memory [`Upload`].
//!
//! Everything downstream (the parser client in particular) works on bytes,
//! so local files and downloads are read fully into memory. The size limit
//! is checked before the magic bytes; a truncated 3-byte "PDF" is rejected
//! as `NotAPdf` with the missing bytes zeroed.

use crate::error::InvoiceError;
use std::path::PathBuf;
use tracing::{debug, info};

/// PDF magic bytes.
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF held in memory together with its original file name.
#[derive(Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Check name, size and content type. See [`validate_upload`].
    pub fn validate(&self, max_bytes: usize) -> Result<(), InvoiceError> {
        validate_upload(&self.filename, &self.bytes, max_bytes)
    }
}

/// Reject anything that is not a plausibly-sized `.pdf` starting with `%PDF`.
pub fn validate_upload(filename: &str, bytes: &[u8], max_bytes: usize) -> Result<(), InvoiceError> {
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(InvoiceError::InvalidFileType {
            filename: filename.to_string(),
        });
    }
    if bytes.len() > max_bytes {
        return Err(InvoiceError::FileTooLarge {
            filename: filename.to_string(),
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(InvoiceError::NotAPdf {
            filename: filename.to_string(),
            magic,
        });
    }
    Ok(())
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI argument (path or URL) into a validated upload.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<Upload, InvoiceError> {
    let upload = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    upload.validate(max_bytes)?;
    Ok(upload)
}

async fn read_local(path_str: &str) -> Result<Upload, InvoiceError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(InvoiceError::PermissionDenied { path });
        }
        Err(_) => return Err(InvoiceError::FileNotFound { path }),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(Upload::new(filename, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, InvoiceError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            InvoiceError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InvoiceError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(Upload::new(filename_from_url(url), bytes.to_vec()))
}

/// Last path segment of the URL, or `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
