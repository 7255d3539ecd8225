//! Error types for the invoice-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceError`] — **Fatal** for one operation: an upload cannot be
//!   read, the batch cannot be structured, the workbook cannot be encoded.
//!   Returned as `Err(InvoiceError)` from the pipeline and orchestration
//!   functions and mapped onto an HTTP status by [`crate::server`].
//!
//! * [`DocumentError`] — **Non-fatal** for the batch bookkeeping: a single
//!   document failed to structure. Collected into
//!   [`InvoiceError::BatchFailed`] so callers see every failing document,
//!   not only the first.
//!
//! Every [`InvoiceError`] carries two messages. `Display` holds the internal
//! detail that goes to the log; [`InvoiceError::user_message`] is the short
//! string a user is shown.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the invoice-extract library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The multipart form carried no `file` field.
    #[error("No file provided in form data")]
    NoFile,

    /// The uploaded file name does not end in `.pdf`.
    #[error("Invalid file type: '{filename}'")]
    InvalidFileType { filename: String },

    /// The upload has a `.pdf` name but does not start with the PDF magic bytes.
    #[error("File '{filename}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { filename: String, magic: [u8; 4] },

    /// The upload exceeds the configured size limit.
    #[error("File '{filename}' is {size} bytes, limit is {limit}")]
    FileTooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },

    /// Local input file was not found at the given path.
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

    /// A JSON request body had the wrong shape.
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    /// `/api/process` was called without any text.
    #[error("No texts provided")]
    NoTexts,

    /// The image prompt was missing or blank.
    #[error("No prompt provided")]
    EmptyPrompt,

    // ── Text extraction errors ────────────────────────────────────────────
    /// The document-parsing service could not read the PDF.
    #[error("Failed to parse PDF '{filename}': {detail}")]
    ParseFailed { filename: String, detail: String },

    /// The parser returned successfully but without any text.
    #[error("No text content extracted from '{filename}'")]
    EmptyExtraction { filename: String },

    /// The parsing job did not finish within the configured number of polls.
    #[error("Parsing job {job_id} did not finish after {polls} polls")]
    ParseTimeout { job_id: String, polls: u32 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// At least one document in a batch failed; nothing from the batch is kept.
    #[error("{failed}/{total} documents failed to process")]
    BatchFailed {
        failed: usize,
        total: usize,
        details: Vec<DocumentError>,
    },

    // ── Export / image errors ─────────────────────────────────────────────
    /// The XLSX encoder rejected the rows.
    #[error("Failed to generate spreadsheet: {0}")]
    SpreadsheetFailed(String),

    /// Cannot write the workbook to the output path.
    #[error("Cannot write output to '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required credential for an external service is missing.
    #[error("Missing credential {var} for {service}")]
    MissingCredential {
        service: &'static str,
        var: &'static str,
    },

    /// The image-generation service failed.
    #[error("Image generation failed: {0}")]
    ImageGenerationFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InvoiceError {
    /// Whether the caller sent something malformed (a 4xx) rather than a
    /// downstream service failing (a 5xx).
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            InvoiceError::NoFile
                | InvoiceError::InvalidFileType { .. }
                | InvoiceError::NotAPdf { .. }
                | InvoiceError::FileTooLarge { .. }
                | InvoiceError::FileNotFound { .. }
                | InvoiceError::PermissionDenied { .. }
                | InvoiceError::InvalidPayload(_)
                | InvoiceError::NoTexts
                | InvoiceError::EmptyPrompt
        )
    }

    /// Short, user-facing description. Never includes internal detail.
    pub fn user_message(&self) -> String {
        match self {
            InvoiceError::NoFile => "Please select a PDF file to upload".into(),
            InvoiceError::InvalidFileType { .. } | InvoiceError::NotAPdf { .. } => {
                "Please upload a PDF file".into()
            }
            InvoiceError::FileTooLarge { limit, .. } => {
                format!("File too large. Maximum {}MB.", limit / (1024 * 1024))
            }
            InvoiceError::FileNotFound { path } => format!("File not found: {}", path.display()),
            InvoiceError::PermissionDenied { path } => {
                format!("Cannot read file: {}", path.display())
            }
            InvoiceError::DownloadFailed { .. } | InvoiceError::DownloadTimeout { .. } => {
                "Failed to download the PDF".into()
            }
            InvoiceError::InvalidPayload(_) => "Invalid data format".into(),
            InvoiceError::NoTexts => "No texts provided".into(),
            InvoiceError::EmptyPrompt => "Please enter an image description".into(),
            InvoiceError::ParseFailed { .. } | InvoiceError::ParseTimeout { .. } => {
                "Unable to read the PDF file. Please make sure it is not corrupted.".into()
            }
            InvoiceError::EmptyExtraction { .. } => {
                "The PDF file appears to be empty or unreadable".into()
            }
            InvoiceError::BatchFailed { .. } => "Some documents failed to process".into(),
            InvoiceError::SpreadsheetFailed(_) => "Failed to generate Excel file".into(),
            InvoiceError::OutputWriteFailed { path, .. } => {
                format!("Cannot write {}", path.display())
            }
            InvoiceError::ImageGenerationFailed(_) => "Failed to generate image".into(),
            InvoiceError::ProviderNotConfigured { .. }
            | InvoiceError::MissingCredential { .. }
            | InvoiceError::InvalidConfig(_)
            | InvoiceError::Internal(_) => "An unexpected error occurred".into(),
        }
    }
}

/// A non-fatal error for a single document within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentError {
    /// The LLM call itself failed after all attempts.
    #[error("Document {index}: LLM call failed after {attempts} attempt(s): {detail}")]
    LlmFailed {
        index: usize,
        attempts: u32,
        detail: String,
    },

    /// The model answered, but not with JSON matching the record schema.
    #[error("Document {index}: response does not match the record schema: {detail}")]
    InvalidResponse { index: usize, detail: String },
}

impl DocumentError {
    /// Position of the failing document in the submitted batch.
    pub fn index(&self) -> usize {
        match self {
            DocumentError::LlmFailed { index, .. } | DocumentError::InvalidResponse { index, .. } => {
                *index
            }
        }
    }

    /// Stable tag for the failure, matching the serde `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::LlmFailed { .. } => "llm_failed",
            DocumentError::InvalidResponse { .. } => "invalid_response",
        }
    }
}
