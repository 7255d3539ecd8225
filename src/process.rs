//! Orchestration: sequence the pipeline stages for one request or one CLI run.
//!
//! The HTTP handlers call the three single-step entry points
//! ([`extract_text`], [`process_texts`], [`export_documents`]) once per
//! request. [`run_batch`] chains all of them for the CLI and tracks per-file
//! state with the same [`Session`] reducer a front end would use.
//!
//! ## Failure semantics
//!
//! Extraction failures are per file: the other files carry on. Structuring
//! is all-or-nothing: one failing document fails the batch and no partial
//! result is returned. Nothing is retried here; retries, if configured,
//! happen inside the LLM stage.

use crate::config::ServiceConfig;
use crate::error::{DocumentError, InvoiceError};
use crate::pipeline::image::{ImageGenerator, ReplicateClient};
use crate::pipeline::input::{self, Upload};
use crate::pipeline::llm::{DocumentStructurer, LlmStructurer};
use crate::pipeline::parse::{LlamaParseClient, TextExtractor};
use crate::schema::Document;
use crate::session::{Session, SessionEvent};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub use crate::pipeline::export::export_documents;

/// The external collaborators, shared by every request.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn TextExtractor>,
    pub structurer: Arc<dyn DocumentStructurer>,
    pub images: Arc<dyn ImageGenerator>,
}

impl Services {
    /// Build the real clients.
    ///
    /// Fails only when no LLM provider can be resolved. Missing LlamaParse
    /// or Replicate credentials are reported when the service is first used.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, InvoiceError> {
        Ok(Self {
            extractor: Arc::new(LlamaParseClient::new(config)?),
            structurer: Arc::new(LlmStructurer::from_config(config)?),
            images: Arc::new(ReplicateClient::new(config)?),
        })
    }
}

/// Validate one upload and extract its text.
pub async fn extract_text(
    extractor: &dyn TextExtractor,
    upload: &Upload,
    max_bytes: usize,
) -> Result<String, InvoiceError> {
    upload.validate(max_bytes)?;

    let start = Instant::now();
    let text = extractor.extract(upload).await?;
    if text.trim().is_empty() {
        return Err(InvoiceError::EmptyExtraction {
            filename: upload.filename.clone(),
        });
    }

    info!(
        filename = %upload.filename,
        chars = text.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Text extracted"
    );
    Ok(text)
}

/// Structure every text, at most `concurrency` at a time.
///
/// Documents come back in the order of `texts`. If any text fails, the
/// whole call fails with [`InvoiceError::BatchFailed`] listing every
/// failing document.
pub async fn process_texts(
    structurer: &dyn DocumentStructurer,
    texts: &[String],
    concurrency: usize,
) -> Result<Vec<Document>, InvoiceError> {
    if texts.is_empty() {
        return Err(InvoiceError::NoTexts);
    }

    let total = texts.len();
    let start = Instant::now();
    info!(documents = total, concurrency, "Structuring batch");

    // Collect first: a lazily mapped iterator inside the stream makes the
    // returned future not `Send` for every lifetime.
    let pending: Vec<_> = texts
        .iter()
        .enumerate()
        .map(|(index, text)| structurer.structure(index, text))
        .collect();
    let results: Vec<Result<Document, DocumentError>> = stream::iter(pending)
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut documents = Vec::with_capacity(total);
    let mut details = Vec::new();
    for result in results {
        match result {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                warn!("{}", e);
                details.push(e);
            }
        }
    }

    if !details.is_empty() {
        return Err(InvoiceError::BatchFailed {
            failed: details.len(),
            total,
            details,
        });
    }

    info!(
        documents = total,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Batch structured"
    );
    Ok(documents)
}

/// Result of a CLI batch run.
#[derive(Debug)]
pub struct BatchOutput {
    /// Final per-file state, including files whose extraction failed.
    pub session: Session,
    /// Inputs that could not even be read, with the reason.
    pub unreadable: Vec<(String, String)>,
    pub documents: Vec<Document>,
    /// Encoded XLSX workbook.
    pub workbook: Vec<u8>,
}

impl BatchOutput {
    /// Files that were read but whose extraction failed.
    pub fn failed_extractions(&self) -> usize {
        self.session
            .files
            .iter()
            .filter(|f| matches!(f.status, crate::session::FileStatus::Failed { .. }))
            .count()
    }
}

/// Run the whole pipeline over local paths and URLs.
///
/// 1. Read or download every input; unreadable inputs are skipped.
/// 2. Extract text from every readable PDF; failures are skipped.
/// 3. Structure all extracted texts as one batch (all-or-nothing).
/// 4. Encode the workbook.
///
/// Fails with [`InvoiceError::NoTexts`] when no input produced text.
pub async fn run_batch(
    inputs: &[String],
    services: &Services,
    config: &ServiceConfig,
) -> Result<BatchOutput, InvoiceError> {
    let cb = config.progress_callback.as_ref();
    let concurrency = config.concurrency.max(1);
    info!("Starting batch: {} input(s)", inputs.len());
    if let Some(cb) = cb {
        cb.on_batch_start(inputs.len());
    }

    // ── Step 1: Resolve inputs ───────────────────────────────────────────
    let resolved: Vec<Result<Upload, InvoiceError>> = stream::iter(inputs.iter().map(|input| {
        input::resolve_input(input, config.download_timeout_secs, config.max_upload_bytes)
    }))
    .buffered(concurrency)
    .collect()
    .await;

    let mut uploads = Vec::new();
    let mut input_index = Vec::new();
    let mut unreadable = Vec::new();
    for (i, (input, result)) in inputs.iter().zip(resolved).enumerate() {
        match result {
            Ok(upload) => {
                input_index.push(i);
                uploads.push(upload);
            }
            Err(e) => {
                warn!("Skipping '{}': {}", input, e);
                if let Some(cb) = cb {
                    cb.on_file_error(i, input, &e.user_message());
                }
                unreadable.push((input.clone(), e.to_string()));
            }
        }
    }

    // ── Step 2: Extract text ─────────────────────────────────────────────
    let mut session = Session::new().apply(SessionEvent::FilesDropped {
        names: uploads.iter().map(|u| u.filename.clone()).collect(),
    });
    for index in session.pending_indices() {
        session = session.apply(SessionEvent::ExtractionStarted { index });
    }

    let mut extractions = stream::iter(uploads.iter().enumerate().map(|(index, upload)| {
        let progress_index = input_index[index];
        async move {
            if let Some(cb) = cb {
                cb.on_file_start(progress_index, &upload.filename);
            }
            let result =
                extract_text(services.extractor.as_ref(), upload, config.max_upload_bytes).await;
            if let Some(cb) = cb {
                match &result {
                    Ok(text) => cb.on_file_extracted(progress_index, &upload.filename, text.len()),
                    Err(e) => cb.on_file_error(progress_index, &upload.filename, &e.user_message()),
                }
            }
            (index, result)
        }
    }))
    .buffer_unordered(concurrency);

    while let Some((index, result)) = extractions.next().await {
        session = session.apply(match result {
            Ok(text) => SessionEvent::ExtractionSucceeded { index, text },
            Err(e) => {
                warn!("Extraction failed for '{}': {}", uploads[index].filename, e);
                SessionEvent::ExtractionFailed {
                    index,
                    message: e.user_message(),
                }
            }
        });
    }

    // ── Step 3: Structure ────────────────────────────────────────────────
    session = session.apply(SessionEvent::ProcessingStarted);
    if !session.processing {
        return Err(InvoiceError::NoTexts);
    }
    let (submitted, texts): (Vec<usize>, Vec<String>) =
        session.texts_for_processing().into_iter().unzip();
    if let Some(cb) = cb {
        cb.on_structuring_start(texts.len());
    }

    let documents = match process_texts(services.structurer.as_ref(), &texts, concurrency).await {
        Ok(documents) => documents,
        Err(e) => {
            if let Some(cb) = cb {
                cb.on_batch_complete(0, unreadable.len() + session.files.len());
            }
            return Err(e);
        }
    };
    session = session.apply(SessionEvent::ProcessingSucceeded {
        submitted,
        data: documents.clone(),
    });

    // ── Step 4: Export ───────────────────────────────────────────────────
    session = session.apply(SessionEvent::DownloadStarted);
    let workbook = export_documents(&documents)?;
    session = session.apply(SessionEvent::DownloadSucceeded);
    debug!("Workbook encoded: {} bytes", workbook.len());

    let output = BatchOutput {
        session,
        unreadable,
        documents,
        workbook,
    };
    let failed = output.unreadable.len() + output.failed_extractions();
    info!(
        "Batch complete: {} document(s), {} file(s) skipped",
        output.documents.len(),
        failed
    );
    if let Some(cb) = cb {
        cb.on_batch_complete(output.documents.len(), failed);
    }
    Ok(output)
}

/// Run a batch and write the workbook to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn run_batch_to_file(
    inputs: &[String],
    output_path: impl AsRef<Path>,
    services: &Services,
    config: &ServiceConfig,
) -> Result<BatchOutput, InvoiceError> {
    let output = run_batch(inputs, services, config).await?;
    let path = output_path.as_ref();
    let write_err = |source| InvoiceError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("xlsx.tmp");
    tokio::fs::write(&tmp_path, &output.workbook)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {}", path.display());
    Ok(output)
}
