//! Request handlers. Each one parses its input, calls one orchestration
//! step and shapes the JSON answer.

use super::error::ApiError;
use super::AppState;
use crate::error::InvoiceError;
use crate::pipeline::export::{CONTENT_TYPE, FILE_NAME};
use crate::pipeline::image::ImageRequest;
use crate::pipeline::input::Upload;
use crate::process;
use crate::schema::Document;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub data: Vec<Document>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub output: Value,
}

/// `POST /api/extract`: multipart `file` → `{text}`.
pub async fn extract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| InvoiceError::InvalidPayload(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| InvoiceError::InvalidPayload(e.body_text()))?;
        upload = Some(Upload::new(filename, bytes.to_vec()));
        break;
    }

    let upload = upload.ok_or(InvoiceError::NoFile)?;
    info!(filename = %upload.filename, bytes = upload.bytes.len(), "Extract request");

    let text = process::extract_text(
        state.services.extractor.as_ref(),
        &upload,
        state.config.max_upload_bytes,
    )
    .await?;
    Ok(Json(ExtractResponse { text }))
}

/// `POST /api/process`: `{texts: [string]}` → `{data: [Document]}`.
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let texts = parse_texts(payload)?;
    info!(documents = texts.len(), "Process request");

    let data = process::process_texts(
        state.services.structurer.as_ref(),
        &texts,
        state.config.concurrency,
    )
    .await?;
    Ok(Json(ProcessResponse { data }))
}

/// `POST /api/download`: `{data: [Document]}` → XLSX attachment.
pub async fn download(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = parse_documents(payload)?;
    info!(documents = documents.len(), "Download request");

    let bytes = process::export_documents(&documents)?;
    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{FILE_NAME}\""),
            ),
        ],
        bytes,
    ))
}

/// `POST /api/generate`: `{prompt, aspect_ratio?}` → `{success, output}`.
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = parse_image_request(payload).map_err(|e| ApiError::from(e).with_success_flag())?;
    info!(aspect_ratio = ?request.aspect_ratio, "Generate request");

    let output = state
        .services
        .images
        .generate(&request)
        .await
        .map_err(|e| ApiError::from(e).with_success_flag())?;
    Ok(Json(GenerateResponse {
        success: true,
        output,
    }))
}

/// `GET /health`.
pub async fn health() -> &'static str {
    "ok"
}

// ── Payload parsing ──────────────────────────────────────────────────────

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, InvoiceError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| InvoiceError::InvalidPayload(e.body_text()))
}

/// `texts` must be a non-empty array of strings.
fn parse_texts(payload: Result<Json<Value>, JsonRejection>) -> Result<Vec<String>, InvoiceError> {
    let body = json_body(payload).map_err(|_| InvoiceError::NoTexts)?;
    let items = match body.get("texts").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items,
        _ => return Err(InvoiceError::NoTexts),
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| InvoiceError::InvalidPayload(format!("text is not a string: {v}")))
        })
        .collect()
}

/// `data` must be an array of valid records. An empty array is allowed.
fn parse_documents(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Vec<Document>, InvoiceError> {
    let body = json_body(payload)?;
    let items = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| InvoiceError::InvalidPayload("`data` is not an array".into()))?;
    items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            Document::from_value(v.clone())
                .map_err(|e| InvoiceError::InvalidPayload(format!("record {i}: {e}")))
        })
        .collect()
}

fn parse_image_request(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<ImageRequest, InvoiceError> {
    let body = json_body(payload)?;
    let request: ImageRequest =
        serde_json::from_value(body).map_err(|_| InvoiceError::EmptyPrompt)?;
    if request.prompt.trim().is_empty() {
        return Err(InvoiceError::EmptyPrompt);
    }
    Ok(request)
}
