//! HTTP error responses.
//!
//! Every failing request answers with `{"error": "<user message>"}`. Bad
//! input is a 400; anything that went wrong downstream is a 500 whose
//! internal detail only reaches the log. A failed batch also lists the
//! failing documents under `details` (index and kind only), and the image
//! endpoint adds `"success": false`.

use crate::error::{DocumentError, InvoiceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// Message shown for every failed document in a batch.
const DOCUMENT_FAILED: &str = "Failed to process document";

/// What a client sees of one failed document.
#[derive(Debug, Serialize)]
struct DocumentFailure {
    index: usize,
    kind: &'static str,
    error: &'static str,
}

impl From<&DocumentError> for DocumentFailure {
    fn from(e: &DocumentError) -> Self {
        Self {
            index: e.index(),
            kind: e.kind(),
            error: DOCUMENT_FAILED,
        }
    }
}

/// An [`InvoiceError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError {
    error: InvoiceError,
    success_flag: bool,
}

impl ApiError {
    /// Include `"success": false` in the body.
    pub fn with_success_flag(mut self) -> Self {
        self.success_flag = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        if self.error.is_bad_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({ "error": self.error.user_message() });
        if let InvoiceError::BatchFailed { details, .. } = &self.error {
            let failures: Vec<DocumentFailure> = details.iter().map(DocumentFailure::from).collect();
            body["details"] = json!(failures);
        }
        if self.success_flag {
            body["success"] = json!(false);
        }
        body
    }
}

impl From<InvoiceError> for ApiError {
    fn from(error: InvoiceError) -> Self {
        Self {
            error,
            success_flag: false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.error, "Request failed");
        } else {
            tracing::warn!(error = %self.error, "Rejected request");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn bad_input_returns_400() {
        let response = ApiError::from(InvoiceError::NoTexts).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No texts provided");
    }

    #[tokio::test]
    async fn downstream_failure_hides_detail() {
        let response = ApiError::from(InvoiceError::ParseFailed {
            filename: "a.pdf".into(),
            detail: "HTTP 502 upstream".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(
            json["error"],
            "Unable to read the PDF file. Please make sure it is not corrupted."
        );
        assert!(!json.to_string().contains("502"));
    }

    #[tokio::test]
    async fn batch_failure_lists_details() {
        let response = ApiError::from(InvoiceError::BatchFailed {
            failed: 1,
            total: 2,
            details: vec![DocumentError::InvalidResponse {
                index: 1,
                detail: "schema validation failed".into(),
            }],
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Some documents failed to process");
        assert_eq!(json["details"][0]["index"], 1);
        assert_eq!(json["details"][0]["kind"], "invalid_response");
        assert_eq!(json["details"][0]["error"], "Failed to process document");
        assert!(!json.to_string().contains("schema validation"));
    }

    #[tokio::test]
    async fn batch_failure_hides_provider_message() {
        let response = ApiError::from(InvoiceError::BatchFailed {
            failed: 1,
            total: 1,
            details: vec![DocumentError::LlmFailed {
                index: 0,
                attempts: 1,
                detail: "API error 401: Incorrect API key provided: sk-test-abc".into(),
            }],
        })
        .into_response();
        let json = body_json(response).await;
        assert_eq!(json["details"][0]["kind"], "llm_failed");
        assert!(json["details"][0].get("detail").is_none());
        assert!(json["details"][0].get("attempts").is_none());
        assert!(!json.to_string().contains("sk-test-abc"));
    }

    #[tokio::test]
    async fn success_flag_is_added() {
        let response = ApiError::from(InvoiceError::ImageGenerationFailed("boom".into()))
            .with_success_flag()
            .into_response();
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Failed to generate image");
    }
}
