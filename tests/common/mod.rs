//! In-process stand-ins for the external services.

#![allow(dead_code)]

use futures::future::BoxFuture;
use invoice_extract::{
    Document, DocumentError, DocumentStructurer, ImageGenerator, ImageRequest, InvoiceError,
    LineItem, ServiceConfig, Services, TextExtractor, Upload,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Returns `"Invoice from <stem>"`, unless the bytes say otherwise:
/// `CORRUPT` fails like an unreadable PDF, `BLANK` returns whitespace.
pub struct FakeExtractor;

impl TextExtractor for FakeExtractor {
    fn extract<'a>(&'a self, upload: &'a Upload) -> BoxFuture<'a, Result<String, InvoiceError>> {
        Box::pin(async move {
            let body = String::from_utf8_lossy(&upload.bytes);
            if body.contains("CORRUPT") {
                return Err(InvoiceError::ParseFailed {
                    filename: upload.filename.clone(),
                    detail: "job ended with status ERROR".into(),
                });
            }
            if body.contains("BLANK") {
                return Ok("   \n".into());
            }
            let stem = upload.filename.trim_end_matches(".pdf");
            Ok(format!("Invoice from {stem}"))
        })
    }
}

/// Uses the text as the company name; texts containing `FAIL` fail.
pub struct FakeStructurer;

impl DocumentStructurer for FakeStructurer {
    fn structure<'a>(
        &'a self,
        index: usize,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Document, DocumentError>> {
        Box::pin(async move {
            if text.contains("FAIL") {
                return Err(DocumentError::InvalidResponse {
                    index,
                    detail: "schema validation failed: missing field `total_sum`".into(),
                });
            }
            Ok(Document {
                company: text.to_string(),
                address: "1 Test Road".into(),
                total_sum: "$10.00".into(),
                items: vec![LineItem {
                    item: "Widget".into(),
                    unit_price: "$5.00".into(),
                    quantity: "2".into(),
                    sum: "$10.00".into(),
                }],
            })
        })
    }
}

/// Echoes the prompt into a fake URL; the prompt `fail` fails.
pub struct FakeImages;

impl ImageGenerator for FakeImages {
    fn generate<'a>(&'a self, request: &'a ImageRequest) -> BoxFuture<'a, Result<Value, InvoiceError>> {
        Box::pin(async move {
            if request.prompt == "fail" {
                return Err(InvoiceError::ImageGenerationFailed("HTTP 422".into()));
            }
            Ok(json!(format!(
                "https://images.test/{}.png?ar={}",
                request.prompt.replace(' ', "-"),
                request.aspect_ratio.as_deref().unwrap_or("3:2")
            )))
        })
    }
}

pub fn fake_services() -> Services {
    Services {
        extractor: Arc::new(FakeExtractor),
        structurer: Arc::new(FakeStructurer),
        images: Arc::new(FakeImages),
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig::builder()
        .concurrency(4)
        .max_upload_bytes(64 * 1024)
        .build()
        .unwrap()
}

/// Minimal bytes that pass the PDF magic check.
pub fn pdf_bytes(marker: &str) -> Vec<u8> {
    format!("%PDF-1.4\n% {marker}\n%%EOF\n").into_bytes()
}
