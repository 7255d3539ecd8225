//! # invoice-extract
//!
//! Turn PDF invoices into spreadsheet rows: a document parser reads the PDF,
//! an LLM maps the text onto a fixed invoice record, and the records are
//! flattened into one XLSX row per line item.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate the upload, or read a path / download a URL
//!  ├─ 2. Parse     LlamaParse → Markdown text
//!  ├─ 3. Structure LLM → JSON → validated Document (batch, all-or-nothing)
//!  ├─ 4. Flatten   Document + items → one FlatRow per item ("N/A" if none)
//!  └─ 5. Export    rust_xlsxwriter → extracted_data.xlsx
//! ```
//!
//! The same steps are reachable three ways: the HTTP service in
//! [`server`], the batch runner [`process::run_batch`] used by the CLI, and
//! the individual functions in [`process`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_extract::{run_batch, ServiceConfig, Services};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LLM provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ServiceConfig::builder()
//!         .llama_parse_api_key(std::env::var("LLAMA_CLOUD_API_KEY")?)
//!         .build()?;
//!     let services = Services::from_config(&config)?;
//!     let inputs = vec!["invoice.pdf".to_string()];
//!     let output = run_batch(&inputs, &services, &config).await?;
//!     std::fs::write("extracted_data.xlsx", &output.workbook)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Schema editor
//!
//! [`schema_editor`] holds the user-editable field tree (add, remove,
//! rename, retype, collapse). It is independent of the extraction prompt.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! invoice-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod flatten;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod schema_editor;
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{DocumentError, InvoiceError};
pub use flatten::{flatten_document, flatten_documents};
pub use pipeline::image::{ImageGenerator, ImageRequest};
pub use pipeline::input::Upload;
pub use pipeline::llm::DocumentStructurer;
pub use pipeline::parse::TextExtractor;
pub use process::{
    export_documents, extract_text, process_texts, run_batch, run_batch_to_file, BatchOutput,
    Services,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{Document, FlatRow, LineItem, FLAT_COLUMNS, NOT_AVAILABLE};
pub use schema_editor::{EditorCommand, EditorState, FieldNode, FieldType, FieldUpdate};
pub use session::{Session, SessionEvent};
