//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step. The three
//! stages that talk to an external service sit behind a trait
//! ([`parse::TextExtractor`], [`llm::DocumentStructurer`],
//! [`image::ImageGenerator`]) so the orchestration code and the HTTP
//! handlers can be exercised with in-process fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ llm ──▶ postprocess ──▶ export
//! (upload)  (LlamaParse) (chat)  (JSON repair)   (XLSX)
//! ```
//!
//! 1. [`input`]  — validate an upload, or read a path / download a URL
//! 2. [`parse`]  — PDF bytes to Markdown text via LlamaParse
//! 3. [`llm`]    — text to a structured record; the retry loop lives here
//! 4. [`postprocess`] — repair and validate the model's JSON
//! 5. [`export`] — flatten records and encode the workbook
//!
//! [`image`] is independent of the others.

pub mod export;
pub mod image;
pub mod input;
pub mod llm;
pub mod parse;
pub mod postprocess;
