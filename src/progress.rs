//! Progress-callback trait for batch extraction events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ServiceConfigBuilder::progress_callback`] to receive
//! events while [`crate::process::run_batch`] works through its inputs.
//! The CLI drives its progress bar from these; a library user can forward
//! them to a channel or a log.
//!
//! # Example
//!
//! ```rust
//! use invoice_extract::{BatchProgressCallback, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     extracted: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_extracted(&self, index: usize, name: &str, text_len: usize) {
//!         self.extracted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("#{index} {name}: {text_len} chars");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { extracted: AtomicUsize::new(0) });
//!
//! let config = ServiceConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch runner as it processes each file.
///
/// Extraction runs concurrently, so the per-file methods may be called from
/// different tasks at once. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any file is read.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file is sent for text extraction.
    fn on_file_start(&self, index: usize, name: &str) {
        let _ = (index, name);
    }

    /// Called when a file's text was extracted.
    fn on_file_extracted(&self, index: usize, name: &str, text_len: usize) {
        let _ = (index, name, text_len);
    }

    /// Called when a file could not be read or extracted.
    fn on_file_error(&self, index: usize, name: &str, error: &str) {
        let _ = (index, name, error);
    }

    /// Called before the extracted texts are sent to the LLM as one batch.
    fn on_structuring_start(&self, documents: usize) {
        let _ = documents;
    }

    /// Called once at the end with the number of structured documents and
    /// the number of files that failed extraction.
    fn on_batch_complete(&self, documents: usize, failed_files: usize) {
        let _ = (documents, failed_files);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        extracted: AtomicUsize,
        errors: AtomicUsize,
        documents: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_file_start(&self, _index: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_extracted(&self, _index: usize, _name: &str, _text_len: usize) {
            self.extracted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, documents: usize, _failed_files: usize) {
            self.documents.store(documents, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(0, "a.pdf");
        cb.on_file_extracted(0, "a.pdf", 42);
        cb.on_file_error(1, "b.pdf", "unreadable");
        cb.on_structuring_start(1);
        cb.on_batch_complete(1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_file_start(0, "a.pdf");
        tracker.on_file_extracted(0, "a.pdf", 100);
        tracker.on_file_start(1, "b.pdf");
        tracker.on_file_error(1, "b.pdf", "timeout");
        tracker.on_batch_complete(1, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.extracted.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.documents.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_file_start(0, "x.pdf");
    }
}
