//! Upload → extract → process → download state, as a pure reducer.
//!
//! A [`Session`] is owned state; [`Session::apply`] takes it by value with one
//! [`SessionEvent`] and returns the next state. Nothing here performs I/O.
//! Whoever drives the network calls (the CLI batch runner, a front end, a
//! test) dispatches `*Started` before a call and `*Succeeded`/`*Failed` after.
//!
//! Files are addressed by their position in [`Session::files`]. Completions
//! for different files touch different slots, so they can arrive in any
//! order. A completion for an index that no longer exists is dropped.

use crate::schema::Document;
use serde::{Deserialize, Serialize};

pub const MSG_TEXT_EXTRACTED: &str = "Text extracted successfully";
pub const MSG_PDF_ONLY: &str = "Please upload PDF files only";
pub const MSG_NO_VALID_TEXTS: &str = "No valid texts to process";
pub const MSG_PROCESSED: &str = "Documents processed successfully";
pub const MSG_DOWNLOADED: &str = "Excel file downloaded successfully";

/// Where a single upload is in its extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Loading,
    TextReady { text: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub status: FileStatus,
    /// Set once the file's text was part of a successful structuring batch.
    pub processed: bool,
}

impl UploadedFile {
    fn new(name: String) -> Self {
        Self {
            name,
            status: FileStatus::Pending,
            processed: false,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.status {
            FileStatus::TextReady { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Files were dropped; only `.pdf` names are accepted.
    FilesDropped { names: Vec<String> },
    /// The drop target refused every file before any name was seen.
    FilesRejected,
    ExtractionStarted { index: usize },
    ExtractionSucceeded { index: usize, text: String },
    ExtractionFailed { index: usize, message: String },
    FileRemoved { index: usize },
    ProcessingStarted,
    /// `submitted` are the indices whose texts made up the batch.
    ProcessingSucceeded { submitted: Vec<usize>, data: Vec<Document> },
    ProcessingFailed { message: String },
    DownloadStarted,
    DownloadSucceeded,
    DownloadFailed { message: String },
    PreviewOpened { index: usize },
    PreviewClosed,
    NotificationDismissed { id: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub files: Vec<UploadedFile>,
    /// Aggregate result of the last successful batch.
    pub processed_data: Option<Vec<Document>>,
    pub processing: bool,
    pub downloading: bool,
    /// Text shown in the preview pane, if open.
    pub preview: Option<String>,
    pub notifications: Vec<Notification>,
    next_notification_id: u64,
}

/// Whether a dropped file name is accepted.
pub fn is_pdf_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the resulting state.
    pub fn apply(mut self, event: SessionEvent) -> Self {
        match event {
            SessionEvent::FilesDropped { names } => {
                let accepted: Vec<String> = names.into_iter().filter(|n| is_pdf_name(n)).collect();
                if accepted.is_empty() {
                    self.notify(NotificationKind::Error, MSG_PDF_ONLY);
                } else {
                    self.files.extend(accepted.into_iter().map(UploadedFile::new));
                }
            }
            SessionEvent::FilesRejected => self.notify(NotificationKind::Error, MSG_PDF_ONLY),
            SessionEvent::ExtractionStarted { index } => {
                if let Some(file) = self.files.get_mut(index) {
                    file.status = FileStatus::Loading;
                }
            }
            SessionEvent::ExtractionSucceeded { index, text } => {
                if let Some(file) = self.files.get_mut(index) {
                    file.status = FileStatus::TextReady { text };
                    self.notify(NotificationKind::Success, MSG_TEXT_EXTRACTED);
                }
            }
            SessionEvent::ExtractionFailed { index, message } => {
                if let Some(file) = self.files.get_mut(index) {
                    file.status = FileStatus::Failed {
                        message: message.clone(),
                    };
                    self.notify(NotificationKind::Error, message);
                }
            }
            SessionEvent::FileRemoved { index } => {
                if index < self.files.len() {
                    self.files.remove(index);
                }
            }
            SessionEvent::ProcessingStarted => {
                if self.texts_for_processing().is_empty() {
                    self.notify(NotificationKind::Error, MSG_NO_VALID_TEXTS);
                } else {
                    self.processing = true;
                }
            }
            SessionEvent::ProcessingSucceeded { submitted, data } => {
                for index in submitted {
                    if let Some(file) = self.files.get_mut(index) {
                        file.processed = true;
                    }
                }
                self.processed_data = Some(data);
                self.processing = false;
                self.notify(NotificationKind::Success, MSG_PROCESSED);
            }
            SessionEvent::ProcessingFailed { message } => {
                self.processing = false;
                self.notify(NotificationKind::Error, message);
            }
            SessionEvent::DownloadStarted => {
                if self.processed_data.is_some() {
                    self.downloading = true;
                }
            }
            SessionEvent::DownloadSucceeded => {
                self.downloading = false;
                self.notify(NotificationKind::Success, MSG_DOWNLOADED);
            }
            SessionEvent::DownloadFailed { message } => {
                self.downloading = false;
                self.notify(NotificationKind::Error, message);
            }
            SessionEvent::PreviewOpened { index } => {
                if let Some(text) = self.files.get(index).and_then(UploadedFile::text) {
                    self.preview = Some(text.to_string());
                }
            }
            SessionEvent::PreviewClosed => self.preview = None,
            SessionEvent::NotificationDismissed { id } => {
                self.notifications.retain(|n| n.id != id);
            }
        }
        self
    }

    fn notify(&mut self, kind: NotificationKind, message: impl Into<String>) {
        self.next_notification_id += 1;
        self.notifications.push(Notification {
            id: self.next_notification_id,
            kind,
            message: message.into(),
        });
    }

    /// Indices and texts of every file whose extraction succeeded.
    pub fn texts_for_processing(&self) -> Vec<(usize, String)> {
        self.files
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.text().map(|t| (i, t.to_string())))
            .collect()
    }

    /// Indices of files that have not been sent for extraction yet.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.status == FileStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn can_start_extraction(&self) -> bool {
        !self.processing && !self.files.is_empty() && !self.files.iter().all(|f| f.processed)
    }

    pub fn can_download(&self) -> bool {
        self.processed_data.is_some() && !self.downloading
    }

    pub fn last_notification(&self) -> Option<&Notification> {
        self.notifications.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(company: &str) -> Document {
        Document {
            company: company.into(),
            address: "addr".into(),
            total_sum: "$1".into(),
            items: vec![],
        }
    }

    fn dropped(names: &[&str]) -> Session {
        Session::new().apply(SessionEvent::FilesDropped {
            names: names.iter().map(|n| n.to_string()).collect(),
        })
    }

    fn extracted(session: Session, index: usize, text: &str) -> Session {
        session
            .apply(SessionEvent::ExtractionStarted { index })
            .apply(SessionEvent::ExtractionSucceeded {
                index,
                text: text.into(),
            })
    }

    #[test]
    fn drop_accepts_only_pdfs() {
        let s = dropped(&["a.pdf", "notes.txt", "B.PDF"]);
        let names: Vec<_> = s.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.pdf", "B.PDF"]);
        assert!(s.files.iter().all(|f| f.status == FileStatus::Pending));
        assert_eq!(s.pending_indices(), [0, 1]);
    }

    #[test]
    fn drop_without_pdfs_notifies() {
        let s = dropped(&["notes.txt"]);
        assert!(s.files.is_empty());
        assert_eq!(s.last_notification().unwrap().message, MSG_PDF_ONLY);
        assert_eq!(s.last_notification().unwrap().kind, NotificationKind::Error);
    }

    #[test]
    fn rejected_drop_notifies() {
        let s = Session::new().apply(SessionEvent::FilesRejected);
        assert!(s.files.is_empty());
        assert_eq!(s.last_notification().unwrap().message, MSG_PDF_ONLY);
    }

    #[test]
    fn extraction_failure_is_isolated() {
        let s = dropped(&["a.pdf", "b.pdf", "c.pdf"]);
        let s = extracted(s, 0, "alpha")
            .apply(SessionEvent::ExtractionStarted { index: 1 })
            .apply(SessionEvent::ExtractionFailed {
                index: 1,
                message: "Unable to read".into(),
            });
        let s = extracted(s, 2, "gamma");

        assert_eq!(s.files[0].text(), Some("alpha"));
        assert_eq!(
            s.files[1].status,
            FileStatus::Failed {
                message: "Unable to read".into()
            }
        );
        assert_eq!(s.files[2].text(), Some("gamma"));
        assert_eq!(
            s.texts_for_processing(),
            vec![(0, "alpha".to_string()), (2, "gamma".to_string())]
        );
    }

    #[test]
    fn completions_in_any_order_land_in_their_slot() {
        let s = dropped(&["a.pdf", "b.pdf"])
            .apply(SessionEvent::ExtractionStarted { index: 0 })
            .apply(SessionEvent::ExtractionStarted { index: 1 })
            .apply(SessionEvent::ExtractionSucceeded {
                index: 1,
                text: "second".into(),
            })
            .apply(SessionEvent::ExtractionSucceeded {
                index: 0,
                text: "first".into(),
            });
        assert_eq!(s.files[0].text(), Some("first"));
        assert_eq!(s.files[1].text(), Some("second"));
    }

    #[test]
    fn completion_for_removed_index_is_dropped() {
        let s = dropped(&["a.pdf"])
            .apply(SessionEvent::ExtractionStarted { index: 0 })
            .apply(SessionEvent::FileRemoved { index: 0 })
            .apply(SessionEvent::ExtractionSucceeded {
                index: 0,
                text: "late".into(),
            });
        assert!(s.files.is_empty());
        assert!(s.notifications.is_empty());
    }

    #[test]
    fn processing_without_texts_notifies_and_stays_idle() {
        let s = dropped(&["a.pdf"]).apply(SessionEvent::ProcessingStarted);
        assert!(!s.processing);
        assert_eq!(s.last_notification().unwrap().message, MSG_NO_VALID_TEXTS);
    }

    #[test]
    fn processing_success_marks_only_submitted_files() {
        let s = dropped(&["a.pdf", "b.pdf"]);
        let s = extracted(s, 0, "alpha").apply(SessionEvent::ExtractionFailed {
            index: 1,
            message: "bad".into(),
        });
        let submitted: Vec<usize> = s.texts_for_processing().iter().map(|(i, _)| *i).collect();
        let s = s
            .apply(SessionEvent::ProcessingStarted)
            .apply(SessionEvent::ProcessingSucceeded {
                submitted,
                data: vec![doc("Acme")],
            });
        assert!(!s.processing);
        assert!(s.files[0].processed);
        assert!(!s.files[1].processed);
        assert_eq!(s.processed_data.as_ref().unwrap()[0].company, "Acme");
        assert_eq!(s.last_notification().unwrap().message, MSG_PROCESSED);
        assert!(s.can_start_extraction());
        assert!(s.can_download());
    }

    #[test]
    fn processing_failure_keeps_prior_data() {
        let s = extracted(dropped(&["a.pdf"]), 0, "alpha")
            .apply(SessionEvent::ProcessingStarted)
            .apply(SessionEvent::ProcessingSucceeded {
                submitted: vec![0],
                data: vec![doc("Old")],
            });
        let before = s.notifications.len();
        let s = s
            .apply(SessionEvent::ProcessingStarted)
            .apply(SessionEvent::ProcessingFailed {
                message: "Some documents failed to process".into(),
            });
        assert_eq!(s.notifications.len(), before + 1);
        assert_eq!(s.processed_data.as_ref().unwrap()[0].company, "Old");
        assert!(!s.processing);
    }

    #[test]
    fn all_processed_disables_extraction() {
        let s = extracted(dropped(&["a.pdf"]), 0, "alpha").apply(
            SessionEvent::ProcessingSucceeded {
                submitted: vec![0],
                data: vec![doc("Acme")],
            },
        );
        assert!(!s.can_start_extraction());
    }

    #[test]
    fn download_failure_leaves_state_untouched() {
        let s = extracted(dropped(&["a.pdf"]), 0, "alpha").apply(
            SessionEvent::ProcessingSucceeded {
                submitted: vec![0],
                data: vec![doc("Acme")],
            },
        );
        let files = s.files.clone();
        let data = s.processed_data.clone();
        let s = s.apply(SessionEvent::DownloadStarted);
        assert!(s.downloading);
        assert!(!s.can_download());
        let s = s.apply(SessionEvent::DownloadFailed {
            message: "Failed to generate Excel file".into(),
        });
        assert!(!s.downloading);
        assert_eq!(s.files, files);
        assert_eq!(s.processed_data, data);
        assert_eq!(s.last_notification().unwrap().kind, NotificationKind::Error);
    }

    #[test]
    fn download_requires_data() {
        let s = Session::new().apply(SessionEvent::DownloadStarted);
        assert!(!s.downloading);
    }

    #[test]
    fn preview_and_dismiss() {
        let s = extracted(dropped(&["a.pdf"]), 0, "alpha").apply(SessionEvent::PreviewOpened { index: 0 });
        assert_eq!(s.preview.as_deref(), Some("alpha"));
        let s = s.apply(SessionEvent::PreviewClosed);
        assert!(s.preview.is_none());

        let id = s.last_notification().unwrap().id;
        let s = s.apply(SessionEvent::NotificationDismissed { id });
        assert!(s.notifications.iter().all(|n| n.id != id));
    }

    #[test]
    fn notification_ids_increase() {
        let s = dropped(&["x.txt"]).apply(SessionEvent::FilesDropped {
            names: vec!["y.txt".into()],
        });
        assert_eq!(s.notifications[0].id + 1, s.notifications[1].id);
    }
}
