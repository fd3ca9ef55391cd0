//! Streaming run API: receive run events as an async `Stream`.
//!
//! [`crate::processor::HtmlProcessor::process_stream`] installs a
//! [`ChannelObserver`] next to any configured observer and hands back the
//! receiving end. Events arrive in the order the pipeline emits them and the
//! stream ends right after the terminal [`ProcessEvent::Completed`] or
//! [`ProcessEvent::Failed`].

use crate::error::ProcessError;
use crate::output::{DownloadOutcome, ImageReference, ProcessReport};
use crate::progress::{ProcessObserver, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A stream of run events, ending after the terminal event.
pub type EventStream = UnboundedReceiverStream<ProcessEvent>;

/// One observable step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    Started {
        total: usize,
    },
    ImageSettled {
        index: usize,
        url: String,
        saved_path: Option<PathBuf>,
        error: Option<String>,
    },
    Progress {
        completed: usize,
        total: usize,
    },
    AssemblyStarted {
        saved_images: usize,
    },
    Completed {
        pdf_path: Option<PathBuf>,
        failed_urls: Vec<String>,
    },
    Failed {
        reason: String,
    },
}

impl ProcessEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessEvent::Completed { .. } | ProcessEvent::Failed { .. })
    }
}

/// Observer that forwards every event into an unbounded channel.
///
/// The sender is dropped with the terminal event so the stream closes even
/// while the processor still holds the observer.
pub struct ChannelObserver {
    tx: Mutex<Option<mpsc::UnboundedSender<ProcessEvent>>>,
}

impl ChannelObserver {
    pub fn new() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            UnboundedReceiverStream::new(rx),
        )
    }

    fn send(&self, event: ProcessEvent) {
        let Ok(mut guard) = self.tx.lock() else {
            return;
        };
        let terminal = event.is_terminal();
        if let Some(tx) = guard.as_ref() {
            // A dropped stream just means nobody is listening.
            let _ = tx.send(event);
        }
        if terminal {
            guard.take();
        }
    }
}

impl ProcessObserver for ChannelObserver {
    fn on_run_start(&self, total_images: usize) {
        self.send(ProcessEvent::Started {
            total: total_images,
        });
    }

    fn on_image_complete(&self, reference: &ImageReference, outcome: &DownloadOutcome) {
        let error = match outcome {
            DownloadOutcome::Failed { error, .. } => Some(error.to_string()),
            _ => None,
        };
        self.send(ProcessEvent::ImageSettled {
            index: reference.index,
            url: reference.url.to_string(),
            saved_path: outcome.saved_path().map(|p| p.to_path_buf()),
            error,
        });
    }

    fn on_progress(&self, completed: usize, total: usize) {
        self.send(ProcessEvent::Progress { completed, total });
    }

    fn on_assembly_start(&self, saved_images: usize) {
        self.send(ProcessEvent::AssemblyStarted { saved_images });
    }

    fn on_completed(&self, report: &ProcessReport) {
        self.send(ProcessEvent::Completed {
            pdf_path: report.pdf_path.clone(),
            failed_urls: report.failed_urls.clone(),
        });
    }

    fn on_failed(&self, error: &ProcessError) {
        self.send(ProcessEvent::Failed {
            reason: error.to_string(),
        });
    }
}

/// Fans each event out to several observers in order.
pub(crate) struct Tee(pub(crate) Vec<ProgressCallback>);

impl ProcessObserver for Tee {
    fn on_run_start(&self, total_images: usize) {
        self.0.iter().for_each(|o| o.on_run_start(total_images));
    }

    fn on_image_complete(&self, reference: &ImageReference, outcome: &DownloadOutcome) {
        self.0
            .iter()
            .for_each(|o| o.on_image_complete(reference, outcome));
    }

    fn on_progress(&self, completed: usize, total: usize) {
        self.0.iter().for_each(|o| o.on_progress(completed, total));
    }

    fn on_assembly_start(&self, saved_images: usize) {
        self.0.iter().for_each(|o| o.on_assembly_start(saved_images));
    }

    fn on_completed(&self, report: &ProcessReport) {
        self.0.iter().for_each(|o| o.on_completed(report));
    }

    fn on_failed(&self, error: &ProcessError) {
        self.0.iter().for_each(|o| o.on_failed(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;
    use futures::StreamExt;
    use url::Url;

    #[test]
    fn stream_ends_after_terminal_event() {
        let (observer, stream) = ChannelObserver::new();
        observer.on_run_start(1);
        observer.on_progress(1, 1);
        observer.on_failed(&ProcessError::NoImagesFound);
        // Ignored: the channel closed with the terminal event.
        observer.on_progress(2, 1);

        let events: Vec<ProcessEvent> = tokio_test::block_on(stream.collect());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ProcessEvent::Started { total: 1 });
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn failed_image_carries_error_text() {
        let (observer, mut stream) = ChannelObserver::new();
        let reference = ImageReference {
            index: 3,
            url: Url::parse("https://x.test/a.png").unwrap(),
        };
        let outcome = DownloadOutcome::Failed {
            url: reference.url.to_string(),
            error: ImageError::HttpStatus { status: 404 },
        };
        observer.on_image_complete(&reference, &outcome);

        match stream.next().await.unwrap() {
            ProcessEvent::ImageSettled {
                index,
                saved_path,
                error,
                ..
            } => {
                assert_eq!(index, 3);
                assert!(saved_path.is_none());
                assert_eq!(error.as_deref(), Some("HTTP 404"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_string(&ProcessEvent::Progress {
            completed: 1,
            total: 2,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"progress","completed":1,"total":2}"#);
    }
}
