//! Fan-out/fan-in download coordination.
//!
//! ## Shape
//!
//! ```text
//!             ┌── task 0: fetch → save ──┐
//! run(refs) ──┼── task 1: fetch → save ──┼──▶ mpsc ──▶ owner loop ──▶ DownloadTable
//!             └── task N: fetch → save ──┘            (record, progress)
//! ```
//!
//! Every reference gets its own tokio task. A task fetches, writes the file
//! if the run wants files, and sends one [`Completion`] message. The loop in
//! [`FetchCoordinator::run`] is the only code that touches the table, the
//! outstanding count and the failed-URL list, so completions are applied one
//! at a time no matter how the tasks interleave. `run` returns exactly once,
//! after the last slot is settled: that return is the barrier.

use crate::config::RunOptions;
use crate::error::ImageError;
use crate::output::{DownloadOutcome, DownloadTable, ImageReference};
use crate::pipeline::fetch::{CorrelationToken, FetchRequest, FetchResponse, ImageFetcher};
use crate::pipeline::persist;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Message sent by a fetch task once its image is settled.
#[derive(Debug)]
struct Completion {
    token: CorrelationToken,
    result: Result<DownloadOutcome, ImageError>,
}

/// Dispatches one fetch per reference and aggregates the results in
/// discovery order.
pub struct FetchCoordinator {
    fetcher: Arc<dyn ImageFetcher>,
    observer: ProgressCallback,
    output_dir: PathBuf,
    options: RunOptions,
    max_in_flight: Option<usize>,
    allow_local_files: bool,
}

impl FetchCoordinator {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        observer: ProgressCallback,
        output_dir: impl Into<PathBuf>,
        options: RunOptions,
    ) -> Self {
        Self {
            fetcher,
            observer,
            output_dir: output_dir.into(),
            options,
            max_in_flight: None,
            allow_local_files: false,
        }
    }

    /// Cap the number of fetches in flight. `None` dispatches everything at once.
    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit.map(|n| n.max(1));
        self
    }

    /// Let `file:` references reach the fetcher. Off by default: a page that
    /// did not itself come from the local disk must not read it.
    pub fn with_local_files(mut self, allow: bool) -> Self {
        self.allow_local_files = allow;
        self
    }

    /// Fetch every reference and return the settled table.
    ///
    /// The returned table has one outcome per reference. Progress is
    /// reported through the observer after each settled slot.
    pub async fn run(&self, refs: &[ImageReference]) -> DownloadTable {
        let total = refs.len();
        let mut table = DownloadTable::new(total);
        if total == 0 {
            return table;
        }

        if self.options.writes_images() {
            if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
                // Each write will fail and be recorded per image.
                warn!(
                    "Could not create image directory {}: {}",
                    self.output_dir.display(),
                    e
                );
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let limiter = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));

        for reference in refs {
            let request = FetchRequest {
                url: reference.url.clone(),
                token: CorrelationToken::for_index(reference.index),
            };
            let fetcher = Arc::clone(&self.fetcher);
            let limiter = limiter.clone();
            let output_dir = self.output_dir.clone();
            let writes_images = self.options.writes_images();
            let blocked = request.url.scheme() == "file" && !self.allow_local_files;
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                let response = if blocked {
                    FetchResponse::reply(
                        &request,
                        Err(ImageError::UnsupportedScheme {
                            scheme: "file".into(),
                        }),
                    )
                } else {
                    fetcher.fetch(request).await
                };
                let completion = settle(response, &output_dir, writes_images).await;
                // The receiver only goes away once the table is complete.
                let _ = tx.send(completion);
            });
        }
        drop(tx);
        info!("Dispatched {} image fetches", total);

        while let Some(completion) = rx.recv().await {
            self.apply(&mut table, refs, completion);
            if table.is_complete() {
                break;
            }
        }

        // Every sender is gone but slots are still open: a task panicked or
        // a fetcher answered with someone else's token.
        for index in table.open_slots() {
            warn!("Image {} ({}) ended without a response", index, refs[index].url);
            self.apply(
                &mut table,
                refs,
                Completion {
                    token: CorrelationToken::for_index(index),
                    result: Err(ImageError::Lost),
                },
            );
        }

        info!(
            "All {} fetches settled: {} failed",
            total,
            table.failed_urls().len()
        );
        table
    }

    /// Record one completion and notify the observer.
    fn apply(&self, table: &mut DownloadTable, refs: &[ImageReference], completion: Completion) {
        let index = completion.token.index();
        let Some(reference) = refs.get(index) else {
            warn!("Ignoring completion with unknown token {}", index);
            return;
        };

        let outcome = completion
            .result
            .unwrap_or_else(|error| DownloadOutcome::Failed {
                url: reference.url.to_string(),
                error,
            });

        match table.record(index, outcome) {
            Ok(progress) => {
                if let Some(outcome) = table.get(index) {
                    match outcome {
                        DownloadOutcome::Failed { error, .. } => {
                            warn!("Image {} failed ({}): {}", index, reference.url, error)
                        }
                        _ => debug!("Image {} settled ({})", index, reference.url),
                    }
                    self.observer.on_image_complete(reference, outcome);
                }
                self.observer.on_progress(progress.completed, progress.total);
            }
            Err(e) => warn!("Ignoring completion for {}: {}", reference.url, e),
        }
    }
}

/// Turn a fetch response into a completion, writing the file when asked.
async fn settle(response: FetchResponse, output_dir: &Path, writes_images: bool) -> Completion {
    let token = response.token;
    let result = match response.result {
        Ok(image) if writes_images => persist::save_image(
            output_dir,
            token.index(),
            &image.content_type,
            &image.bytes,
        )
        .await
        .map(|path| DownloadOutcome::Saved {
            path,
            content_type: image.content_type,
        }),
        Ok(image) => Ok(DownloadOutcome::Fetched {
            bytes: image.bytes.len(),
            content_type: image.content_type,
        }),
        Err(e) => Err(e),
    };
    Completion { token, result }
}
