//! Observer trait for run events.
//!
//! Inject an [`Arc<dyn ProcessObserver>`] via
//! [`crate::config::ProcessorConfigBuilder::observer`] to receive events as
//! the pipeline settles each image.
//!
//! The core never touches presentation state. Observers can forward events
//! to a terminal progress bar, a GUI event loop, or a channel (see
//! [`crate::stream`]). The trait is `Send + Sync` because images settle on
//! tokio worker threads.
//!
//! # Example
//!
//! ```rust
//! use edgequake_html2pdf::{ProcessObserver, ProcessorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ProcessObserver for Counter {
//!     fn on_progress(&self, completed: usize, total: usize) {
//!         self.0.store(completed, Ordering::SeqCst);
//!         eprintln!("{completed}/{total} images");
//!     }
//! }
//!
//! let config = ProcessorConfig::builder()
//!     .observer(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ProcessError;
use crate::output::{DownloadOutcome, ImageReference, ProcessReport};
use std::sync::Arc;

/// Called by the pipeline as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Guarantees
///
/// * `on_progress` is called once per settled image with a strictly
///   increasing `completed`, reaching `total` exactly once.
/// * Exactly one of `on_completed` / `on_failed` is called per run, after
///   every `on_progress` call.
/// * Calls for one run never overlap: the coordinator settles images one at
///   a time.
pub trait ProcessObserver: Send + Sync {
    /// Called once after extraction, before any fetch is dispatched.
    fn on_run_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called when an image's slot is settled, before the matching
    /// `on_progress`.
    fn on_image_complete(&self, reference: &ImageReference, outcome: &DownloadOutcome) {
        let _ = (reference, outcome);
    }

    /// Called after every settled image.
    fn on_progress(&self, completed: usize, total: usize) {
        let _ = (completed, total);
    }

    /// Called once when PDF assembly begins.
    ///
    /// # Arguments
    /// * `saved_images` — number of saved images the assembler will try to draw
    fn on_assembly_start(&self, saved_images: usize) {
        let _ = saved_images;
    }

    /// Terminal event of a successful run.
    fn on_completed(&self, report: &ProcessReport) {
        let _ = report;
    }

    /// Terminal event of a run that could not proceed.
    fn on_failed(&self, error: &ProcessError) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need events.
///
/// This is the default when no observer is configured.
pub struct NoopObserver;

impl ProcessObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ProcessorConfig`].
pub type ProgressCallback = Arc<dyn ProcessObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingObserver {
        started_total: AtomicUsize,
        progress_calls: AtomicUsize,
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl ProcessObserver for TrackingObserver {
        fn on_run_start(&self, total_images: usize) {
            self.started_total.store(total_images, Ordering::SeqCst);
        }

        fn on_progress(&self, _completed: usize, _total: usize) {
            self.progress_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failed(&self, _error: &ProcessError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopObserver;
        obs.on_run_start(3);
        obs.on_progress(1, 3);
        obs.on_assembly_start(2);
        obs.on_failed(&ProcessError::NoImagesFound);
    }

    #[test]
    fn tracking_observer_receives_events() {
        let obs = TrackingObserver::default();
        obs.on_run_start(2);
        obs.on_progress(1, 2);
        obs.on_progress(2, 2);
        obs.on_failed(&ProcessError::NothingToAssemble { attempted: 2 });

        assert_eq!(obs.started_total.load(Ordering::SeqCst), 2);
        assert_eq!(obs.progress_calls.load(Ordering::SeqCst), 2);
        assert_eq!(obs.failed.load(Ordering::SeqCst), 1);
        assert_eq!(obs.completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let obs: ProgressCallback = Arc::new(NoopObserver);
        obs.on_run_start(10);
        obs.on_progress(10, 10);
    }
}
