//! Run entry points.
//!
//! [`HtmlProcessor::process`] starts a run in its own tokio task and returns
//! a [`ProcessHandle`] straight away. Events go to the configured observer
//! while the run progresses; the handle yields the same terminal result the
//! observer saw. Use [`HtmlProcessor::process_stream`] to consume the events
//! as a `Stream` instead, or [`process_sync`] from non-async code.
//!
//! Every call builds a fresh job (references, table, counters) owned by its
//! task, so nothing carries over between runs. Overlapping runs that share
//! an output directory or PDF path will overwrite each other's files.

use crate::config::{ProcessorConfig, RunOptions};
use crate::error::ProcessError;
use crate::output::{ProcessReport, ProcessStats};
use crate::pipeline::assemble;
use crate::pipeline::coordinator::FetchCoordinator;
use crate::pipeline::extract;
use crate::pipeline::fetch::{HttpFetcher, ImageFetcher};
use crate::progress::{NoopObserver, ProgressCallback};
use crate::stream::{ChannelObserver, EventStream, Tee};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info};
use url::Url;

/// Turns HTML pages into image folders and PDFs.
///
/// Cheap to clone; clones share the configuration.
///
/// # Example
/// ```rust,no_run
/// use edgequake_html2pdf::{HtmlProcessor, ProcessorConfig, RunOptions};
/// use url::Url;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let processor = HtmlProcessor::new(ProcessorConfig::default());
/// let base = Url::parse("https://example.com/gallery/")?;
/// let html = r#"<img src="one.png"><img src="two.jpg">"#;
///
/// let report = processor.process(html, &base, RunOptions::default()).wait().await?;
/// println!("PDF at {:?}, {} failed", report.pdf_path, report.failed_urls.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HtmlProcessor {
    config: Arc<ProcessorConfig>,
}

impl HtmlProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Start a run over `html`, resolving relative sources against
    /// `base_url`.
    ///
    /// The run ends with exactly one of `on_completed` / `on_failed` on the
    /// configured observer.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn process(
        &self,
        html: impl Into<String>,
        base_url: &Url,
        options: RunOptions,
    ) -> ProcessHandle {
        let observer = self
            .config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));
        self.spawn(html.into(), base_url.clone(), options, observer)
    }

    /// Like [`process`](Self::process), also returning every event as a
    /// stream. The configured observer, if any, still receives each event
    /// first.
    pub fn process_stream(
        &self,
        html: impl Into<String>,
        base_url: &Url,
        options: RunOptions,
    ) -> (ProcessHandle, EventStream) {
        let (channel, events) = ChannelObserver::new();
        let mut observers: Vec<ProgressCallback> = Vec::with_capacity(2);
        if let Some(ref configured) = self.config.observer {
            observers.push(Arc::clone(configured));
        }
        observers.push(Arc::new(channel));

        let handle = self.spawn(
            html.into(),
            base_url.clone(),
            options,
            Arc::new(Tee(observers)),
        );
        (handle, events)
    }

    fn spawn(
        &self,
        html: String,
        base_url: Url,
        options: RunOptions,
        observer: ProgressCallback,
    ) -> ProcessHandle {
        let config = Arc::clone(&self.config);
        let task = tokio::spawn(async move {
            let run = AssertUnwindSafe(execute(&config, &observer, &html, &base_url, options))
                .catch_unwind()
                .await;
            let result = run.unwrap_or_else(|_| {
                Err(ProcessError::Internal("processing task panicked".into()))
            });

            match &result {
                Ok(report) => observer.on_completed(report),
                Err(e) => {
                    error!("Run failed: {}", e);
                    observer.on_failed(e);
                }
            }
            result
        });
        ProcessHandle { task }
    }
}

/// Handle to a run started by [`HtmlProcessor::process`].
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct ProcessHandle {
    task: JoinHandle<Result<ProcessReport, ProcessError>>,
}

impl ProcessHandle {
    /// Wait for the terminal result of the run.
    pub async fn wait(self) -> Result<ProcessReport, ProcessError> {
        self.task
            .await
            .map_err(|e| ProcessError::Internal(format!("processing task failed: {e}")))?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Synchronous wrapper around [`HtmlProcessor::process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    config: ProcessorConfig,
    html: impl Into<String>,
    base_url: &Url,
    options: RunOptions,
) -> Result<ProcessReport, ProcessError> {
    let html = html.into();
    tokio::runtime::Runtime::new()
        .map_err(|e| ProcessError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(async {
            HtmlProcessor::new(config)
                .process(html, base_url, options)
                .wait()
                .await
        })
}

async fn execute(
    config: &ProcessorConfig,
    observer: &ProgressCallback,
    html: &str,
    base_url: &Url,
    options: RunOptions,
) -> Result<ProcessReport, ProcessError> {
    let total_start = Instant::now();

    // ── Step 1: Extract references ───────────────────────────────────────
    let references = extract::extract(html, base_url);
    if references.is_empty() {
        return Err(ProcessError::NoImagesFound);
    }
    info!("Found {} image references", references.len());

    // ── Step 2: Fetch every image ────────────────────────────────────────
    let fetcher = resolve_fetcher(config)?;
    observer.on_run_start(references.len());

    let fetch_start = Instant::now();
    let table = FetchCoordinator::new(
        fetcher,
        Arc::clone(observer),
        config.output_dir.clone(),
        options,
    )
    .with_max_in_flight(config.max_concurrent_fetches)
    // Only a page read from disk may pull images from disk.
    .with_local_files(base_url.scheme() == "file")
    .run(&references)
    .await;
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;

    // ── Step 3: Assemble the PDF ─────────────────────────────────────────
    let assembly_start = Instant::now();
    let assembled = if options.generate_pdf {
        observer.on_assembly_start(table.saved_count());
        Some(assemble::assemble(&table, config.page, &config.pdf_path).await?)
    } else {
        None
    };
    let assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;

    // ── Step 4: Report ───────────────────────────────────────────────────
    let stats = ProcessStats {
        total_images: references.len(),
        saved_images: table.saved_count(),
        failed_images: table.failed_count(),
        pages_written: assembled.as_ref().map_or(0, |a| a.pages),
        skipped_images: assembled.as_ref().map_or(0, |a| a.skipped.len()),
        fetch_duration_ms,
        assembly_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Run complete: {}/{} images saved, {} pages, {}ms total",
        stats.saved_images, stats.total_images, stats.pages_written, stats.total_duration_ms
    );

    Ok(ProcessReport {
        pdf_path: assembled.map(|a| a.path),
        failed_urls: table.failed_urls().to_vec(),
        references,
        table,
        stats,
    })
}

/// Use the injected fetcher, or build the default HTTP one.
fn resolve_fetcher(config: &ProcessorConfig) -> Result<Arc<dyn ImageFetcher>, ProcessError> {
    if let Some(ref fetcher) = config.fetcher {
        return Ok(Arc::clone(fetcher));
    }
    let http = HttpFetcher::new(config.fetch_timeout_secs, &config.user_agent)
        .map_err(|e| ProcessError::Internal(format!("HTTP client: {e}")))?;
    Ok(Arc::new(http))
}
