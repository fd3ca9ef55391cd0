//! # edgequake-html2pdf
//!
//! Collect every image an HTML page references and bind them into a PDF,
//! one image per page.
//!
//! ## Why this crate?
//!
//! Galleries, scanned books and comic readers are often published as plain
//! HTML pages holding a long run of `<img>` tags. This crate pulls all of
//! them down at once, keeps them in the order the page lists them no matter
//! which download finishes first, and lays each one out centered on its own
//! page. Images that cannot be fetched are reported by URL instead of
//! aborting the run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! HTML
//!  │
//!  ├─ 1. Extract   regex scan for <img src>, resolve against base, dedupe
//!  ├─ 2. Fetch     one tokio task per image (HTTP, data:, file:)
//!  ├─ 3. Persist   image_{index}.{ext} under the output directory
//!  ├─ 4. Barrier   single owner loop fills the table in discovery order
//!  ├─ 5. Assemble  decode, fit, center, one page each (spawn_blocking)
//!  └─ 6. Report    PDF path + failed URLs + per-run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_html2pdf::{HtmlProcessor, ProcessorConfig, RunOptions};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessorConfig::builder()
//!         .output_dir("images")
//!         .pdf_path("gallery.pdf")
//!         .build()?;
//!     let processor = HtmlProcessor::new(config);
//!
//!     let html = std::fs::read_to_string("gallery.html")?;
//!     let base = Url::parse("https://example.com/gallery/")?;
//!     let report = processor.process(html, &base, RunOptions::default()).wait().await?;
//!
//!     eprintln!("{} pages, {} failed",
//!         report.stats.pages_written,
//!         report.failed_urls.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `html2pdf` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-html2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    Orientation, PageGeometry, PageSize, ProcessorConfig, ProcessorConfigBuilder, RunOptions,
};
pub use error::{ImageError, ProcessError};
pub use output::{
    DownloadOutcome, DownloadTable, ImageReference, ProcessReport, ProcessStats, Progress,
};
pub use pipeline::extract::extract;
pub use pipeline::fetch::{
    CorrelationToken, FetchRequest, FetchResponse, FetchedImage, HttpFetcher, ImageFetcher,
};
pub use processor::{process_sync, HtmlProcessor, ProcessHandle};
pub use progress::{NoopObserver, ProcessObserver, ProgressCallback};
pub use stream::{ChannelObserver, EventStream, ProcessEvent};
