//! Error types for the edgequake-html2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ProcessError`] — **Fatal**: the run cannot proceed at all (no image
//!   references in the page, nothing survived to be drawn, the PDF target
//!   cannot be written). Reported once through
//!   [`crate::progress::ProcessObserver::on_failed`] and returned as
//!   `Err(ProcessError)` from [`crate::processor::ProcessHandle::wait`].
//!
//! * [`ImageError`] — **Non-fatal**: a single image could not be fetched or
//!   written. Stored inside [`crate::output::DownloadOutcome::Failed`]; the
//!   run carries on with the remaining images and reports the URL in its
//!   failed list.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-html2pdf library.
///
/// Per-image failures use [`ImageError`] and are stored in the download
/// table rather than propagated here.
#[derive(Debug, Error)]
pub enum ProcessError {
    // ── Run errors ────────────────────────────────────────────────────────
    /// The HTML contains no `<img src>` that resolves to an absolute URL.
    #[error("No valid image references found in the HTML")]
    NoImagesFound,

    /// PDF generation was requested but no image could be drawn.
    #[error("Nothing to assemble: none of the {attempted} images could be drawn into the PDF")]
    NothingToAssemble { attempted: usize },

    /// The PDF writer could not open or write its output target.
    #[error("PDF backend failed for '{path}': {detail}")]
    PdfBackend { path: PathBuf, detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input HTML file was not found at the given path.
    #[error("HTML file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path, '-', or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The base URL could not be parsed or cannot serve as a base.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// HTTP URL was syntactically valid but the page download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Stored alongside the failed URL in the download table. The run continues
/// unless every image fails and a PDF was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// Connection, TLS, or body read failure.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Server answered with a non-success status.
    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    /// The transport gave up after its configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The URL scheme has no fetch implementation.
    #[error("unsupported URL scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// A `data:` URI could not be decoded.
    #[error("invalid data URI: {reason}")]
    InvalidDataUri { reason: String },

    /// Fetched bytes could not be written under the output directory.
    #[error("could not save to '{path}': {reason}")]
    SaveFailed { path: PathBuf, reason: String },

    /// The fetch task ended without delivering a response.
    #[error("fetch ended without a response")]
    Lost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_assemble_display() {
        let e = ProcessError::NothingToAssemble { attempted: 4 };
        let msg = e.to_string();
        assert!(msg.contains("4 images"), "got: {msg}");
    }

    #[test]
    fn extraction_and_assembly_failures_are_distinct() {
        let none = ProcessError::NoImagesFound.to_string();
        let nothing = ProcessError::NothingToAssemble { attempted: 1 }.to_string();
        assert_ne!(none, nothing);
    }

    #[test]
    fn pdf_backend_display() {
        let e = ProcessError::PdfBackend {
            path: PathBuf::from("/ro/output.pdf"),
            detail: "read-only file system".into(),
        };
        assert!(e.to_string().contains("/ro/output.pdf"));
        assert!(e.to_string().contains("read-only"));
    }

    #[test]
    fn image_error_display() {
        assert_eq!(ImageError::HttpStatus { status: 404 }.to_string(), "HTTP 404");
        let e = ImageError::UnsupportedScheme {
            scheme: "ftp".into(),
        };
        assert!(e.to_string().contains("ftp"));
    }
}
