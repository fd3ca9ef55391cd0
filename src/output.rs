//! Data model shared by the pipeline stages.
//!
//! [`ImageReference`] comes out of the extractor, [`DownloadTable`] is owned
//! by the fetch coordinator while downloads are in flight and handed
//! read-only to the assembler afterwards, and [`ProcessReport`] is what a
//! successful run returns.

use crate::error::ImageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// An absolute image URL and the position where it was first seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// 0-based discovery index; equals the position in the extracted list.
    pub index: usize,
    pub url: Url,
}

/// How a single discovered image ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// Fetched and written to `path`.
    Saved { path: PathBuf, content_type: String },
    /// Fetched, but the run asked for neither saved images nor a PDF.
    Fetched { content_type: String, bytes: usize },
    /// Could not be fetched or could not be written.
    Failed { url: String, error: ImageError },
}

impl DownloadOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DownloadOutcome::Failed { .. })
    }

    /// Path of the written file, if any.
    pub fn saved_path(&self) -> Option<&Path> {
        match self {
            DownloadOutcome::Saved { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Progress snapshot emitted after every settled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }
}

/// Why a completion could not be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("slot {index} is out of range (table has {total} slots)")]
    OutOfRange { index: usize, total: usize },
    #[error("slot {index} was already settled")]
    AlreadySettled { index: usize },
}

/// Order-preserving result table: one write-once slot per discovery index.
///
/// The table also carries the outstanding-download count and the list of
/// failed URLs so that a single owner can update all three together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTable {
    slots: Vec<Option<DownloadOutcome>>,
    outstanding: usize,
    failed_urls: Vec<String>,
}

impl DownloadTable {
    /// An empty table with `total` open slots.
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
            outstanding: total,
            failed_urls: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn completed(&self) -> usize {
        self.slots.len() - self.outstanding
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding == 0
    }

    /// Settle slot `index`.
    ///
    /// Rejects out-of-range indices and slots that already hold an outcome,
    /// leaving the table untouched in both cases.
    pub fn record(&mut self, index: usize, outcome: DownloadOutcome) -> Result<Progress, SlotError> {
        let total = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { index, total })?;
        if slot.is_some() {
            return Err(SlotError::AlreadySettled { index });
        }

        if let DownloadOutcome::Failed { url, .. } = &outcome {
            self.failed_urls.push(url.clone());
        }
        *slot = Some(outcome);
        self.outstanding -= 1;

        Ok(Progress {
            completed: total - self.outstanding,
            total,
        })
    }

    pub fn get(&self, index: usize) -> Option<&DownloadOutcome> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    /// Indices that have not been settled yet.
    pub fn open_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Settled slots in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DownloadOutcome)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|o| (i, o)))
    }

    /// Saved files in discovery order.
    pub fn saved(&self) -> impl Iterator<Item = (usize, &Path)> {
        self.iter()
            .filter_map(|(i, o)| o.saved_path().map(|p| (i, p)))
    }

    pub fn saved_count(&self) -> usize {
        self.saved().count()
    }

    pub fn failed_count(&self) -> usize {
        self.iter().filter(|(_, o)| o.is_failed()).count()
    }

    /// Failed URLs in the order their failures were recorded.
    pub fn failed_urls(&self) -> &[String] {
        &self.failed_urls
    }
}

/// Timing and count statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Distinct image references discovered in the HTML.
    pub total_images: usize,
    /// Images written to the output directory.
    pub saved_images: usize,
    /// Images that could not be fetched or written.
    pub failed_images: usize,
    /// Pages in the produced PDF (0 when no PDF was requested).
    pub pages_written: usize,
    /// Saved images the decoder rejected during assembly.
    pub skipped_images: usize,
    pub fetch_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a run that reached its completion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    /// Where the PDF was written; `None` when no PDF was requested.
    pub pdf_path: Option<PathBuf>,
    pub failed_urls: Vec<String>,
    pub references: Vec<ImageReference>,
    pub table: DownloadTable,
    pub stats: ProcessStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(i: usize) -> DownloadOutcome {
        DownloadOutcome::Saved {
            path: PathBuf::from(format!("images/image_{i}.png")),
            content_type: "image/png".into(),
        }
    }

    fn failed(url: &str) -> DownloadOutcome {
        DownloadOutcome::Failed {
            url: url.into(),
            error: ImageError::HttpStatus { status: 404 },
        }
    }

    #[test]
    fn out_of_order_records_keep_discovery_order() {
        let mut table = DownloadTable::new(3);
        assert_eq!(table.record(2, saved(2)).unwrap().completed, 1);
        assert_eq!(table.record(0, failed("https://x.test/a.png")).unwrap().completed, 2);
        let last = table.record(1, saved(1)).unwrap();
        assert!(last.is_done());
        assert!(table.is_complete());

        let order: Vec<usize> = table.saved().map(|(i, _)| i).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(table.failed_urls(), ["https://x.test/a.png"]);
        assert_eq!(table.failed_count(), 1);
    }

    #[test]
    fn slots_are_write_once() {
        let mut table = DownloadTable::new(2);
        table.record(0, saved(0)).unwrap();
        let err = table.record(0, failed("https://x.test/a.png")).unwrap_err();
        assert_eq!(err, SlotError::AlreadySettled { index: 0 });
        assert_eq!(table.outstanding(), 1);
        assert!(table.failed_urls().is_empty());
        assert_eq!(table.get(0), Some(&saved(0)));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut table = DownloadTable::new(1);
        let err = table.record(5, saved(5)).unwrap_err();
        assert_eq!(err, SlotError::OutOfRange { index: 5, total: 1 });
        assert_eq!(table.open_slots(), vec![0]);
    }

    #[test]
    fn outcome_serialises_with_status_tag() {
        let json = serde_json::to_string(&saved(0)).unwrap();
        assert!(json.contains("\"status\":\"saved\""), "got: {json}");
    }
}
