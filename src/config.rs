//! Configuration types for HTML-image-to-PDF processing.
//!
//! All processor behaviour is controlled through [`ProcessorConfig`], built
//! via its [`ProcessorConfigBuilder`]. Per-run choices (save images? build a
//! PDF?) live in [`RunOptions`] instead, so one processor can serve many runs
//! with different flags while page geometry and output locations stay fixed.

use crate::error::ProcessError;
use crate::pipeline::fetch::ImageFetcher;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

const MM_PER_INCH: f32 = 25.4;
const POINTS_PER_INCH: f32 = 72.0;

/// Configuration for an [`crate::processor::HtmlProcessor`].
///
/// Built via [`ProcessorConfig::builder()`] or using
/// [`ProcessorConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_html2pdf::{Orientation, PageSize, ProcessorConfig};
///
/// let config = ProcessorConfig::builder()
///     .output_dir("downloads")
///     .pdf_path("album.pdf")
///     .page_size(PageSize::Letter)
///     .orientation(Orientation::Portrait)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Directory receiving `image_{index}.{ext}` files. Default: `images`.
    ///
    /// Created on demand at the start of every run that saves images or
    /// builds a PDF.
    pub output_dir: PathBuf,

    /// Where the PDF is written. Default: `output.pdf`. Overwritten by every
    /// run that builds a PDF.
    pub pdf_path: PathBuf,

    /// Page size, orientation and device resolution. Default: A4 landscape
    /// at 150 DPI.
    pub page: PageGeometry,

    /// Per-request timeout applied by the default HTTP fetcher. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Maximum number of fetches in flight at once. Default: unlimited.
    pub max_concurrent_fetches: Option<usize>,

    /// User-Agent header sent by the default HTTP fetcher.
    pub user_agent: String,

    /// Pre-constructed fetcher. Takes precedence over the default
    /// [`crate::pipeline::fetch::HttpFetcher`].
    pub fetcher: Option<Arc<dyn ImageFetcher>>,

    /// Event observer. Default: none.
    pub observer: Option<ProgressCallback>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("images"),
            pdf_path: PathBuf::from("output.pdf"),
            page: PageGeometry::default(),
            fetch_timeout_secs: 30,
            max_concurrent_fetches: None,
            user_agent: format!("edgequake-html2pdf/{}", env!("CARGO_PKG_VERSION")),
            fetcher: None,
            observer: None,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("output_dir", &self.output_dir)
            .field("pdf_path", &self.pdf_path)
            .field("page", &self.page)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("user_agent", &self.user_agent)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn ImageFetcher>"))
            .field("observer", &self.observer.as_ref().map(|_| "<dyn ProcessObserver>"))
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn pdf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdf_path = path.into();
        self
    }

    pub fn page(mut self, page: PageGeometry) -> Self {
        self.config.page = page;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page.size = size;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.config.page.orientation = orientation;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.page.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn max_concurrent_fetches(mut self, n: usize) -> Self {
        self.config.max_concurrent_fetches = Some(n.max(1));
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn observer(mut self, observer: ProgressCallback) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, ProcessError> {
        let c = &self.config;
        if c.page.dpi < 72 || c.page.dpi > 600 {
            return Err(ProcessError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.page.dpi
            )));
        }
        if let PageSize::Custom { width_mm, height_mm } = c.page.size {
            if !(width_mm > 0.0 && height_mm > 0.0) {
                return Err(ProcessError::InvalidConfig(format!(
                    "Custom page size must be positive, got {width_mm}×{height_mm} mm"
                )));
            }
        }
        if c.pdf_path.as_os_str().is_empty() {
            return Err(ProcessError::InvalidConfig("PDF path must not be empty".into()));
        }
        if c.fetch_timeout_secs == 0 {
            return Err(ProcessError::InvalidConfig(
                "Fetch timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Per-run flags passed to [`crate::processor::HtmlProcessor::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Keep the downloaded images in the output directory.
    pub persist_images: bool,
    /// Compose the downloaded images into a PDF.
    pub generate_pdf: bool,
}

impl RunOptions {
    pub fn new(persist_images: bool, generate_pdf: bool) -> Self {
        Self {
            persist_images,
            generate_pdf,
        }
    }

    /// Whether fetched bytes have to be written to disk. The assembler reads
    /// images back from their saved files, so a PDF implies writing them.
    pub fn writes_images(&self) -> bool {
        self.persist_images || self.generate_pdf
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(true, true)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Standard paper sizes, given in portrait orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSize {
    A3,
    /// 210 × 297 mm (default)
    #[default]
    A4,
    Letter,
    Legal,
    Custom { width_mm: f32, height_mm: f32 },
}

impl PageSize {
    /// Portrait `(width, height)` in millimetres.
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match *self {
            PageSize::A3 => (297.0, 420.0),
            PageSize::A4 => (210.0, 297.0),
            PageSize::Letter => (215.9, 279.4),
            PageSize::Legal => (215.9, 355.6),
            PageSize::Custom { width_mm, height_mm } => (width_mm, height_mm),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

/// Page size, orientation and resolution of the generated PDF.
///
/// Layout is computed in whole device pixels at `dpi`, then converted to PDF
/// points when drawing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub size: PageSize,
    pub orientation: Orientation,
    pub dpi: u32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            size: PageSize::A4,
            orientation: Orientation::Landscape,
            dpi: 150,
        }
    }
}

impl PageGeometry {
    /// Oriented `(width, height)` in millimetres.
    pub fn size_mm(&self) -> (f32, f32) {
        let (w, h) = self.size.dimensions_mm();
        let (short, long) = if w <= h { (w, h) } else { (h, w) };
        match self.orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }

    /// Oriented `(width, height)` in device pixels at `dpi`.
    pub fn size_pixels(&self) -> (u32, u32) {
        let (w, h) = self.size_mm();
        let dpi = self.dpi as f32;
        (
            (w / MM_PER_INCH * dpi).round().max(1.0) as u32,
            (h / MM_PER_INCH * dpi).round().max(1.0) as u32,
        )
    }

    /// Convert a device-pixel length to PDF points.
    pub fn pixels_to_points(&self, px: u32) -> f32 {
        px as f32 * POINTS_PER_INCH / self.dpi as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_a4_landscape_150dpi() {
        let g = PageGeometry::default();
        assert_eq!(g.size_pixels(), (1754, 1240));
        let (w, h) = g.size_mm();
        assert_eq!((w, h), (297.0, 210.0));
    }

    #[test]
    fn portrait_swaps_dimensions() {
        let g = PageGeometry {
            orientation: Orientation::Portrait,
            ..PageGeometry::default()
        };
        assert_eq!(g.size_pixels(), (1240, 1754));
    }

    #[test]
    fn pixels_to_points_at_150_dpi() {
        let g = PageGeometry::default();
        assert!((g.pixels_to_points(150) - 72.0).abs() < f32::EPSILON);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ProcessorConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.page.dpi, 72);
        let c = ProcessorConfig::builder().dpi(5000).build().unwrap();
        assert_eq!(c.page.dpi, 600);
    }

    #[test]
    fn builder_rejects_bad_custom_size() {
        let err = ProcessorConfig::builder()
            .page_size(PageSize::Custom {
                width_mm: 0.0,
                height_mm: 100.0,
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(ProcessorConfig::builder()
            .fetch_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn run_options_write_images_when_pdf_requested() {
        assert!(RunOptions::new(false, true).writes_images());
        assert!(RunOptions::new(true, false).writes_images());
        assert!(!RunOptions::new(false, false).writes_images());
    }
}
