//! PDF assembly: one saved image per page, scaled to fit and centered.
//!
//! ## Why spawn_blocking?
//!
//! Decoding, resampling and deflating image data are CPU-bound. Running the
//! whole assembly on the blocking pool keeps tokio worker threads free and
//! gives the assembler exclusive, single-threaded use of the finished table.
//!
//! ## Geometry
//!
//! Layout is computed in whole device pixels at the configured DPI (so
//! centering offsets are integers, like a raster printer would place them)
//! and only converted to PDF points when the page is written. Images larger
//! than their target box are downsampled before embedding; smaller ones are
//! embedded as-is and stretched by the page transform.

use crate::config::PageGeometry;
use crate::error::ProcessError;
use crate::output::DownloadTable;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where an image lands on its page, in device pixels from the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Scale `(width, height)` to fit inside `page`, preserving aspect ratio,
/// and center it.
pub fn fit_centered(image: (u32, u32), page: (u32, u32)) -> Placement {
    let (iw, ih) = (image.0.max(1) as f64, image.1.max(1) as f64);
    let (pw, ph) = page;
    let scale = (pw as f64 / iw).min(ph as f64 / ih);

    let width = ((iw * scale).round() as u32).clamp(1, pw.max(1));
    let height = ((ih * scale).round() as u32).clamp(1, ph.max(1));

    Placement {
        x: pw.saturating_sub(width) / 2,
        y: ph.saturating_sub(height) / 2,
        width,
        height,
    }
}

/// A PDF written by [`assemble`].
#[derive(Debug, Clone)]
pub struct AssembledPdf {
    pub path: PathBuf,
    pub pages: usize,
    /// Discovery indices of saved images the decoder rejected.
    pub skipped: Vec<usize>,
}

/// Build the PDF from every saved slot of `table`, in discovery order.
///
/// # Errors
/// * [`ProcessError::NothingToAssemble`] — no saved image, or none decodable
/// * [`ProcessError::PdfBackend`] — the output file cannot be created or written
pub async fn assemble(
    table: &DownloadTable,
    geometry: PageGeometry,
    pdf_path: &Path,
) -> Result<AssembledPdf, ProcessError> {
    let saved: Vec<(usize, PathBuf)> = table
        .saved()
        .map(|(i, p)| (i, p.to_path_buf()))
        .collect();

    if saved.is_empty() {
        return Err(ProcessError::NothingToAssemble {
            attempted: table.len(),
        });
    }

    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || assemble_blocking(&saved, &geometry, &path))
        .await
        .map_err(|e| ProcessError::Internal(format!("Assembly task panicked: {}", e)))?
}

/// Blocking implementation of PDF assembly.
fn assemble_blocking(
    saved: &[(usize, PathBuf)],
    geometry: &PageGeometry,
    pdf_path: &Path,
) -> Result<AssembledPdf, ProcessError> {
    let backend_err = |detail: String| ProcessError::PdfBackend {
        path: pdf_path.to_path_buf(),
        detail,
    };

    // Open the output target before drawing anything.
    let parent = match pdf_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| backend_err(e.to_string()))?;
    let mut target =
        tempfile::NamedTempFile::new_in(&parent).map_err(|e| backend_err(e.to_string()))?;

    let page_px = geometry.size_pixels();
    let mut builder = PdfBuilder::new(geometry);
    let mut skipped = Vec::new();

    for (index, path) in saved {
        let img = match decode(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping image {} ({}): {}", index, path.display(), e);
                skipped.push(*index);
                continue;
            }
        };

        let placement = fit_centered(img.dimensions(), page_px);
        let img = if placement.width < img.width() {
            img.resize_exact(placement.width, placement.height, FilterType::Triangle)
        } else {
            img
        };

        builder
            .add_image_page(&img, placement)
            .map_err(|e| backend_err(e.to_string()))?;
        debug!(
            "Page {}: image {} at ({}, {}) {}x{} px",
            builder.page_count(),
            index,
            placement.x,
            placement.y,
            placement.width,
            placement.height
        );
    }

    let pages = builder.page_count();
    if pages == 0 {
        return Err(ProcessError::NothingToAssemble {
            attempted: saved.len(),
        });
    }

    builder
        .finish(target.as_file_mut())
        .map_err(|e| backend_err(e.to_string()))?;
    target
        .persist(pdf_path)
        .map_err(|e| backend_err(e.error.to_string()))?;

    info!(
        "PDF written: {} ({} pages, {} skipped)",
        pdf_path.display(),
        pages,
        skipped.len()
    );

    Ok(AssembledPdf {
        path: pdf_path.to_path_buf(),
        pages,
        skipped,
    })
}

/// Decode an image, sniffing the format from its content.
fn decode(path: &Path) -> Result<DynamicImage, String> {
    let img = image::ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;
    if img.width() == 0 || img.height() == 0 {
        return Err("image has no pixels".into());
    }
    Ok(img)
}

/// Incrementally builds a document whose pages each hold one image XObject.
struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    geometry: PageGeometry,
    page_px: (u32, u32),
}

impl PdfBuilder {
    fn new(geometry: &PageGeometry) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            geometry: *geometry,
            page_px: geometry.size_pixels(),
        }
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn pt(&self, px: u32) -> f32 {
        self.geometry.pixels_to_points(px)
    }

    /// Append a new page and draw `img` at `placement`.
    fn add_image_page(&mut self, img: &DynamicImage, placement: Placement) -> lopdf::Result<()> {
        let image_id = self.embed_image(img);

        // PDF space grows upwards from the bottom-left corner.
        let x = self.pt(placement.x);
        let y = self.pt(self.page_px.1 - placement.y - placement.height);
        let w = self.pt(placement.width);
        let h = self.pt(placement.height);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(w),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(h),
                        Object::Real(x),
                        Object::Real(y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.encode()?));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(self.pt(self.page_px.0)),
                Object::Real(self.pt(self.page_px.1)),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    /// Add `img` as an RGB image XObject, with an alpha soft mask when needed.
    fn embed_image(&mut self, img: &DynamicImage) -> ObjectId {
        let (width, height) = img.dimensions();
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        };

        if img.color().has_alpha() {
            let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
            let smask = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8_i64,
            };
            let smask_id = self.doc.add_object(Stream::new(smask, alpha));
            dict.set("SMask", smask_id);
        }

        self.doc
            .add_object(Stream::new(dict, img.to_rgb8().into_raw()))
    }

    /// Write the page tree and catalog, then serialise to `out`.
    fn finish<W: Write>(mut self, out: &mut W) -> lopdf::Result<usize> {
        let count = self.kids.len();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();
        self.doc.save_to(out)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;
    use crate::output::DownloadOutcome;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 30, 30])))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }

    fn saved(path: PathBuf) -> DownloadOutcome {
        DownloadOutcome::Saved {
            path,
            content_type: "image/png".into(),
        }
    }

    fn failed(url: &str) -> DownloadOutcome {
        DownloadOutcome::Failed {
            url: url.into(),
            error: ImageError::HttpStatus { status: 404 },
        }
    }

    fn table_of(outcomes: Vec<DownloadOutcome>) -> DownloadTable {
        let mut table = DownloadTable::new(outcomes.len());
        for (i, o) in outcomes.into_iter().enumerate() {
            table.record(i, o).unwrap();
        }
        table
    }

    fn cm_operands(doc: &Document, page_id: ObjectId) -> Vec<f32> {
        let bytes = doc.get_page_content(page_id).unwrap();
        let content = Content::decode(&bytes).unwrap();
        content
            .operations
            .iter()
            .find(|op| op.operator == "cm")
            .unwrap()
            .operands
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect()
    }

    #[test]
    fn wide_image_fills_width_and_centers_vertically() {
        let p = fit_centered((200, 100), (1754, 1240));
        assert_eq!(p, Placement { x: 0, y: 181, width: 1754, height: 877 });
    }

    #[test]
    fn tall_image_fills_height_and_centers_horizontally() {
        let p = fit_centered((100, 400), (1754, 1240));
        assert_eq!(p.height, 1240);
        assert_eq!(p.width, 310);
        assert_eq!(p.x, (1754 - 310) / 2);
        assert_eq!(p.y, 0);
    }

    #[test]
    fn matching_aspect_fills_page() {
        let p = fit_centered((877, 620), (1754, 1240));
        assert_eq!(p, Placement { x: 0, y: 0, width: 1754, height: 1240 });
    }

    #[test]
    fn aspect_ratio_is_preserved() {
        let p = fit_centered((640, 480), (1754, 1240));
        let ratio = p.width as f64 / p.height as f64;
        assert!((ratio - 640.0 / 480.0).abs() < 0.01, "ratio {ratio}");
    }

    #[tokio::test]
    async fn one_page_per_saved_image_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "image_0.png", 40, 20);
        let b = write_png(dir.path(), "image_2.png", 20, 40);
        let table = table_of(vec![saved(a), failed("https://x.test/b.png"), saved(b)]);
        let out = dir.path().join("out.pdf");

        let pdf = assemble(&table, PageGeometry::default(), &out).await.unwrap();

        assert_eq!(pdf.pages, 2);
        assert!(pdf.skipped.is_empty());
        let doc = Document::load(&out).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        // First image is landscape: full width. Second is portrait: full height.
        let first = cm_operands(&doc, pages[&1]);
        let second = cm_operands(&doc, pages[&2]);
        assert!((first[0] - 841.92).abs() < 0.01, "got {first:?}");
        assert!((second[3] - 595.2).abs() < 0.01, "got {second:?}");
        // Centered: equal margins on both sides.
        assert!((second[4] * 2.0 + second[0] - 841.92).abs() < 0.5, "got {second:?}");
    }

    #[tokio::test]
    async fn undecodable_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("image_0.jpg");
        std::fs::write(&junk, b"<html>not an image</html>").unwrap();
        let good = write_png(dir.path(), "image_1.png", 10, 10);
        let table = table_of(vec![saved(junk), saved(good)]);
        let out = dir.path().join("out.pdf");

        let pdf = assemble(&table, PageGeometry::default(), &out).await.unwrap();

        assert_eq!(pdf.pages, 1);
        assert_eq!(pdf.skipped, vec![0]);
        assert_eq!(Document::load(&out).unwrap().get_pages().len(), 1);
    }

    #[tokio::test]
    async fn content_is_sniffed_not_taken_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_png(dir.path(), "tmp.png", 12, 8);
        let misnamed = dir.path().join("image_0.jpg");
        std::fs::rename(&png, &misnamed).unwrap();
        let table = table_of(vec![saved(misnamed)]);

        let pdf = assemble(&table, PageGeometry::default(), &dir.path().join("o.pdf"))
            .await
            .unwrap();
        assert_eq!(pdf.pages, 1);
    }

    #[tokio::test]
    async fn all_failed_is_nothing_to_assemble() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_of(vec![failed("https://x.test/a.png"), failed("https://x.test/b.png")]);
        let out = dir.path().join("out.pdf");

        let err = assemble(&table, PageGeometry::default(), &out).await.unwrap_err();

        assert!(matches!(err, ProcessError::NothingToAssemble { attempted: 2 }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn all_undecodable_is_nothing_to_assemble() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("image_0.png");
        std::fs::write(&junk, b"garbage").unwrap();
        let out = dir.path().join("out.pdf");

        let err = assemble(&table_of(vec![saved(junk)]), PageGeometry::default(), &out)
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::NothingToAssemble { attempted: 1 }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn existing_output_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.pdf");
        std::fs::write(&out, b"stale").unwrap();
        let table = table_of(vec![saved(write_png(dir.path(), "image_0.png", 5, 5))]);

        assemble(&table, PageGeometry::default(), &out).await.unwrap();

        assert!(std::fs::read(&out).unwrap().starts_with(b"%PDF-1.5"));
    }

    #[tokio::test]
    async fn unwritable_target_is_a_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let table = table_of(vec![saved(write_png(dir.path(), "image_0.png", 5, 5))]);

        let err = assemble(&table, PageGeometry::default(), &blocker.join("out.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::PdfBackend { .. }));
    }

    #[tokio::test]
    async fn alpha_channel_becomes_soft_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image_0.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 128])))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        let out = dir.path().join("out.pdf");

        assemble(&table_of(vec![saved(path)]), PageGeometry::default(), &out)
            .await
            .unwrap();

        let doc = Document::load(&out).unwrap();
        let has_smask = doc.objects.values().any(|obj| {
            obj.as_stream()
                .map(|s| s.dict.has(b"SMask"))
                .unwrap_or(false)
        });
        assert!(has_smask);
    }

    #[tokio::test]
    async fn large_images_are_downsampled_to_their_box() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "image_0.png", 3000, 1500);
        let out = dir.path().join("out.pdf");

        assemble(&table_of(vec![saved(path)]), PageGeometry::default(), &out)
            .await
            .unwrap();

        let doc = Document::load(&out).unwrap();
        let widths: Vec<i64> = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter_map(|s| s.dict.get(b"Width").ok())
            .filter_map(|w| w.as_i64().ok())
            .collect();
        assert_eq!(widths, vec![1754]);
    }
}
