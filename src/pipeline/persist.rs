//! Saving fetched images under the output directory.
//!
//! File names are derived from the discovery index alone
//! (`image_{index}.{ext}`), so concurrent writers never collide and the
//! directory listing sorts back into page order.

use crate::error::ImageError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension for a declared content type.
///
/// Only the four explicitly recognised image types map to their own
/// extension; everything else (including an absent header) is saved as JPEG.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let mime = content_type.trim().to_ascii_lowercase();
    if mime.starts_with("image/png") {
        "png"
    } else if mime.starts_with("image/gif") {
        "gif"
    } else if mime.starts_with("image/bmp") {
        "bmp"
    } else if mime.starts_with("image/webp") {
        "webp"
    } else {
        "jpg"
    }
}

/// Target path for the image at `index`.
pub fn image_path(output_dir: &Path, index: usize, content_type: &str) -> PathBuf {
    output_dir.join(format!(
        "image_{}.{}",
        index,
        extension_for_content_type(content_type)
    ))
}

/// Write `bytes` for the image at `index`, returning the written path.
pub async fn save_image(
    output_dir: &Path,
    index: usize,
    content_type: &str,
    bytes: &[u8],
) -> Result<PathBuf, ImageError> {
    let path = image_path(output_dir, index, content_type);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| ImageError::SaveFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    debug!("Saved image {} → {}", index, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_mapping_is_exact() {
        assert_eq!(extension_for_content_type("image/png"), "png");
        assert_eq!(extension_for_content_type("image/gif"), "gif");
        assert_eq!(extension_for_content_type("image/bmp"), "bmp");
        assert_eq!(extension_for_content_type("image/webp"), "webp");
        assert_eq!(extension_for_content_type("image/jpeg"), "jpg");
        assert_eq!(extension_for_content_type("image/svg+xml"), "jpg");
        assert_eq!(extension_for_content_type("application/octet-stream"), "jpg");
        assert_eq!(extension_for_content_type(""), "jpg");
    }

    #[test]
    fn content_type_parameters_and_case_are_ignored() {
        assert_eq!(extension_for_content_type("IMAGE/PNG; charset=binary"), "png");
    }

    #[test]
    fn image_path_uses_discovery_index() {
        let p = image_path(Path::new("out"), 12, "image/webp");
        assert_eq!(p, Path::new("out").join("image_12.webp"));
    }

    #[tokio::test]
    async fn save_image_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_image(dir.path(), 0, "image/gif", b"GIF89a").await.unwrap();
        assert_eq!(path, dir.path().join("image_0.gif"));
        assert_eq!(std::fs::read(&path).unwrap(), b"GIF89a");
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does/not/exist");
        let err = save_image(&missing, 1, "image/png", b"x").await.unwrap_err();
        assert!(matches!(err, ImageError::SaveFailed { .. }));
    }
}
