//! Input resolution: turn a user-supplied path, `-`, or URL into HTML text
//! plus the base URL its relative `<img src>` values resolve against.
//!
//! The base URL defaults to where the HTML came from: the page URL for
//! downloads (after redirects), a `file://` URL for local files. Local
//! pages therefore pick up images stored next to them without any flag.

use crate::error::ProcessError;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// HTML text ready for extraction.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub html: String,
    /// `None` only for stdin input without an explicit base.
    pub base_url: Option<Url>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Parse a user-supplied base URL.
pub fn parse_base_url(raw: &str) -> Result<Url, ProcessError> {
    let url = Url::parse(raw).map_err(|e| ProcessError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ProcessError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "URL cannot serve as a base for relative references".into(),
        });
    }
    Ok(url)
}

/// Resolve the input string to HTML text.
///
/// * `http(s)://…` — downloaded; base is the final response URL
/// * `-` — read from stdin; no implicit base
/// * anything else — a local file; base is its `file://` URL
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ProcessError> {
    if is_url(input) {
        download_page(input, timeout_secs).await
    } else if input == "-" {
        read_stdin().await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<ResolvedInput, ProcessError> {
    let path = PathBuf::from(path_str);
    if !path.is_file() {
        return Err(ProcessError::FileNotFound { path });
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ProcessError::FileNotFound { path: path.clone() })?;
    let html = String::from_utf8_lossy(&bytes).into_owned();

    let base_url = std::fs::canonicalize(&path)
        .ok()
        .and_then(|abs| Url::from_file_path(abs).ok());

    debug!("Resolved local HTML: {} ({} bytes)", path.display(), html.len());
    Ok(ResolvedInput { html, base_url })
}

async fn read_stdin() -> Result<ResolvedInput, ProcessError> {
    let html = tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map(|_| buf)
    })
    .await
    .map_err(|e| ProcessError::Internal(format!("stdin reader panicked: {e}")))?
    .map_err(|_| ProcessError::InvalidInput {
        input: "-".to_string(),
    })?;

    Ok(ResolvedInput {
        html,
        base_url: None,
    })
}

async fn download_page(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ProcessError> {
    info!("Downloading HTML from: {}", url);

    let failed = |reason: String| ProcessError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let final_url = response.url().clone();
    let html = response.text().await.map_err(|e| failed(e.to_string()))?;

    info!("Downloaded {} bytes of HTML", html.len());
    Ok(ResolvedInput {
        html,
        base_url: Some(final_url),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/page.html"));
        assert!(is_url("http://example.com/"));
        assert!(!is_url("/tmp/page.html"));
        assert!(!is_url("page.html"));
        assert!(!is_url("-"));
        assert!(!is_url(""));
    }

    #[test]
    fn base_url_must_be_absolute() {
        assert!(parse_base_url("https://x.test/dir/").is_ok());
        assert!(matches!(
            parse_base_url("relative/path"),
            Err(ProcessError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            parse_base_url("mailto:someone@x.test"),
            Err(ProcessError::InvalidBaseUrl { .. })
        ));
    }

    #[tokio::test]
    async fn local_file_gets_file_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.html");
        std::fs::write(&page, "<img src=\"pic.png\">").unwrap();

        let resolved = resolve_input(page.to_str().unwrap(), 5).await.unwrap();

        assert!(resolved.html.contains("pic.png"));
        let base = resolved.base_url.unwrap();
        assert_eq!(base.scheme(), "file");
        let pic = base.join("pic.png").unwrap().to_file_path().unwrap();
        assert_eq!(pic.file_name().unwrap(), "pic.png");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/a/page.html", 5).await.unwrap_err();
        assert!(matches!(err, ProcessError::FileNotFound { .. }));
    }
}
