//! The fetch capability: `fetch(url) → (bytes, content type) | error`.
//!
//! The coordinator does not care how bytes are obtained. It attaches a
//! [`CorrelationToken`] to every [`FetchRequest`] and expects the very same
//! token back in the [`FetchResponse`], because responses arrive in
//! completion order and the token is the only link back to the discovery
//! index.
//!
//! [`HttpFetcher`] is the default implementation: HTTP(S) through `reqwest`,
//! base64 `data:` URIs decoded in-process, and `file:` URLs read from disk.

use crate::error::ImageError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Opaque value echoed back with a fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationToken(usize);

impl CorrelationToken {
    pub(crate) fn for_index(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub token: CorrelationToken,
}

/// Payload of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// Declared content type, e.g. `image/png`. Empty when the source did
    /// not declare one.
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub token: CorrelationToken,
    pub result: Result<FetchedImage, ImageError>,
}

impl FetchResponse {
    /// Pair a result with the token of the request it answers.
    pub fn reply(request: &FetchRequest, result: Result<FetchedImage, ImageError>) -> Self {
        Self {
            token: request.token,
            result,
        }
    }
}

/// Retrieves the bytes behind one image URL.
///
/// Implementations must be `Send + Sync`: one fetcher instance serves every
/// concurrent request of a run. Failures are reported inside the response,
/// never by panicking, and the request's token must be returned unchanged.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> FetchResponse;
}

/// Default fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    async fn fetch_http(&self, url: &Url) -> Result<FetchedImage, ImageError> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                ImageError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                ImageError::Transport {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ImageError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                ImageError::Transport {
                    reason: e.to_string(),
                }
            }
        })?;

        debug!("GET {} → {} bytes ({})", url, bytes.len(), content_type);
        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn fetch_file(url: &Url) -> Result<FetchedImage, ImageError> {
        let path = url.to_file_path().map_err(|_| ImageError::Transport {
            reason: format!("'{url}' is not a local file path"),
        })?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ImageError::Transport {
                reason: format!("{}: {e}", path.display()),
            })?;
        let content_type = image::ImageFormat::from_path(&path)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_default();
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> FetchResponse {
        let result = match request.url.scheme() {
            "http" | "https" => self.fetch_http(&request.url).await,
            "data" => decode_data_uri(&request.url),
            "file" => Self::fetch_file(&request.url).await,
            other => Err(ImageError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        };
        FetchResponse::reply(&request, result)
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI.
///
/// Only base64 payloads are accepted; inline images are virtually always
/// encoded that way.
pub fn decode_data_uri(url: &Url) -> Result<FetchedImage, ImageError> {
    let body = url.path();
    let (meta, payload) = body.split_once(',').ok_or_else(|| ImageError::InvalidDataUri {
        reason: "missing ',' separator".into(),
    })?;

    let mut params = meta.split(';');
    let content_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ImageError::InvalidDataUri {
            reason: "only base64-encoded payloads are supported".into(),
        });
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageError::InvalidDataUri {
            reason: e.to_string(),
        })?;

    Ok(FetchedImage {
        bytes,
        content_type,
    })
}
