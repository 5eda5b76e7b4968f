use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::storage::MediaKind;
use crate::transport::MediaPayload;

/// Bot API upload ceiling for bots on the public API server
pub const DEFAULT_MAX_MEDIA_BYTES: usize = 50 * 1024 * 1024;

const VIDEO_FILENAME: &str = "video.mp4";

/// Why media could not be materialized for upload.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),
    #[error("Media download timed out after {0:?}")]
    Timeout(Duration),
    #[error("Media download failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Media host returned status {0}")]
    HttpStatus(u16),
    #[error("Media exceeds {0} bytes")]
    TooLarge(usize),
    #[error("Incomplete media download: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: usize },
}

/// What a recipient send should carry.
#[derive(Debug)]
pub enum ResolvedMedia {
    /// The transport can fetch the URL itself
    ByReference(String),
    /// Bytes downloaded here, to be re-uploaded
    Payload(MediaPayload),
    /// Download failed; the recipient is skipped
    Unavailable(MediaError),
}

/// Turns a content item's URL into something the transport can send.
///
/// Images and text links go out by reference. Videos hosted on Reddit are
/// served as DASH fallbacks the Bot API will not fetch, so they are
/// downloaded and re-uploaded. Failures are reported as
/// [`ResolvedMedia::Unavailable`], never as an error, and are not retried.
#[derive(Clone)]
pub struct MediaResolver {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl MediaResolver {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            max_bytes: DEFAULT_MAX_MEDIA_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn resolve(&self, url: &str, kind: MediaKind) -> ResolvedMedia {
        match kind {
            MediaKind::Image | MediaKind::Text => ResolvedMedia::ByReference(url.to_string()),
            MediaKind::Video => match self.download(url).await {
                Ok(bytes) => ResolvedMedia::Payload(MediaPayload {
                    bytes,
                    filename: VIDEO_FILENAME.to_string(),
                    kind,
                }),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Video download failed");
                    ResolvedMedia::Unavailable(e)
                }
            },
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let parsed = url::Url::parse(url).map_err(|e| MediaError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MediaError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        // One budget covers connect, headers and body
        tokio::time::timeout(self.timeout, self.fetch(parsed))
            .await
            .map_err(|_| MediaError::Timeout(self.timeout))?
    }

    async fn fetch(&self, url: url::Url) -> Result<Vec<u8>, MediaError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MediaError::Timeout(self.timeout)
                } else {
                    MediaError::Network(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(MediaError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_bytes).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, MediaError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(MediaError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::with_capacity(expected_length.unwrap_or(0) as usize);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(MediaError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(MediaError::Incomplete {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
