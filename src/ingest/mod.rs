//! Content ingestion: upstream fetchers and the insert-with-dedup contract.
//!
//! Fetchers only produce [`FetchedItem`]s. [`store_items`] is the single
//! place items enter the database, so title truncation, category assignment
//! and duplicate skipping behave the same for every source.

pub mod meme;
pub mod reddit;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;

use crate::storage::{Database, MediaKind, NewContent};
use crate::util::{normalize_category, truncate_chars};

pub const DEFAULT_TITLE_MAX_CHARS: usize = 480;

/// Upstream responses larger than this are rejected
pub(crate) const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

pub(crate) const USER_AGENT: &str = concat!(
    "memecast/",
    env!("CARGO_PKG_VERSION"),
    " (content fan-out bot)"
);

/// Errors from talking to an upstream content source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Body was not the JSON shape we expect
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Response too large")]
    ResponseTooLarge,
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }
}

/// One item as produced by a fetcher, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub media_kind: MediaKind,
}

/// Counts from one [`store_items`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Insert fetched items, skipping any whose (source, source_id) already exists.
///
/// Titles are cut to `title_max_chars` characters and every item is tagged
/// with `category`. Any storage error other than a duplicate aborts the run.
pub async fn store_items(
    db: &Database,
    items: &[FetchedItem],
    category: Option<&str>,
    title_max_chars: usize,
) -> Result<IngestReport> {
    let category = category.and_then(normalize_category);
    let mut report = IngestReport {
        fetched: items.len(),
        ..Default::default()
    };

    for item in items {
        let new = NewContent {
            source: item.source.clone(),
            source_id: item.source_id.clone(),
            title: truncate_chars(item.title.trim(), title_max_chars).into_owned(),
            url: item.url.clone(),
            source_url: item.source_url.clone(),
            media_kind: item.media_kind,
            category: category.clone(),
            priority: 0,
        };

        match db.insert_content(&new).await {
            Ok(id) => {
                tracing::debug!(id = id, source = %item.source, source_id = %item.source_id, "Stored content item");
                report.inserted += 1;
            }
            Err(e) if e.is_duplicate() => {
                tracing::trace!(source = %item.source, source_id = %item.source_id, "Duplicate, skipping");
                report.duplicates += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "Failed to store item {}/{}",
                        item.source, item.source_id
                    )
                });
            }
        }
    }

    tracing::info!(
        fetched = report.fetched,
        inserted = report.inserted,
        duplicates = report.duplicates,
        "Ingestion complete"
    );
    Ok(report)
}

/// GET `url` and decode the JSON body, with a timeout and a size cap.
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: std::time::Duration,
) -> Result<T, FetchError> {
    // One budget covers connect, headers and body
    let body = tokio::time::timeout(timeout, fetch_limited(client, url, timeout))
        .await
        .map_err(|_| FetchError::Timeout)??;

    serde_json::from_slice(&body).map_err(|e| FetchError::Parse(e.to_string()))
}

async fn fetch_limited(
    client: &reqwest::Client,
    url: &str,
    timeout: std::time::Duration,
) -> Result<Vec<u8>, FetchError> {
    use futures::StreamExt;

    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .map_err(FetchError::from_reqwest)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_SIZE as u64)
    {
        return Err(FetchError::ResponseTooLarge);
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        if body.len().saturating_add(chunk.len()) > MAX_RESPONSE_SIZE {
            return Err(FetchError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
