use serde::Deserialize;
use std::time::Duration;

use super::{get_json, FetchError, FetchedItem};
use crate::storage::MediaKind;

pub const DEFAULT_BASE_URL: &str = "https://meme-api.com";
pub const SOURCE: &str = "meme-api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GimmeResponse {
    title: String,
    url: String,
    post_link: String,
    #[serde(default)]
    nsfw: bool,
}

/// Fetch one random meme from a meme-api compatible host.
///
/// NSFW posts yield `None`; the caller can simply try again later.
pub async fn fetch_random_meme(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Option<FetchedItem>, FetchError> {
    let url = format!("{}/gimme", base_url.trim_end_matches('/'));
    let meme: GimmeResponse = get_json(client, &url, REQUEST_TIMEOUT).await?;

    if meme.nsfw {
        tracing::debug!(post = %meme.post_link, "Skipping NSFW meme");
        return Ok(None);
    }

    Ok(Some(FetchedItem {
        source: SOURCE.to_string(),
        source_id: meme.post_link.clone(),
        title: meme.title,
        url: Some(meme.url).filter(|u| !u.trim().is_empty()),
        source_url: Some(meme.post_link),
        media_kind: MediaKind::Image,
    }))
}
