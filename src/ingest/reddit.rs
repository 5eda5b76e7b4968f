use serde::Deserialize;
use std::time::Duration;

use super::{get_json, FetchError, FetchedItem};
use crate::storage::MediaKind;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
pub const DEFAULT_SUBREDDIT: &str = "soccercirclejerk";
pub const DEFAULT_LIMIT: u32 = 20;
pub const SOURCE: &str = "reddit";

const PERMALINK_BASE: &str = "https://www.reddit.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];

/// Fetch the "hot" listing of a subreddit.
///
/// Stickied posts are dropped. Reddit-hosted videos use their DASH fallback
/// URL so the media resolver can download them.
pub async fn fetch_hot(
    client: &reqwest::Client,
    base_url: &str,
    subreddit: &str,
    limit: u32,
) -> Result<Vec<FetchedItem>, FetchError> {
    let subreddit = subreddit.trim().trim_start_matches("r/");
    if subreddit.is_empty()
        || !subreddit
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(FetchError::Parse(format!("invalid subreddit name: {subreddit:?}")));
    }

    let url = format!(
        "{}/r/{}/hot.json?limit={}&raw_json=1",
        base_url.trim_end_matches('/'),
        subreddit,
        limit
    );
    tracing::debug!(subreddit = %subreddit, limit = limit, "Fetching hot listing");

    let listing: Listing = get_json(client, &url, REQUEST_TIMEOUT).await?;

    let total = listing.data.children.len();
    let items: Vec<FetchedItem> = listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.stickied)
        .map(Post::into_item)
        .collect();

    tracing::info!(
        subreddit = %subreddit,
        received = total,
        kept = items.len(),
        "Fetched hot listing"
    );
    Ok(items)
}

fn classify(url: &str, is_video: bool) -> MediaKind {
    if is_video {
        return MediaKind::Video;
    }
    // Query strings would hide the extension
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        MediaKind::Image
    } else {
        MediaKind::Text
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    secure_media: Option<Media>,
    #[serde(default)]
    media: Option<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
struct RedditVideo {
    fallback_url: Option<String>,
}

impl Post {
    fn video_url(&self) -> Option<&str> {
        [self.secure_media.as_ref(), self.media.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|m| m.reddit_video.as_ref())
            .find_map(|v| v.fallback_url.as_deref())
    }

    fn into_item(self) -> FetchedItem {
        let link = self.url.as_deref().unwrap_or_default();
        let media_kind = classify(link, self.is_video);
        let url = match media_kind {
            MediaKind::Video => self.video_url().map(str::to_string).or(self.url.clone()),
            _ => self.url.clone(),
        };

        FetchedItem {
            source: SOURCE.to_string(),
            source_url: self
                .permalink
                .as_deref()
                .map(|p| format!("{PERMALINK_BASE}{p}")),
            source_id: self.id,
            title: self.title,
            url: url.filter(|u| !u.trim().is_empty()),
            media_kind,
        }
    }
}
