use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Database is locked by another memecast process. Please stop it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A content item with the same (source, source_id) is already stored
    #[error("Duplicate content item: {origin}/{source_id}")]
    Duplicate { origin: String, source_id: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, detecting lock contention
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// Returns true if this error is a dedup rejection rather than a storage fault.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::Duplicate { .. })
    }
}

// ============================================================================
// Media Kind
// ============================================================================

/// How a content item's `url` should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Text,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Text => "text",
        }
    }

    /// Lenient conversion for values read back from the database.
    /// Anything unrecognised is delivered as plain text.
    pub(crate) fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(MediaKind::Text)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "text" => Ok(MediaKind::Text),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// A content item ready for insertion (produced by the ingestion fetchers)
#[derive(Debug, Clone)]
pub struct NewContent {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub media_kind: MediaKind,
    pub category: Option<String>,
    pub priority: i64,
}

/// Result of subscribing a channel to a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Added,
    AlreadySubscribed,
}

/// Internal row type for content queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ContentRow {
    pub id: i64,
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub media_kind: String,
    pub category: Option<String>,
    pub priority: i64,
    pub posted: bool,
    pub fetched_at: i64,
    pub posted_at: Option<i64>,
}

impl ContentRow {
    pub(crate) fn into_item(self) -> ContentItem {
        ContentItem {
            id: self.id,
            source: self.source,
            source_id: self.source_id,
            title: self.title,
            url: self.url,
            source_url: self.source_url,
            media_kind: MediaKind::from_db(&self.media_kind),
            category: self.category,
            priority: self.priority,
            posted: self.posted,
            fetched_at: self.fetched_at,
            posted_at: self.posted_at,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A stored content item.
///
/// `posted` flips to true exactly once, after the delivery engine has run a
/// cycle for the item. `posted_at` is set at the same time.
#[derive(Debug, Clone, Serialize)]
pub struct ContentItem {
    pub id: i64,
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Attribution link shown under the caption (e.g. the Reddit permalink)
    pub source_url: Option<String>,
    pub media_kind: MediaKind,
    pub category: Option<String>,
    pub priority: i64,
    pub posted: bool,
    pub fetched_at: i64,
    pub posted_at: Option<i64>,
}

/// A channel subscribed to one category
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChannelSubscription {
    pub id: i64,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub category: String,
    pub added_at: i64,
}
