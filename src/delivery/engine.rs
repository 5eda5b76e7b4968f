use anyhow::{Context, Result};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::media::{MediaError, MediaResolver, ResolvedMedia};
use super::recipients::RecipientRegistry;
use super::throttle::SendThrottle;
use crate::markup;
use crate::storage::{ContentItem, Database, MediaKind};
use crate::transport::{Transport, TransportError};
use crate::util::normalize_category;

pub const DEFAULT_CATEGORY: &str = "general";
pub const DEFAULT_INTER_SEND_DELAY: Duration = Duration::from_millis(500);

/// Engine settings.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Minimum gap between two transport sends
    pub inter_send_delay: Duration,
    /// Category used when an item has none
    pub default_category: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            inter_send_delay: DEFAULT_INTER_SEND_DELAY,
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

/// Terminal state of one delivery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Every recipient was attempted (check `sent_count` for partial delivery)
    Success,
    NoSubscribers,
    NoMedia,
    NotFound,
    /// The item was posted by an earlier cycle; nothing was sent
    AlreadyPosted,
    /// The cycle hit an unexpected error; the item was still finalized
    Failed,
}

impl DeliveryStatus {
    /// Whether the cycle ends by marking the item posted.
    fn finalizes(&self) -> bool {
        !matches!(self, DeliveryStatus::NotFound | DeliveryStatus::AlreadyPosted)
    }
}

/// Outcome of `deliver`, reported to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub content_id: i64,
    pub status: DeliveryStatus,
    pub sent_count: usize,
    pub total_recipients: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    fn new(content_id: i64, status: DeliveryStatus, sent_count: usize, total: usize) -> Self {
        Self {
            content_id,
            status,
            sent_count,
            total_recipients: total,
            error: None,
        }
    }

    fn failed(content_id: i64, progress: &CycleProgress, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(
                content_id,
                DeliveryStatus::Failed,
                progress.sent.load(Ordering::Relaxed),
                progress.total.load(Ordering::Relaxed),
            )
        }
    }
}

/// Counts recorded while a cycle runs, readable after it errors or unwinds.
#[derive(Debug, Default)]
struct CycleProgress {
    total: AtomicUsize,
    sent: AtomicUsize,
}

/// What happened for a single recipient.
#[derive(Debug)]
pub enum RecipientOutcome {
    Sent,
    /// Media could not be prepared; nothing was sent
    Skipped(MediaError),
    /// The transport refused or failed the send
    Failed(TransportError),
}

impl RecipientOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, RecipientOutcome::Sent)
    }
}

/// The item picked by [`DeliveryEngine::post_next`] and how its cycle went.
#[derive(Debug, Clone, Serialize)]
pub struct PostedItem {
    pub item: ContentItem,
    pub result: DeliveryResult,
}

/// Fans one content item out to every channel subscribed to its category.
///
/// A cycle attempts each recipient once, in registry order, and isolates
/// failures per recipient. Whatever happens inside the cycle, the item is
/// marked posted at the end of it (except when it does not exist or was
/// already posted), so a bad item can never block the queue.
pub struct DeliveryEngine {
    db: Database,
    registry: Arc<dyn RecipientRegistry>,
    transport: Arc<dyn Transport>,
    media: MediaResolver,
    throttle: SendThrottle,
    default_category: String,
}

impl DeliveryEngine {
    pub fn new(
        db: Database,
        registry: Arc<dyn RecipientRegistry>,
        transport: Arc<dyn Transport>,
        media: MediaResolver,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            db,
            registry,
            transport,
            media,
            throttle: SendThrottle::new(config.inter_send_delay),
            default_category: config.default_category,
        }
    }

    /// Run one delivery cycle for `content_id`.
    ///
    /// Never returns an error: unexpected failures (storage errors, panics in
    /// the fan-out) come back as [`DeliveryStatus::Failed`] after the item has
    /// been finalized, with the counts reached before the failure.
    ///
    /// Finalization runs after the cycle future completes, so the returned
    /// future must be driven to completion. Dropping it mid-cycle (for
    /// example as a losing `select!` branch) leaves the item unposted.
    pub async fn deliver(&self, content_id: i64) -> DeliveryResult {
        let progress = CycleProgress::default();
        let cycle = AssertUnwindSafe(self.run_cycle(content_id, &progress))
            .catch_unwind()
            .await;

        let mut result = match cycle {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                let message = format!("{e:#}");
                tracing::error!(content_id = content_id, error = %message, "Delivery cycle failed");
                DeliveryResult::failed(content_id, &progress, message)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(content_id = content_id, panic = %message, "Delivery cycle panicked");
                DeliveryResult::failed(
                    content_id,
                    &progress,
                    format!("panic during delivery: {message}"),
                )
            }
        };

        if result.status.finalizes() {
            self.finalize(&mut result).await;
        }

        tracing::info!(
            content_id = content_id,
            status = ?result.status,
            sent = result.sent_count,
            total = result.total_recipients,
            "Delivery cycle complete"
        );
        result
    }

    /// Deliver the next queued item (highest priority, then oldest).
    ///
    /// Returns `None` when nothing is waiting.
    pub async fn post_next(&self) -> Result<Option<PostedItem>> {
        let Some(item) = self
            .db
            .next_unposted()
            .await
            .context("Failed to select next unposted item")?
        else {
            tracing::debug!("No unposted content");
            return Ok(None);
        };

        let result = self.deliver(item.id).await;
        Ok(Some(PostedItem { item, result }))
    }

    async fn run_cycle(
        &self,
        content_id: i64,
        progress: &CycleProgress,
    ) -> Result<DeliveryResult> {
        let Some(item) = self
            .db
            .get_content_by_id(content_id)
            .await
            .context("Failed to load content item")?
        else {
            tracing::warn!(content_id = content_id, "Content item not found");
            return Ok(DeliveryResult::new(content_id, DeliveryStatus::NotFound, 0, 0));
        };

        if item.posted {
            tracing::warn!(content_id = content_id, "Content item already posted, skipping");
            return Ok(DeliveryResult::new(content_id, DeliveryStatus::AlreadyPosted, 0, 0));
        }

        let category = self.category_for(&item);
        let recipients = self.registry.resolve_recipients(&category).await?;
        let total = recipients.len();
        progress.total.store(total, Ordering::Relaxed);

        if recipients.is_empty() {
            tracing::info!(content_id = content_id, category = %category, "No subscribers for category");
            return Ok(DeliveryResult::new(content_id, DeliveryStatus::NoSubscribers, 0, 0));
        }

        let Some(url) = item.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            tracing::info!(content_id = content_id, "Content item has no media URL");
            return Ok(DeliveryResult::new(content_id, DeliveryStatus::NoMedia, 0, total));
        };

        let caption = markup::caption(&item.title, item.source_url.as_deref());

        let mut outcomes = Vec::with_capacity(total);
        for recipient in &recipients {
            let outcome = self
                .deliver_to(recipient, &caption, url, item.media_kind)
                .await;

            match &outcome {
                RecipientOutcome::Sent => {
                    progress.sent.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(content_id = content_id, recipient = %recipient, "Sent");
                }
                RecipientOutcome::Skipped(e) => {
                    tracing::warn!(
                        content_id = content_id,
                        recipient = %recipient,
                        error = %e,
                        "Media unavailable, skipping recipient"
                    );
                }
                RecipientOutcome::Failed(e) => {
                    tracing::warn!(
                        content_id = content_id,
                        recipient = %recipient,
                        transient = e.is_transient(),
                        error = %e,
                        "Send failed, continuing with next recipient"
                    );
                }
            }
            outcomes.push(outcome);
        }

        let sent = outcomes.iter().filter(|o| o.is_sent()).count();
        Ok(DeliveryResult::new(content_id, DeliveryStatus::Success, sent, total))
    }

    async fn deliver_to(
        &self,
        recipient: &str,
        caption: &str,
        url: &str,
        kind: MediaKind,
    ) -> RecipientOutcome {
        // The permit is taken after media resolution so downloads never hold the send slot
        let sent = match self.media.resolve(url, kind).await {
            ResolvedMedia::Unavailable(e) => return RecipientOutcome::Skipped(e),
            ResolvedMedia::ByReference(url) => {
                let _permit = self.throttle.acquire().await;
                self.transport
                    .send_by_reference(recipient, caption, &url, kind)
                    .await
            }
            ResolvedMedia::Payload(payload) => {
                let _permit = self.throttle.acquire().await;
                self.transport
                    .send_payload(recipient, caption, &payload)
                    .await
            }
        };

        match sent {
            Ok(()) => RecipientOutcome::Sent,
            Err(e) => RecipientOutcome::Failed(e),
        }
    }

    fn category_for(&self, item: &ContentItem) -> String {
        item.category
            .as_deref()
            .and_then(normalize_category)
            .unwrap_or_else(|| self.default_category.clone())
    }

    async fn finalize(&self, result: &mut DeliveryResult) {
        match self.db.mark_posted(result.content_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    content_id = result.content_id,
                    "Item was already finalized by a concurrent cycle"
                );
            }
            Err(e) => {
                tracing::error!(
                    content_id = result.content_id,
                    error = %e,
                    "Failed to mark content item as posted"
                );
                result.status = DeliveryStatus::Failed;
                result.error = Some(format!("failed to mark posted: {e:#}"));
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewContent;
    use crate::transport::MediaPayload;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone)]
    struct Call {
        recipient: String,
        caption: String,
        url: Option<String>,
        payload: Option<Vec<u8>>,
        at: Instant,
    }

    /// Records every send; fails or panics for configured recipients.
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
        fail_for: Vec<&'static str>,
        panic_for: Option<&'static str>,
    }

    impl RecordingTransport {
        fn failing_for(recipients: &[&'static str]) -> Self {
            Self {
                fail_for: recipients.to_vec(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, recipient: &str, caption: &str, url: Option<&str>, payload: Option<&[u8]>) {
            self.calls.lock().unwrap().push(Call {
                recipient: recipient.to_string(),
                caption: caption.to_string(),
                url: url.map(str::to_string),
                payload: payload.map(<[u8]>::to_vec),
                at: Instant::now(),
            });
        }

        fn outcome(&self, recipient: &str) -> Result<(), TransportError> {
            if self.panic_for == Some(recipient) {
                panic!("transport exploded for {recipient}");
            }
            if self.fail_for.contains(&recipient) {
                return Err(TransportError::Timeout);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_by_reference(
            &self,
            recipient: &str,
            caption: &str,
            url: &str,
            _kind: MediaKind,
        ) -> Result<(), TransportError> {
            self.record(recipient, caption, Some(url), None);
            self.outcome(recipient)
        }

        async fn send_payload(
            &self,
            recipient: &str,
            caption: &str,
            payload: &MediaPayload,
        ) -> Result<(), TransportError> {
            self.record(recipient, caption, None, Some(&payload.bytes));
            self.outcome(recipient)
        }
    }

    struct BrokenRegistry;

    #[async_trait]
    impl RecipientRegistry for BrokenRegistry {
        async fn resolve_recipients(&self, _category: &str) -> Result<Vec<String>> {
            anyhow::bail!("subscriptions table unavailable")
        }
    }

    fn engine_with(
        db: &Database,
        transport: Arc<RecordingTransport>,
        spacing: Duration,
    ) -> DeliveryEngine {
        DeliveryEngine::new(
            db.clone(),
            Arc::new(db.clone()),
            transport,
            MediaResolver::new(reqwest::Client::new(), Duration::from_secs(5)),
            DeliveryConfig {
                inter_send_delay: spacing,
                default_category: DEFAULT_CATEGORY.to_string(),
            },
        )
    }

    fn item(source_id: &str, kind: MediaKind, url: Option<&str>, category: Option<&str>) -> NewContent {
        NewContent {
            source: "reddit".to_string(),
            source_id: source_id.to_string(),
            title: "Derby day. Again!".to_string(),
            url: url.map(str::to_string),
            source_url: Some(format!("https://www.reddit.com/comments/{source_id}/")),
            media_kind: kind,
            category: category.map(str::to_string),
            priority: 0,
        }
    }

    async fn seeded_db(channels: &[&str], category: &str) -> Database {
        let db = Database::open(":memory:").await.unwrap();
        for channel in channels {
            db.add_subscription(channel, None, category).await.unwrap();
        }
        db
    }

    async fn assert_finalized(db: &Database, id: i64) {
        let stored = db.get_content_by_id(id).await.unwrap().unwrap();
        assert!(stored.posted, "item {id} should be posted");
        assert!(stored.posted_at.is_some(), "item {id} should have posted_at");
    }

    #[tokio::test]
    async fn test_deliver_to_all_subscribers() {
        let db = seeded_db(&["-1", "-2", "-3"], "football_meme").await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), Some("football_meme")))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::Success);
        assert_eq!(result.sent_count, 3);
        assert_eq!(result.total_recipients, 3);
        assert!(result.error.is_none());

        let calls = transport.calls();
        let recipients: Vec<&str> = calls.iter().map(|c| c.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["-1", "-2", "-3"]);

        // Caption is rendered once and shared
        let expected = markup::caption("Derby day. Again!", Some("https://www.reddit.com/comments/a/"));
        assert!(calls.iter().all(|c| c.caption == expected));
        assert!(calls.iter().all(|c| c.url.as_deref() == Some("https://i.redd.it/a.jpg")));

        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_deliver_missing_item_is_not_found_without_mutation() {
        let db = seeded_db(&["-1"], "general").await;
        let other = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(other + 100).await;

        assert_eq!(result.status, DeliveryStatus::NotFound);
        assert_eq!(result.sent_count, 0);
        assert!(transport.calls().is_empty());
        let untouched = db.get_content_by_id(other).await.unwrap().unwrap();
        assert!(!untouched.posted);
        assert_eq!(db.list_content(Some(true), 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_no_subscribers_still_finalizes() {
        let db = seeded_db(&["-1"], "news").await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), Some("football_meme")))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::NoSubscribers);
        assert_eq!(result.total_recipients, 0);
        assert!(transport.calls().is_empty());
        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_missing_url_is_no_media_and_finalizes() {
        let db = seeded_db(&["-1", "-2"], "general").await;
        let id = db
            .insert_content(&item("a", MediaKind::Text, Some("   "), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::NoMedia);
        assert_eq!(result.sent_count, 0);
        assert_eq!(result.total_recipients, 2);
        assert!(transport.calls().is_empty());
        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_stop_the_rest() {
        let db = seeded_db(&["-1", "-2", "-3"], "general").await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::failing_for(&["-2"]));
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::Success);
        assert_eq!(result.sent_count, 2);
        assert_eq!(result.total_recipients, 3);
        let recipients: Vec<String> = transport.calls().into_iter().map(|c| c.recipient).collect();
        assert_eq!(recipients, vec!["-1", "-2", "-3"]);
        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_video_download_failure_skips_only_that_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4".to_vec()))
            .mount(&server)
            .await;

        let db = seeded_db(&["-1", "-2"], "general").await;
        let url = format!("{}/DASH_480.mp4", server.uri());
        let id = db
            .insert_content(&item("v", MediaKind::Video, Some(&url), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::Success);
        assert_eq!(result.sent_count, 1);
        assert_eq!(result.total_recipients, 2);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].recipient, "-2");
        assert_eq!(calls[0].payload.as_deref(), Some(&b"mp4"[..]));
        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_sends_are_spaced() {
        let spacing = Duration::from_millis(100);
        let db = seeded_db(&["-1", "-2"], "general").await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), spacing);

        engine.deliver(id).await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].at - calls[0].at >= spacing);
    }

    #[tokio::test]
    async fn test_panic_in_fan_out_still_finalizes() {
        let db = seeded_db(&["-1", "-2"], "general").await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport {
            panic_for: Some("-2"),
            ..Default::default()
        });
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::Failed);
        assert!(result.error.unwrap().contains("transport exploded"));
        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_registry_error_is_failed_and_finalized() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = DeliveryEngine::new(
            db.clone(),
            Arc::new(BrokenRegistry),
            transport.clone(),
            MediaResolver::new(reqwest::Client::new(), Duration::from_secs(5)),
            DeliveryConfig::default(),
        );

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::Failed);
        assert!(result.error.unwrap().contains("subscriptions table unavailable"));
        assert!(transport.calls().is_empty());
        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_blank_category_uses_default() {
        let db = seeded_db(&["-9"], DEFAULT_CATEGORY).await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), Some("  ")))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.sent_count, 1);
        assert_eq!(transport.calls()[0].recipient, "-9");
    }

    #[tokio::test]
    async fn test_already_posted_item_is_not_resent() {
        let db = seeded_db(&["-1"], "general").await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        engine.deliver(id).await;
        let first = db.get_content_by_id(id).await.unwrap().unwrap();
        let again = engine.deliver(id).await;

        assert_eq!(again.status, DeliveryStatus::AlreadyPosted);
        assert_eq!(transport.calls().len(), 1);
        let second = db.get_content_by_id(id).await.unwrap().unwrap();
        assert_eq!(first.posted_at, second.posted_at);
    }

    #[tokio::test]
    async fn test_post_next_picks_highest_priority() {
        let db = seeded_db(&["-1"], "general").await;
        let low = db
            .insert_content(&item("low", MediaKind::Image, Some("https://i.redd.it/l.jpg"), None))
            .await
            .unwrap();
        let high = db
            .insert_content(&item("high", MediaKind::Image, Some("https://i.redd.it/h.jpg"), None))
            .await
            .unwrap();
        db.set_priority(high, 10).await.unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let posted = engine.post_next().await.unwrap().unwrap();
        assert_eq!(posted.item.id, high);
        assert_eq!(posted.result.status, DeliveryStatus::Success);

        let posted = engine.post_next().await.unwrap().unwrap();
        assert_eq!(posted.item.id, low);

        assert!(engine.post_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_counts_reached() {
        let db = seeded_db(&["-1", "-2", "-3"], "general").await;
        let id = db
            .insert_content(&item("a", MediaKind::Image, Some("https://i.redd.it/a.jpg"), None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport {
            panic_for: Some("-2"),
            ..Default::default()
        });
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.status, DeliveryStatus::Failed);
        assert_eq!(result.sent_count, 1);
        assert_eq!(result.total_recipients, 3);
        assert_finalized(&db, id).await;
    }

    #[tokio::test]
    async fn test_item_category_with_control_chars_matches_subscribers() {
        let db = seeded_db(&["-7"], "football_meme").await;
        let id = db
            .insert_content(&item(
                "a",
                MediaKind::Image,
                Some("https://i.redd.it/a.jpg"),
                Some("football\x1b[0m_meme\n"),
            ))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(&db, transport.clone(), Duration::ZERO);

        let result = engine.deliver(id).await;

        assert_eq!(result.sent_count, 1);
        assert_eq!(transport.calls()[0].recipient, "-7");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DeliveryStatus::NoSubscribers).unwrap();
        assert_eq!(json, "\"no_subscribers\"");
    }
}
