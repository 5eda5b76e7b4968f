//! Integration tests for a full delivery cycle: ingest, subscribe, deliver.
//!
//! The Bot API and media hosts are wiremock servers; storage is an in-memory
//! SQLite database per test.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use memecast::delivery::{DeliveryConfig, DeliveryEngine, DeliveryStatus, MediaResolver};
use memecast::ingest::{store_items, FetchedItem};
use memecast::markup;
use memecast::storage::{Database, MediaKind};
use memecast::transport::TelegramClient;

const TOKEN: &str = "42:INTEGRATION";

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn engine(db: &Database, telegram: &MockServer) -> DeliveryEngine {
    let client = reqwest::Client::new();
    let transport = TelegramClient::new(client.clone(), SecretString::from(TOKEN))
        .with_base_url(telegram.uri())
        .with_timeout(Duration::from_secs(5));

    DeliveryEngine::new(
        db.clone(),
        Arc::new(db.clone()),
        Arc::new(transport),
        MediaResolver::new(client, Duration::from_secs(5)),
        DeliveryConfig {
            inter_send_delay: Duration::from_millis(10),
            default_category: "general".to_string(),
        },
    )
}

fn ok_body() -> serde_json::Value {
    json!({ "ok": true, "result": { "message_id": 7 } })
}

fn reddit_item(source_id: &str, title: &str, url: &str, kind: MediaKind) -> FetchedItem {
    FetchedItem {
        source: "reddit".to_string(),
        source_id: source_id.to_string(),
        title: title.to_string(),
        url: Some(url.to_string()),
        source_url: Some(format!(
            "https://www.reddit.com/r/soccercirclejerk/comments/{source_id}/"
        )),
        media_kind: kind,
    }
}

#[tokio::test]
async fn test_post_next_fans_out_and_isolates_rejection() {
    let db = test_db().await;
    let telegram = MockServer::start().await;

    store_items(
        &db,
        &[reddit_item(
            "abc",
            "VAR checked it (for 9 minutes)",
            "https://i.redd.it/abc.png",
            MediaKind::Image,
        )],
        Some("football_meme"),
        480,
    )
    .await
    .unwrap();
    for channel in ["-1001", "-1002", "-1003"] {
        db.add_subscription(channel, None, "football_meme")
            .await
            .unwrap();
    }

    // Mounted first so it wins over the catch-all for this chat
    Mock::given(method("POST"))
        .and(path("/bot42:INTEGRATION/sendPhoto"))
        .and(body_partial_json(json!({ "chat_id": "-1002" })))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was kicked from the channel chat"
        })))
        .expect(1)
        .mount(&telegram)
        .await;

    let caption = markup::caption(
        "VAR checked it (for 9 minutes)",
        Some("https://www.reddit.com/r/soccercirclejerk/comments/abc/"),
    );
    Mock::given(method("POST"))
        .and(path("/bot42:INTEGRATION/sendPhoto"))
        .and(body_partial_json(json!({
            "photo": "https://i.redd.it/abc.png",
            "caption": caption,
            "parse_mode": "MarkdownV2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(2)
        .mount(&telegram)
        .await;

    let engine = engine(&db, &telegram);
    let posted = engine.post_next().await.unwrap().unwrap();

    assert_eq!(posted.result.status, DeliveryStatus::Success);
    assert_eq!(posted.result.sent_count, 2);
    assert_eq!(posted.result.total_recipients, 3);

    let stored = db.get_content_by_id(posted.item.id).await.unwrap().unwrap();
    assert!(stored.posted);
    assert!(stored.posted_at.is_some());

    // The queue is drained
    assert!(engine.post_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_video_is_downloaded_and_uploaded() {
    let db = test_db().await;
    let telegram = MockServer::start().await;
    let media_host = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/xyz/DASH_720.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x00\x00\x00\x18ftypmp42".to_vec()))
        .expect(1)
        .mount(&media_host)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot42:INTEGRATION/sendVideo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&telegram)
        .await;

    let video_url = format!("{}/xyz/DASH_720.mp4", media_host.uri());
    store_items(
        &db,
        &[reddit_item("xyz", "Bicycle kick", &video_url, MediaKind::Video)],
        None,
        480,
    )
    .await
    .unwrap();
    db.add_subscription("@memes", Some("Memes"), "general")
        .await
        .unwrap();

    let engine = engine(&db, &telegram);
    let posted = engine.post_next().await.unwrap().unwrap();
    assert_eq!(posted.result.sent_count, 1);

    let requests = telegram.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"video\""));
    assert!(body.contains("ftypmp42"));
}

#[tokio::test]
async fn test_unreachable_video_skips_upload_but_finalizes() {
    let db = test_db().await;
    let telegram = MockServer::start().await;
    let media_host = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&media_host)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(0)
        .mount(&telegram)
        .await;

    let video_url = format!("{}/gone/DASH_480.mp4", media_host.uri());
    let ids = store_items(
        &db,
        &[reddit_item("gone", "Deleted clip", &video_url, MediaKind::Video)],
        None,
        480,
    )
    .await
    .unwrap();
    assert_eq!(ids.inserted, 1);
    db.add_subscription("-1", None, "general").await.unwrap();

    let engine = engine(&db, &telegram);
    let posted = engine.post_next().await.unwrap().unwrap();

    assert_eq!(posted.result.status, DeliveryStatus::Success);
    assert_eq!(posted.result.sent_count, 0);
    assert_eq!(posted.result.total_recipients, 1);
    assert!(db.next_unposted().await.unwrap().is_none());
}

#[tokio::test]
async fn test_deliver_unknown_id_touches_nothing() {
    let db = test_db().await;
    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(0)
        .mount(&telegram)
        .await;

    store_items(
        &db,
        &[reddit_item("a", "t", "https://i.redd.it/a.jpg", MediaKind::Image)],
        None,
        480,
    )
    .await
    .unwrap();

    let result = engine(&db, &telegram).deliver(9999).await;

    assert_eq!(result.status, DeliveryStatus::NotFound);
    assert_eq!(db.list_content(Some(false), 10).await.unwrap().len(), 1);
}
