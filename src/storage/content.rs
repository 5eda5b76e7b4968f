use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{ContentItem, ContentRow, DatabaseError, NewContent};

/// Maximum number of items to return from any listing query
const MAX_LIST_LIMIT: i64 = 1000;

const CONTENT_COLUMNS: &str = "id, source, source_id, title, url, source_url, media_kind, \
     category, priority, posted, fetched_at, posted_at";

impl Database {
    // ========================================================================
    // Content Ingestion
    // ========================================================================

    /// Insert a newly fetched content item, returning its ID.
    ///
    /// The (source, source_id) pair is unique. A second insert of the same
    /// upstream item is rejected with [`DatabaseError::Duplicate`] and leaves
    /// the stored row untouched. The statement runs on its own, so the pool
    /// stays usable after a rejection.
    pub async fn insert_content(&self, item: &NewContent) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();

        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO content
                (source, source_id, title, url, source_url, media_kind, category, priority, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&item.source)
        .bind(&item.source_id)
        .bind(&item.title)
        .bind(&item.url)
        .bind(&item.source_url)
        .bind(item.media_kind.as_str())
        .bind(&item.category)
        .bind(item.priority)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok((id,)) => Ok(id),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(DatabaseError::Duplicate {
                    origin: item.source.clone(),
                    source_id: item.source_id.clone(),
                })
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    // ========================================================================
    // Content Queries
    // ========================================================================

    /// Get a single content item by its ID.
    pub async fn get_content_by_id(&self, content_id: i64) -> Result<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content WHERE id = ?"
        ))
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ContentRow::into_item))
    }

    /// The next item to deliver: highest priority first, then oldest.
    ///
    /// `id` breaks ties between items fetched within the same second so the
    /// queue order is stable.
    pub async fn next_unposted(&self) -> Result<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content WHERE posted = 0 \
             ORDER BY priority DESC, fetched_at ASC, id ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ContentRow::into_item))
    }

    /// List content items, optionally filtered by posted state.
    ///
    /// Ordered by priority (highest first), then most recently fetched.
    /// The limit is capped at MAX_LIST_LIMIT.
    pub async fn list_content(&self, posted: Option<bool>, limit: i64) -> Result<Vec<ContentItem>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {CONTENT_COLUMNS} FROM content "));
        if let Some(posted) = posted {
            builder.push("WHERE posted = ");
            builder.push_bind(posted);
        }
        builder.push(" ORDER BY priority DESC, fetched_at DESC, id DESC LIMIT ");
        builder.push_bind(limit);

        let rows: Vec<ContentRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ContentRow::into_item).collect())
    }

    // ========================================================================
    // Content Mutations
    // ========================================================================

    /// Mark an item as posted and stamp `posted_at`, returns whether it changed.
    ///
    /// Uses `WHERE posted = 0` so a posted item is terminal: a second call
    /// neither fails nor moves `posted_at`.
    pub async fn mark_posted(&self, content_id: i64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("UPDATE content SET posted = 1, posted_at = ? WHERE id = ? AND posted = 0")
                .bind(now)
                .bind(content_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Change the delivery priority of an item, returns whether it exists.
    pub async fn set_priority(&self, content_id: i64, priority: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE content SET priority = ? WHERE id = ?")
            .bind(priority)
            .bind(content_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
