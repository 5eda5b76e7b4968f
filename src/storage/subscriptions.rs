use anyhow::{bail, Result};

use super::schema::Database;
use super::types::{ChannelSubscription, SubscriptionOutcome};
use crate::util::normalize_category;

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Sanitize and validate a category name.
    ///
    /// Strips control characters, trims whitespace, and rejects empty names.
    fn sanitize_category(category: &str) -> Result<String> {
        match normalize_category(category) {
            Some(category) => Ok(category),
            None => bail!("Category cannot be empty or whitespace-only"),
        }
    }

    /// Subscribe a channel to a category.
    ///
    /// A channel may follow several categories, but each (channel, category)
    /// pair is stored once. Subscribing again reports `AlreadySubscribed`.
    pub async fn add_subscription(
        &self,
        channel_id: &str,
        channel_name: Option<&str>,
        category: &str,
    ) -> Result<SubscriptionOutcome> {
        let category = Self::sanitize_category(category)?;
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            bail!("Channel id cannot be empty");
        }

        let result = sqlx::query(
            r#"
            INSERT INTO channel_subscriptions (channel_id, channel_name, category, added_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(channel_id, category) DO NOTHING
        "#,
        )
        .bind(channel_id)
        .bind(channel_name)
        .bind(&category)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(SubscriptionOutcome::AlreadySubscribed)
        } else {
            Ok(SubscriptionOutcome::Added)
        }
    }

    /// Remove a channel's subscription to a category, returns whether one existed.
    pub async fn remove_subscription(&self, channel_id: &str, category: &str) -> Result<bool> {
        let category = Self::sanitize_category(category)?;
        let result =
            sqlx::query("DELETE FROM channel_subscriptions WHERE channel_id = ? AND category = ?")
                .bind(channel_id.trim())
                .bind(&category)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List subscriptions in the order they were added.
    pub async fn list_subscriptions(&self, limit: i64) -> Result<Vec<ChannelSubscription>> {
        let rows = sqlx::query_as::<_, ChannelSubscription>(
            r#"
            SELECT id, channel_id, channel_name, category, added_at
            FROM channel_subscriptions
            ORDER BY id
            LIMIT ?
        "#,
        )
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Channel ids subscribed to `category`, in subscription order.
    pub async fn channel_ids_for_category(&self, category: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT channel_id FROM channel_subscriptions WHERE category = ? ORDER BY id",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
