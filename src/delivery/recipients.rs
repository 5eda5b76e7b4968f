use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::storage::Database;

/// Resolves a content category to the channels that should receive it.
///
/// The order of the returned ids is the order recipients are attempted in.
/// No matching subscription is an empty list, not an error.
#[async_trait]
pub trait RecipientRegistry: Send + Sync {
    async fn resolve_recipients(&self, category: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl RecipientRegistry for Database {
    async fn resolve_recipients(&self, category: &str) -> Result<Vec<String>> {
        let mut ids = self
            .channel_ids_for_category(category)
            .await
            .with_context(|| format!("Failed to load subscribers for category '{category}'"))?;

        // (channel_id, category) is unique, but keep the set property explicit
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        ids.retain(|id| seen.insert(id.clone()));

        Ok(ids)
    }
}
