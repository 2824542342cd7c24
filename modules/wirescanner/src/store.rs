// Persistence seam for the scanner. Production uses the Postgres store; tests
// use an in-memory double.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentineliq_common::{Feed, FeedHealth, NewArticle};
use sentineliq_store::{Store, StoreError};
use uuid::Uuid;

type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait IngestStore: Send + Sync {
    async fn active_feeds(&self) -> StoreResult<Vec<Feed>>;

    async fn register_feed(
        &self,
        url: &str,
        name: Option<&str>,
        category: Option<&str>,
    ) -> StoreResult<Feed>;

    async fn existing_urls(&self, urls: &[String]) -> StoreResult<HashSet<String>>;

    /// Insert articles, skipping URLs that already exist. Returns rows inserted.
    async fn insert_articles(&self, articles: &[NewArticle]) -> StoreResult<u64>;

    async fn record_success(&self, feed_id: Uuid, fetched_at: DateTime<Utc>) -> StoreResult<()>;

    async fn record_failure(
        &self,
        feed_id: Uuid,
        error: &str,
        max_failures: i32,
    ) -> StoreResult<FeedHealth>;
}

#[async_trait]
impl IngestStore for Store {
    async fn active_feeds(&self) -> StoreResult<Vec<Feed>> {
        self.feeds().active().await
    }

    async fn register_feed(
        &self,
        url: &str,
        name: Option<&str>,
        category: Option<&str>,
    ) -> StoreResult<Feed> {
        self.feeds().upsert(url, name, category).await
    }

    async fn existing_urls(&self, urls: &[String]) -> StoreResult<HashSet<String>> {
        self.articles().existing_urls(urls).await
    }

    async fn insert_articles(&self, articles: &[NewArticle]) -> StoreResult<u64> {
        self.articles().insert_batch(articles).await
    }

    async fn record_success(&self, feed_id: Uuid, fetched_at: DateTime<Utc>) -> StoreResult<()> {
        self.feeds().record_success(feed_id, fetched_at).await
    }

    async fn record_failure(
        &self,
        feed_id: Uuid,
        error: &str,
        max_failures: i32,
    ) -> StoreResult<FeedHealth> {
        self.feeds().record_failure(feed_id, error, max_failures).await
    }
}
