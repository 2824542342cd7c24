// Persistence seam for the scraping engine.

use async_trait::async_trait;
use sentineliq_common::{ArticleContent, PendingArticle, ScrapeStatus};
use sentineliq_store::{Store, StoreError};
use uuid::Uuid;

type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ScrapeStore: Send + Sync {
    async fn claim_pending(&self, limit: i64) -> StoreResult<Vec<PendingArticle>>;

    /// Persist extracted content and mark the article scraped.
    async fn save_content(&self, content: &ArticleContent) -> StoreResult<()>;

    /// Returns the status the article ended up in: pending (will be retried)
    /// or failed (attempts exhausted).
    async fn mark_failed(&self, id: Uuid, error: &str, max_attempts: i32)
        -> StoreResult<ScrapeStatus>;

    async fn mark_status(
        &self,
        id: Uuid,
        status: ScrapeStatus,
        note: Option<&str>,
    ) -> StoreResult<()>;

    async fn hash_exists(&self, hash: &str) -> StoreResult<bool>;

    /// Newest first.
    async fn recent_hashes(&self, limit: i64) -> StoreResult<Vec<String>>;
}

#[async_trait]
impl ScrapeStore for Store {
    async fn claim_pending(&self, limit: i64) -> StoreResult<Vec<PendingArticle>> {
        self.articles().claim_pending(limit).await
    }

    async fn save_content(&self, content: &ArticleContent) -> StoreResult<()> {
        self.contents().insert(content).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> StoreResult<ScrapeStatus> {
        self.articles().mark_failed(id, error, max_attempts).await
    }

    async fn mark_status(
        &self,
        id: Uuid,
        status: ScrapeStatus,
        note: Option<&str>,
    ) -> StoreResult<()> {
        self.articles().mark_status(id, status, note).await
    }

    async fn hash_exists(&self, hash: &str) -> StoreResult<bool> {
        self.contents().hash_exists(hash).await
    }

    async fn recent_hashes(&self, limit: i64) -> StoreResult<Vec<String>> {
        self.contents().recent_hashes(limit).await
    }
}
