use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sentineliq_common::{NewArticle, PendingArticle, ScrapeStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// A claimed article is invisible to other claimers for this long.
const CLAIM_LEASE_MINUTES: i32 = 15;
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, sqlx::FromRow)]
struct PendingRow {
    id: Uuid,
    feed_id: Option<Uuid>,
    url: String,
    title: String,
    published_at: Option<DateTime<Utc>>,
    attempts: i32,
}

impl From<PendingRow> for PendingArticle {
    fn from(row: PendingRow) -> Self {
        PendingArticle {
            id: row.id,
            feed_id: row.feed_id,
            url: row.url,
            title: row.title,
            published_at: row.published_at,
            attempts: row.attempts,
        }
    }
}

pub struct ArticleRepository {
    pool: PgPool,
}

impl ArticleRepository {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Which of `urls` already exist.
    pub async fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<String> = sqlx::query_scalar("SELECT url FROM articles WHERE url = ANY($1)")
            .bind(urls)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Insert a batch in one statement. Rows whose URL already exists are
    /// skipped. Returns the number of rows actually inserted.
    pub async fn insert_batch(&self, articles: &[NewArticle]) -> Result<u64> {
        if articles.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(articles.len());
        let mut feed_ids = Vec::with_capacity(articles.len());
        let mut urls = Vec::with_capacity(articles.len());
        let mut titles = Vec::with_capacity(articles.len());
        let mut descriptions: Vec<Option<String>> = Vec::with_capacity(articles.len());
        let mut published: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(articles.len());
        for a in articles {
            ids.push(Uuid::new_v4());
            feed_ids.push(a.feed_id);
            urls.push(a.url.clone());
            titles.push(a.title.clone());
            descriptions.push(a.description.clone());
            published.push(a.published_at);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO articles (id, feed_id, url, title, description, published_at)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::text[], $5::text[], $6::timestamptz[])
            ON CONFLICT (url) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&feed_ids)
        .bind(&urls)
        .bind(&titles)
        .bind(&descriptions)
        .bind(&published)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Claim up to `limit` of the oldest-discovered pending articles. The
    /// claimed rows come back newest-published first.
    ///
    /// Each claim bumps the attempt counter and takes a lease, so concurrent
    /// scrapers never receive the same row and a row handed back to pending
    /// is not re-claimed until the lease expires.
    pub async fn claim_pending(&self, limit: i64) -> Result<Vec<PendingArticle>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            UPDATE articles
            SET attempts = attempts + 1,
                claimed_at = now()
            WHERE id IN (
                SELECT id FROM articles
                WHERE status = 'pending'
                  AND (claimed_at IS NULL OR claimed_at < now() - make_interval(mins => $2))
                ORDER BY discovered_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, feed_id, url, title, published_at, attempts
            "#,
        )
        .bind(limit)
        .bind(CLAIM_LEASE_MINUTES)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed: Vec<PendingArticle> = rows.into_iter().map(PendingArticle::from).collect();
        claimed.sort_by(|a, b| a.published_at.cmp(&b.published_at).reverse());
        Ok(claimed)
    }

    /// Record a failed scrape. The article stays pending until its attempts
    /// reach `max_attempts`, then becomes failed. Returns the new status.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<ScrapeStatus> {
        let error = sentineliq_common::truncate_chars(error, MAX_ERROR_LEN);
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE articles
            SET status = CASE WHEN attempts >= $3 THEN 'failed' ELSE 'pending' END,
                last_error = $2
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(&error)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        let status = status.ok_or_else(|| StoreError::NotFound(format!("article {id}")))?;
        status
            .parse()
            .map_err(|e: String| StoreError::Other(anyhow::anyhow!(e)))
    }

    /// Move an article to a terminal status with an optional note.
    pub async fn mark_status(
        &self,
        id: Uuid,
        status: ScrapeStatus,
        note: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET status = $2,
                last_error = $3,
                scraped_at = CASE WHEN $2 = 'scraped' THEN now() ELSE scraped_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(note)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("article {id}")));
        }
        Ok(())
    }

    /// Article counts per status.
    pub async fn status_counts(&self) -> Result<Vec<(ScrapeStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM articles GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(status, count)| {
                status
                    .parse()
                    .map(|s| (s, count))
                    .map_err(|e: String| StoreError::Other(anyhow::anyhow!(e)))
            })
            .collect()
    }
}
