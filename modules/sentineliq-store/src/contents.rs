use sentineliq_common::ArticleContent;
use sqlx::PgPool;

use crate::error::{Result, StoreError};

pub struct ContentRepository {
    pool: PgPool,
}

impl ContentRepository {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store extracted content and mark its article scraped, atomically.
    /// Re-scraping an article replaces its previous content.
    pub async fn insert(&self, content: &ArticleContent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO article_contents
                (article_id, title, body, excerpt, author, published_at, word_count, content_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (article_id) DO UPDATE SET
                title = EXCLUDED.title,
                body = EXCLUDED.body,
                excerpt = EXCLUDED.excerpt,
                author = EXCLUDED.author,
                published_at = EXCLUDED.published_at,
                word_count = EXCLUDED.word_count,
                content_hash = EXCLUDED.content_hash,
                scraped_at = now()
            "#,
        )
        .bind(content.article_id)
        .bind(&content.title)
        .bind(&content.body)
        .bind(&content.excerpt)
        .bind(&content.author)
        .bind(content.published_at)
        .bind(content.word_count)
        .bind(&content.content_hash)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            r#"
            UPDATE articles
            SET status = 'scraped', scraped_at = now(), last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(content.article_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("article {}", content.article_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn hash_exists(&self, hash: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM article_contents WHERE content_hash = $1)",
        )
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Most recently stored content hashes, newest first.
    pub async fn recent_hashes(&self, limit: i64) -> Result<Vec<String>> {
        let hashes = sqlx::query_scalar(
            "SELECT content_hash FROM article_contents ORDER BY scraped_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(hashes)
    }
}
