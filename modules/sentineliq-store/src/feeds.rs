use chrono::{DateTime, Utc};
use sentineliq_common::{Feed, FeedHealth};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Longest error message persisted on a feed row.
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: Uuid,
    url: String,
    name: Option<String>,
    category: Option<String>,
    is_active: bool,
    fail_count: i32,
    last_error: Option<String>,
    last_fetched_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            url: row.url,
            name: row.name,
            category: row.category,
            is_active: row.is_active,
            fail_count: row.fail_count,
            last_error: row.last_error,
            last_fetched_at: row.last_fetched_at,
            last_success_at: row.last_success_at,
            created_at: row.created_at,
        }
    }
}

pub struct FeedRepository {
    pool: PgPool,
}

impl FeedRepository {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a feed, or refresh an existing registration.
    ///
    /// Re-registering a deactivated feed reactivates it with a clean failure count.
    pub async fn upsert(
        &self,
        url: &str,
        name: Option<&str>,
        category: Option<&str>,
    ) -> Result<Feed> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            INSERT INTO feeds (id, url, name, category)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (url) DO UPDATE SET
                name = COALESCE(EXCLUDED.name, feeds.name),
                category = COALESCE(EXCLUDED.category, feeds.category),
                is_active = TRUE,
                fail_count = 0,
                last_error = NULL
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(url)
        .bind(name)
        .bind(category)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>("SELECT * FROM feeds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Feed::from))
    }

    pub async fn by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>("SELECT * FROM feeds WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Feed::from))
    }

    /// Active feeds, least recently fetched first.
    pub async fn active(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT * FROM feeds
            WHERE is_active
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Mark a successful fetch. Clears the failure streak.
    pub async fn record_success(&self, id: Uuid, fetched_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET fail_count = 0,
                last_error = NULL,
                last_fetched_at = $2,
                last_success_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(fetched_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("feed {id}")));
        }
        Ok(())
    }

    /// Record a failed fetch. The feed is deactivated once its consecutive
    /// failure count reaches `max_failures`.
    pub async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        max_failures: i32,
    ) -> Result<FeedHealth> {
        let error = sentineliq_common::truncate_chars(error, MAX_ERROR_LEN);
        let row: Option<(i32, bool)> = sqlx::query_as(
            r#"
            UPDATE feeds
            SET fail_count = fail_count + 1,
                last_error = $2,
                last_fetched_at = now(),
                is_active = is_active AND (fail_count + 1) < $3
            WHERE id = $1
            RETURNING fail_count, is_active
            "#,
        )
        .bind(id)
        .bind(&error)
        .bind(max_failures)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((_, false)) => Ok(FeedHealth::Invalidated),
            Some((fail_count, true)) => Ok(FeedHealth::Degraded(fail_count)),
            None => Err(StoreError::NotFound(format!("feed {id}"))),
        }
    }
}
