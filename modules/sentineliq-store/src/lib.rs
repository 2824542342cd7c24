// Postgres repositories for feeds, articles and extracted article content.
// Both crawlers go through these; nothing else in the workspace issues SQL.

pub mod articles;
pub mod batch;
pub mod contents;
pub mod error;
pub mod feeds;
#[cfg(feature = "test-utils")]
pub mod testutil;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub use articles::ArticleRepository;
pub use batch::{write_batched, BatchOutcome};
pub use contents::ContentRepository;
pub use error::{Result, StoreError};
pub use feeds::FeedRepository;

/// Handle to the harvest database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn feeds(&self) -> FeedRepository {
        FeedRepository::new(self.pool.clone())
    }

    pub fn articles(&self) -> ArticleRepository {
        ArticleRepository::new(self.pool.clone())
    }

    pub fn contents(&self) -> ContentRepository {
        ContentRepository::new(self.pool.clone())
    }
}
