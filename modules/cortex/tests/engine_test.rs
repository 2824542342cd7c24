//! Scraping engine behavior against in-memory doubles: no browser, no database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cortex::{
    BrowserLauncher, BrowserPool, CortexError, PageRenderer, ScrapeSettings, ScrapeStore,
    ScrapingEngine,
};
use sentineliq_common::{ArticleContent, PendingArticle, ScrapeStatus};
use sentineliq_store::StoreError;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

struct Row {
    article: PendingArticle,
    status: ScrapeStatus,
    claimed: bool,
    note: Option<String>,
}

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<Row>>,
    contents: Mutex<Vec<ArticleContent>>,
    /// The next save stalls briefly and then fails.
    fail_next_save: AtomicBool,
}

impl MemoryStore {
    fn with_articles(articles: &[(&str, &str)]) -> Self {
        let store = MemoryStore::default();
        store.add(articles);
        store
    }

    fn add(&self, articles: &[(&str, &str)]) {
        let mut rows = self.rows.lock().unwrap();
        for (url, title) in articles {
            rows.push(Row {
                article: PendingArticle {
                    id: Uuid::new_v4(),
                    feed_id: None,
                    url: url.to_string(),
                    title: title.to_string(),
                    published_at: None,
                    attempts: 0,
                },
                status: ScrapeStatus::Pending,
                claimed: false,
                note: None,
            });
        }
    }

    fn status(&self, url: &str) -> ScrapeStatus {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.article.url == url)
            .map(|r| r.status)
            .unwrap()
    }

    fn attempts(&self, url: &str) -> i32 {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.article.url == url)
            .map(|r| r.article.attempts)
            .unwrap()
    }

    fn note(&self, url: &str) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.article.url == url)
            .and_then(|r| r.note.clone())
    }

    /// Simulates the claim lease expiring.
    fn release_claims(&self) {
        for row in self.rows.lock().unwrap().iter_mut() {
            row.claimed = false;
        }
    }

    fn content_for(&self, url: &str) -> Option<ArticleContent> {
        let id = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.article.url == url)
            .map(|r| r.article.id)?;
        self.contents
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.article_id == id)
            .cloned()
    }
}

#[async_trait]
impl ScrapeStore for MemoryStore {
    async fn claim_pending(&self, limit: i64) -> Result<Vec<PendingArticle>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let mut claimed = Vec::new();
        for row in rows.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if row.status == ScrapeStatus::Pending && !row.claimed {
                row.claimed = true;
                row.article.attempts += 1;
                claimed.push(row.article.clone());
            }
        }
        Ok(claimed)
    }

    async fn save_content(&self, content: &ArticleContent) -> Result<(), StoreError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            return Err(StoreError::NotFound("connection reset".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.article.id == content.article_id)
            .ok_or_else(|| StoreError::NotFound(content.article_id.to_string()))?;
        row.status = ScrapeStatus::Scraped;
        self.contents.lock().unwrap().push(content.clone());
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<ScrapeStatus, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.article.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.status = if row.article.attempts >= max_attempts {
            ScrapeStatus::Failed
        } else {
            ScrapeStatus::Pending
        };
        row.note = Some(error.to_string());
        Ok(row.status)
    }

    async fn mark_status(
        &self,
        id: Uuid,
        status: ScrapeStatus,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.article.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.status = status;
        row.note = note.map(String::from);
        Ok(())
    }

    async fn hash_exists(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .contents
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.content_hash == hash))
    }

    async fn recent_hashes(&self, limit: i64) -> Result<Vec<String>, StoreError> {
        Ok(self
            .contents
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .map(|c| c.content_hash.clone())
            .collect())
    }
}

/// Serves canned HTML; unknown URLs fail like a navigation error.
struct StaticRenderer(Arc<HashMap<String, String>>);

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn render(&self, url: &str, _timeout: Duration) -> cortex::Result<String> {
        self.0.get(url).cloned().ok_or_else(|| CortexError::Render {
            url: url.to_string(),
            message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })
    }
}

struct StaticLauncher(Arc<HashMap<String, String>>);

#[async_trait]
impl BrowserLauncher for StaticLauncher {
    async fn launch(&self) -> cortex::Result<Box<dyn PageRenderer>> {
        Ok(Box::new(StaticRenderer(Arc::clone(&self.0))))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn article_page(title: &str, topic: &str) -> String {
    let para = format!(
        "Officials said the {topic} project would continue through the summer, with crews \
         working on weekdays and some weekends so that residents see the results on schedule. "
    );
    format!(
        "<html><head><title>{title} | Valley Times</title></head><body><article>\
         <h1>{title}</h1><p>{}</p><p>{}</p><p>{}</p></article></body></html>",
        para.repeat(3),
        para.repeat(3),
        para.repeat(3)
    )
}

fn untitled_page(topic: &str) -> String {
    let para = format!(
        "Volunteers spent the weekend on the {topic} effort and organizers thanked \
         everyone who turned out to help despite the cold and the rain that morning. "
    );
    format!(
        "<html><body><article><p>{}</p><p>{}</p></article></body></html>",
        para.repeat(4),
        para.repeat(4)
    )
}

fn pages(entries: &[(&str, String)]) -> Arc<HashMap<String, String>> {
    Arc::new(
        entries
            .iter()
            .map(|(url, html)| (url.to_string(), html.clone()))
            .collect(),
    )
}

fn settings() -> ScrapeSettings {
    ScrapeSettings::builder()
        .acquire_timeout(Duration::from_secs(5))
        .min_delay(Duration::ZERO)
        .max_delay(Duration::from_millis(10))
        .memory_threshold_mb(0)
        .build()
}

fn engine(
    store: Arc<MemoryStore>,
    pages: Arc<HashMap<String, String>>,
    settings: ScrapeSettings,
) -> ScrapingEngine {
    let pool = BrowserPool::new(Arc::new(StaticLauncher(pages)), 2, 0);
    ScrapingEngine::new(store, pool, settings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scrapes_articles_and_sorts_out_the_rest() {
    let store = Arc::new(MemoryStore::with_articles(&[
        ("https://valley.example.com/bridge", "Bridge repairs funded"),
        ("https://valley.example.com/wall", "Please wait"),
        ("https://valley.example.com/gone", "Removed story"),
    ]));
    let pages = pages(&[
        ("https://valley.example.com/bridge", article_page("Bridge repairs funded", "bridge")),
        (
            "https://valley.example.com/wall",
            "<html><head><title>Please wait | Valley Times</title></head>\
             <body><p>Checking your browser before accessing the site.</p></body></html>"
                .to_string(),
        ),
    ]);

    let engine = engine(store.clone(), pages, settings());
    let stats = engine.run().await.unwrap();

    assert_eq!(stats.claimed, 3);
    assert_eq!(stats.scraped, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.retrying, 1);
    assert_eq!(stats.failed, 0);

    assert_eq!(store.status("https://valley.example.com/bridge"), ScrapeStatus::Scraped);
    assert_eq!(store.status("https://valley.example.com/wall"), ScrapeStatus::Rejected);
    assert_eq!(store.status("https://valley.example.com/gone"), ScrapeStatus::Pending);
    assert!(store
        .note("https://valley.example.com/gone")
        .unwrap()
        .contains("ERR_NAME_NOT_RESOLVED"));

    let content = store.content_for("https://valley.example.com/bridge").unwrap();
    assert_eq!(content.title, "Bridge repairs funded");
    assert!(content.word_count >= 50);
    assert_eq!(content.content_hash.len(), 8);
}

#[tokio::test]
async fn failures_exhaust_the_attempt_budget() {
    let store = Arc::new(MemoryStore::with_articles(&[(
        "https://valley.example.com/gone",
        "Removed story",
    )]));
    let engine = engine(
        store.clone(),
        pages(&[]),
        ScrapeSettings {
            max_attempts: 2,
            ..settings()
        },
    );

    let first = engine.run().await.unwrap();
    assert_eq!(first.retrying, 1);
    assert_eq!(store.status("https://valley.example.com/gone"), ScrapeStatus::Pending);

    // Claimed articles stay leased for the rest of the pass.
    let idle = engine.run().await.unwrap();
    assert_eq!(idle.claimed, 0);

    store.release_claims();
    let second = engine.run().await.unwrap();
    assert_eq!(second.failed, 1);
    assert_eq!(store.attempts("https://valley.example.com/gone"), 2);
    assert_eq!(store.status("https://valley.example.com/gone"), ScrapeStatus::Failed);
}

#[tokio::test]
async fn identical_content_is_stored_once_per_run() {
    let html = article_page("Budget hearing set", "budget");
    let store = Arc::new(MemoryStore::with_articles(&[
        ("https://valley.example.com/budget", "Budget hearing set"),
        ("https://valley.example.com/budget-amp", "Budget hearing set"),
    ]));
    let pages = pages(&[
        ("https://valley.example.com/budget", html.clone()),
        ("https://valley.example.com/budget-amp", html),
    ]);

    let stats = engine(store.clone(), pages, settings()).run().await.unwrap();

    assert_eq!(stats.scraped, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(store.contents.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn copy_waiting_on_a_failed_save_is_requeued_not_marked_duplicate() {
    let html = article_page("Council approves transit plan", "transit");
    let store = Arc::new(MemoryStore::with_articles(&[
        ("https://valley.example.com/transit", "Council approves transit plan"),
        ("https://wire.example.com/transit", "Council approves transit plan"),
    ]));
    store.fail_next_save.store(true, Ordering::SeqCst);
    let pages = pages(&[
        ("https://valley.example.com/transit", html.clone()),
        ("https://wire.example.com/transit", html),
    ]);
    let engine = engine(store.clone(), pages, settings());

    let first = engine.run().await.unwrap();
    assert_eq!(first.store_errors, 1);
    assert_eq!(first.retrying, 1);
    assert_eq!(first.duplicates, 0);
    assert!(store.contents.lock().unwrap().is_empty());
    for url in ["https://valley.example.com/transit", "https://wire.example.com/transit"] {
        assert_eq!(store.status(url), ScrapeStatus::Pending, "{url}");
    }

    store.release_claims();
    let second = engine.run().await.unwrap();
    assert_eq!(second.scraped, 1);
    assert_eq!(second.duplicates, 1);
    assert_eq!(store.contents.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn stored_hashes_are_recognized_by_a_fresh_engine() {
    let html = article_page("Library extends weekend hours", "library");
    let pages = pages(&[
        ("https://valley.example.com/library", html.clone()),
        ("https://mirror.example.com/library", html),
    ]);
    let store = Arc::new(MemoryStore::with_articles(&[(
        "https://valley.example.com/library",
        "Library extends weekend hours",
    )]));

    let first = engine(store.clone(), pages.clone(), settings())
        .run()
        .await
        .unwrap();
    assert_eq!(first.scraped, 1);

    store.add(&[("https://mirror.example.com/library", "Library extends weekend hours")]);
    let second = engine(store.clone(), pages, settings())
        .run()
        .await
        .unwrap();

    assert_eq!(second.duplicates, 1);
    assert_eq!(store.status("https://mirror.example.com/library"), ScrapeStatus::Duplicate);
    assert!(store
        .note("https://mirror.example.com/library")
        .unwrap()
        .starts_with("duplicate content"));
}

#[tokio::test]
async fn feed_title_fills_in_for_untitled_pages() {
    let store = Arc::new(MemoryStore::with_articles(&[(
        "https://valley.example.com/garden",
        "Garden cleanup draws a crowd",
    )]));
    let pages = pages(&[("https://valley.example.com/garden", untitled_page("garden"))]);

    let stats = engine(store.clone(), pages, settings()).run().await.unwrap();

    assert_eq!(stats.scraped, 1);
    let content = store.content_for("https://valley.example.com/garden").unwrap();
    assert_eq!(content.title, "Garden cleanup draws a crowd");
}

#[tokio::test]
async fn max_articles_caps_a_pass() {
    let urls: Vec<String> = (0..5)
        .map(|n| format!("https://valley.example.com/story-{n}"))
        .collect();
    let articles: Vec<(&str, &str)> = urls.iter().map(|u| (u.as_str(), "A story")).collect();
    let store = Arc::new(MemoryStore::with_articles(&articles));
    let html: Vec<(&str, String)> = urls
        .iter()
        .enumerate()
        .map(|(n, u)| (u.as_str(), article_page("A story worth reading", &format!("topic {n}"))))
        .collect();

    let engine = engine(
        store.clone(),
        pages(&html),
        ScrapeSettings {
            batch_size: 2,
            max_articles: Some(3),
            ..settings()
        },
    );
    let stats = engine.run().await.unwrap();

    assert_eq!(stats.claimed, 3);
    assert_eq!(stats.batches, 2);
    let pending: HashSet<ScrapeStatus> = urls.iter().map(|u| store.status(u)).collect();
    assert!(pending.contains(&ScrapeStatus::Pending));
}

#[tokio::test]
async fn shutdown_closes_the_pool() {
    let store = Arc::new(MemoryStore::default());
    let engine = engine(store, pages(&[]), settings());

    engine.shutdown();
    assert!(matches!(engine.run().await, Err(CortexError::PoolClosed)));
}
