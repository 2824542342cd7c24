// Cortex scraping loop: claim pending articles in batches, render each through
// the browser pool, extract, validate, dedup and store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use sentineliq_common::{content_hash_hex, is_valid_http_url, ArticleContent, Config, PendingArticle, ScrapeStatus};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::dedup::{ContentDeduper, HashClaim};
use crate::delay::AdaptiveDelay;
use crate::error::{CortexError, Result};
use crate::extract::extract_article;
use crate::memory::MemoryGuard;
use crate::pool::{BrowserPool, PoolStats};
use crate::store::ScrapeStore;
use crate::validate::{validate_content, ContentPolicy, ContentRejection};

#[derive(Debug, Clone, TypedBuilder)]
pub struct ScrapeSettings {
    #[builder(default = 20)]
    pub batch_size: i64,
    /// Attempts before an article is marked failed for good.
    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default = Duration::from_secs(30))]
    pub page_timeout: Duration,
    /// How long an article waits for a free browser before counting as a failure.
    #[builder(default = Duration::from_secs(120))]
    pub acquire_timeout: Duration,
    #[builder(default = Duration::from_millis(500))]
    pub min_delay: Duration,
    #[builder(default = Duration::from_secs(10))]
    pub max_delay: Duration,
    /// 0 disables the memory check.
    #[builder(default = 1024)]
    pub memory_threshold_mb: u64,
    #[builder(default = 5_000)]
    pub dedup_capacity: usize,
    /// Stop after claiming this many articles in one pass.
    #[builder(default)]
    pub max_articles: Option<usize>,
    #[builder(default)]
    pub content_policy: ContentPolicy,
}

impl ScrapeSettings {
    pub fn from_config(config: &Config) -> Self {
        ScrapeSettings::builder()
            .batch_size(config.scrape_batch_size)
            .max_attempts(config.scrape_max_attempts)
            .page_timeout(config.page_timeout)
            .acquire_timeout(config.page_timeout.saturating_mul(4))
            .min_delay(config.scrape_min_delay)
            .max_delay(config.scrape_max_delay)
            .memory_threshold_mb(config.memory_threshold_mb)
            .build()
    }
}

/// Result of one scrape attempt, before anything is written.
enum Scrape {
    Content(ArticleContent),
    Rejected(ContentRejection),
    Duplicate(String),
    /// Same content as an article whose save has not finished yet.
    Contended(String),
}

/// What happened to one claimed article.
#[derive(Debug)]
enum ArticleOutcome {
    Scraped { words: u64 },
    Rejected(ContentRejection),
    Duplicate,
    Retrying,
    Failed,
    StoreError,
}

#[derive(Debug, Default, Clone)]
pub struct ScrapeStats {
    pub batches: usize,
    pub claimed: usize,
    pub scraped: usize,
    pub rejected: usize,
    pub rejections: BTreeMap<ContentRejection, usize>,
    pub duplicates: usize,
    /// Failed this pass, back to pending for a later one.
    pub retrying: usize,
    /// Failed with attempts exhausted.
    pub failed: usize,
    pub store_errors: usize,
    pub words: u64,
    pub memory_recycles: usize,
    pub pool: Option<PoolStats>,
    pub duration: Duration,
}

impl ScrapeStats {
    fn record(&mut self, outcome: ArticleOutcome) {
        match outcome {
            ArticleOutcome::Scraped { words } => {
                self.scraped += 1;
                self.words += words;
            }
            ArticleOutcome::Rejected(reason) => {
                self.rejected += 1;
                *self.rejections.entry(reason).or_default() += 1;
            }
            ArticleOutcome::Duplicate => self.duplicates += 1,
            ArticleOutcome::Retrying => self.retrying += 1,
            ArticleOutcome::Failed => self.failed += 1,
            ArticleOutcome::StoreError => self.store_errors += 1,
        }
    }
}

impl fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "claimed={} scraped={} rejected={} duplicates={} retrying={} failed={} words={}",
            self.claimed,
            self.scraped,
            self.rejected,
            self.duplicates,
            self.retrying,
            self.failed,
            self.words,
        )?;
        if self.store_errors > 0 {
            write!(f, " store_errors={}", self.store_errors)?;
        }
        if !self.rejections.is_empty() {
            let reasons: Vec<String> = self
                .rejections
                .iter()
                .map(|(reason, count)| format!("{reason}={count}"))
                .collect();
            write!(f, " [{}]", reasons.join(", "))?;
        }
        if let Some(pool) = &self.pool {
            write!(f, ", browsers launched={} retired={}", pool.launched, pool.retired)?;
        }
        if self.memory_recycles > 0 {
            write!(f, " memory_recycles={}", self.memory_recycles)?;
        }
        write!(f, " in {:.1}s", self.duration.as_secs_f64())
    }
}

pub struct ScrapingEngine {
    store: Arc<dyn ScrapeStore>,
    pool: BrowserPool,
    settings: ScrapeSettings,
    deduper: Mutex<ContentDeduper>,
    warmed: AtomicBool,
    delay: AdaptiveDelay,
    memory: MemoryGuard,
}

impl ScrapingEngine {
    pub fn new(store: Arc<dyn ScrapeStore>, pool: BrowserPool, settings: ScrapeSettings) -> Self {
        Self {
            deduper: Mutex::new(ContentDeduper::new(settings.dedup_capacity)),
            warmed: AtomicBool::new(false),
            delay: AdaptiveDelay::new(settings.min_delay, settings.max_delay),
            memory: MemoryGuard::new(settings.memory_threshold_mb),
            store,
            pool,
            settings,
        }
    }

    /// Scrape pending articles until none are left to claim.
    ///
    /// Per-article failures are recorded against the article and counted;
    /// only failing to claim a batch aborts the pass.
    pub async fn run(&self) -> Result<ScrapeStats> {
        self.run_with_limit(self.settings.max_articles).await
    }

    /// Like [`run`](Self::run), stopping after `max_articles` claims.
    pub async fn run_with_limit(&self, max_articles: Option<usize>) -> Result<ScrapeStats> {
        if self.pool.is_closed() {
            return Err(CortexError::PoolClosed);
        }
        let started = Instant::now();
        self.warm_dedup().await?;

        let mut stats = ScrapeStats::default();
        let concurrency = self.pool.capacity();
        info!(concurrency, batch_size = self.settings.batch_size, "Cortex: starting scrape");

        while let Some(limit) = self.next_claim_size(stats.claimed, max_articles) {
            let batch = self.store.claim_pending(limit).await?;
            if batch.is_empty() {
                break;
            }
            stats.batches += 1;
            stats.claimed += batch.len();
            debug!(batch = stats.batches, articles = batch.len(), "Cortex: batch claimed");

            let outcomes: Vec<ArticleOutcome> = stream::iter(batch)
                .map(|article| self.process(article))
                .buffer_unordered(concurrency)
                .collect()
                .await;
            for outcome in outcomes {
                stats.record(outcome);
            }

            if let Some(used_mb) = self.memory.check() {
                let released = self.pool.recycle_idle();
                warn!(
                    used_mb,
                    threshold_mb = self.memory.threshold_mb(),
                    released,
                    "Cortex: memory above threshold, recycled idle browsers"
                );
                stats.memory_recycles += 1;
            }
        }

        self.pool.recycle_idle();
        stats.pool = Some(self.pool.stats());
        stats.duration = started.elapsed();
        info!("Cortex: scrape complete. {stats}");
        Ok(stats)
    }

    /// Close the browser pool. Further runs fail with `PoolClosed`.
    pub fn shutdown(&self) {
        self.pool.close();
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn next_claim_size(&self, claimed: usize, max_articles: Option<usize>) -> Option<i64> {
        let batch = self.settings.batch_size.max(1);
        match max_articles {
            None => Some(batch),
            Some(max) => {
                let left = max.saturating_sub(claimed);
                (left > 0).then(|| batch.min(i64::try_from(left).unwrap_or(i64::MAX)))
            }
        }
    }

    async fn warm_dedup(&self) -> Result<()> {
        if self.warmed.load(Ordering::Acquire) {
            return Ok(());
        }
        let limit = i64::try_from(self.settings.dedup_capacity).unwrap_or(i64::MAX);
        let mut hashes = self.store.recent_hashes(limit).await?;
        hashes.reverse();
        let count = hashes.len();
        self.deduper().warm(hashes);
        self.warmed.store(true, Ordering::Release);
        debug!(hashes = count, "Cortex: dedup cache warmed");
        Ok(())
    }

    async fn process(&self, article: PendingArticle) -> ArticleOutcome {
        self.delay.wait().await;

        match self.scrape(&article).await {
            Ok(Scrape::Content(content)) => {
                self.delay.on_success();
                let words = u64::try_from(content.word_count).unwrap_or(0);
                match self.store.save_content(&content).await {
                    Ok(()) => {
                        self.deduper().commit(&content.content_hash);
                        debug!(url = %article.url, words, "article: scraped");
                        ArticleOutcome::Scraped { words }
                    }
                    Err(e) => {
                        self.deduper().release(&content.content_hash);
                        warn!(url = %article.url, error = %e, "article: failed to store content");
                        ArticleOutcome::StoreError
                    }
                }
            }
            Ok(Scrape::Rejected(reason)) => {
                self.delay.on_success();
                debug!(url = %article.url, %reason, "article: rejected");
                self.settle(&article, ScrapeStatus::Rejected, reason.as_str(), ArticleOutcome::Rejected(reason))
                    .await
            }
            Ok(Scrape::Duplicate(hash)) => {
                self.delay.on_success();
                debug!(url = %article.url, hash = %hash, "article: duplicate content");
                let note = format!("duplicate content {hash}");
                self.settle(&article, ScrapeStatus::Duplicate, &note, ArticleOutcome::Duplicate)
                    .await
            }
            Ok(Scrape::Contended(hash)) => {
                self.delay.on_success();
                // The lease keeps it out of this pass.
                debug!(url = %article.url, hash = %hash, "article: content already being stored, requeued");
                let note = format!("content {hash} was being stored by another article");
                self.settle(&article, ScrapeStatus::Pending, &note, ArticleOutcome::Retrying)
                    .await
            }
            Err(e) => {
                let delay = self.delay.on_failure();
                warn!(
                    url = %article.url,
                    attempt = article.attempts,
                    error = %e,
                    next_delay_ms = delay.as_millis() as u64,
                    "article: scrape failed"
                );
                self.record_failure(&article, &e).await
            }
        }
    }

    /// Record a terminal status, yielding `outcome` if the write succeeds.
    async fn settle(
        &self,
        article: &PendingArticle,
        status: ScrapeStatus,
        note: &str,
        outcome: ArticleOutcome,
    ) -> ArticleOutcome {
        match self.store.mark_status(article.id, status, Some(note)).await {
            Ok(()) => outcome,
            Err(e) => {
                warn!(url = %article.url, %status, error = %e, "article: failed to record status");
                ArticleOutcome::StoreError
            }
        }
    }

    async fn record_failure(&self, article: &PendingArticle, error: &CortexError) -> ArticleOutcome {
        match self
            .store
            .mark_failed(article.id, &error.to_string(), self.settings.max_attempts)
            .await
        {
            Ok(ScrapeStatus::Failed) => {
                warn!(
                    url = %article.url,
                    attempts = article.attempts,
                    "article: giving up after repeated failures"
                );
                ArticleOutcome::Failed
            }
            Ok(_) => ArticleOutcome::Retrying,
            Err(e) => {
                warn!(url = %article.url, error = %e, "article: failed to record failure");
                ArticleOutcome::StoreError
            }
        }
    }

    async fn scrape(&self, article: &PendingArticle) -> Result<Scrape> {
        if !is_valid_http_url(&article.url) {
            return Ok(Scrape::Rejected(ContentRejection::InvalidUrl));
        }

        let html = {
            let mut browser = self
                .pool
                .acquire(Some(self.settings.acquire_timeout))
                .await?;
            browser.render(&article.url, self.settings.page_timeout).await?
        };
        if html.trim().is_empty() {
            return Err(CortexError::Render {
                url: article.url.clone(),
                message: "empty DOM".to_string(),
            });
        }

        let mut extracted = extract_article(&html, &article.url);
        if extracted.title.is_none() && !article.title.trim().is_empty() {
            extracted.title = Some(article.title.clone());
        }
        if let Err(reason) = validate_content(&article.url, &extracted, &self.settings.content_policy) {
            return Ok(Scrape::Rejected(reason));
        }

        let hash = content_hash_hex(&extracted.body);
        let claim = self.deduper().claim(&hash);
        match claim {
            HashClaim::Seen => return Ok(Scrape::Duplicate(hash)),
            HashClaim::InFlight => return Ok(Scrape::Contended(hash)),
            HashClaim::Fresh => {}
        }
        match self.store.hash_exists(&hash).await {
            Ok(true) => {
                self.deduper().commit(&hash);
                return Ok(Scrape::Duplicate(hash));
            }
            Ok(false) => {}
            Err(e) => {
                self.deduper().release(&hash);
                return Err(e.into());
            }
        }

        Ok(Scrape::Content(ArticleContent {
            article_id: article.id,
            title: extracted.title.unwrap_or_default(),
            word_count: i32::try_from(extracted.word_count).unwrap_or(i32::MAX),
            body: extracted.body,
            excerpt: extracted.excerpt,
            author: extracted.author,
            published_at: extracted.published_at.or(article.published_at),
            content_hash: hash,
        }))
    }

    fn deduper(&self) -> MutexGuard<'_, ContentDeduper> {
        self.deduper.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
