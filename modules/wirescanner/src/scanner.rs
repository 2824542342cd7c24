// WireScanner ingestion loop: active feeds → fetch → parse → validate →
// dedup → batched insert, with per-feed health bookkeeping.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sentineliq_common::{Config, Feed, FeedHealth, NewArticle};
use sentineliq_store::write_batched;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::cache::ExistenceCache;
use crate::discovery::{discover, validate_feed};
use crate::error::Result;
use crate::fetcher::FeedFetcher;
use crate::parser::parse_feed;
use crate::store::IngestStore;
use crate::validate::{validate_item, ItemPolicy, ItemRejection};

#[derive(Debug, Clone, TypedBuilder)]
pub struct ScanSettings {
    #[builder(default = 5)]
    pub feed_concurrency: usize,
    /// Consecutive failures before a feed is marked invalid.
    #[builder(default = 5)]
    pub max_failures: i32,
    #[builder(default = 50)]
    pub insert_batch_size: usize,
    #[builder(default = 3)]
    pub insert_concurrency: usize,
    #[builder(default = 10_000)]
    pub cache_capacity: usize,
    #[builder(default)]
    pub item_policy: ItemPolicy,
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Self {
        ScanSettings::builder()
            .feed_concurrency(config.feed_concurrency)
            .max_failures(config.feed_max_failures)
            .insert_batch_size(config.insert_batch_size)
            .insert_concurrency(config.insert_concurrency)
            .cache_capacity(config.existence_cache_size)
            .item_policy(ItemPolicy {
                max_age: chrono::Duration::try_days(config.feed_max_item_age_days)
                    .unwrap_or(chrono::Duration::MAX),
                ..ItemPolicy::default()
            })
            .build()
    }
}

/// What happened to one feed during a scan.
#[derive(Debug, Default)]
struct FeedOutcome {
    items_seen: usize,
    rejections: BTreeMap<ItemRejection, usize>,
    duplicates: usize,
    inserted: u64,
    insert_failures: usize,
    error: Option<String>,
    invalidated: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ScanStats {
    pub feeds_total: usize,
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub feeds_invalidated: usize,
    pub items_seen: usize,
    pub items_rejected: usize,
    pub rejections: BTreeMap<ItemRejection, usize>,
    pub duplicates: usize,
    pub inserted: u64,
    pub insert_failures: usize,
    pub duration: Duration,
}

impl ScanStats {
    fn absorb(&mut self, outcome: FeedOutcome) {
        if outcome.error.is_some() {
            self.feeds_failed += 1;
        } else {
            self.feeds_ok += 1;
        }
        if outcome.invalidated {
            self.feeds_invalidated += 1;
        }
        self.items_seen += outcome.items_seen;
        for (reason, count) in outcome.rejections {
            self.items_rejected += count;
            *self.rejections.entry(reason).or_default() += count;
        }
        self.duplicates += outcome.duplicates;
        self.inserted += outcome.inserted;
        self.insert_failures += outcome.insert_failures;
    }
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feeds {}/{} ok ({} failed, {} invalidated), items seen={} rejected={} duplicates={} inserted={}",
            self.feeds_ok,
            self.feeds_total,
            self.feeds_failed,
            self.feeds_invalidated,
            self.items_seen,
            self.items_rejected,
            self.duplicates,
            self.inserted,
        )?;
        if self.insert_failures > 0 {
            write!(f, " insert_failures={}", self.insert_failures)?;
        }
        if !self.rejections.is_empty() {
            let reasons: Vec<String> = self
                .rejections
                .iter()
                .map(|(reason, count)| format!("{reason}={count}"))
                .collect();
            write!(f, " [{}]", reasons.join(", "))?;
        }
        write!(f, " in {:.1}s", self.duration.as_secs_f64())
    }
}

pub struct Scanner {
    store: Arc<dyn IngestStore>,
    fetcher: Arc<dyn FeedFetcher>,
    settings: ScanSettings,
    cache: Mutex<ExistenceCache>,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn IngestStore>,
        fetcher: Arc<dyn FeedFetcher>,
        settings: ScanSettings,
    ) -> Self {
        let cache = Mutex::new(ExistenceCache::new(settings.cache_capacity));
        Self {
            store,
            fetcher,
            settings,
            cache,
        }
    }

    /// Scan every active feed once.
    ///
    /// Individual feed failures are recorded against the feed and counted;
    /// only failing to load the feed list aborts the scan.
    pub async fn run(&self) -> Result<ScanStats> {
        let started = Instant::now();
        let feeds = self.store.active_feeds().await?;
        info!(feeds = feeds.len(), concurrency = self.settings.feed_concurrency, "WireScanner: starting scan");

        let now = Utc::now();
        let outcomes: Vec<FeedOutcome> = stream::iter(feeds.iter())
            .map(|feed| self.scan_feed(feed, now))
            .buffer_unordered(self.settings.feed_concurrency.max(1))
            .collect()
            .await;

        let mut stats = ScanStats {
            feeds_total: feeds.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            stats.absorb(outcome);
        }
        stats.duration = started.elapsed();

        info!("WireScanner: scan complete. {stats}");
        Ok(stats)
    }

    /// Validate a feed URL and register it.
    pub async fn add_feed(
        &self,
        url: &str,
        name: Option<&str>,
        category: Option<&str>,
    ) -> Result<Feed> {
        let url = url.trim();
        let parsed = validate_feed(self.fetcher.as_ref(), url).await?;
        let name = name.map(String::from).or(parsed.title);
        let feed = self
            .store
            .register_feed(url, name.as_deref(), category)
            .await?;
        info!(feed_url = %feed.url, items = parsed.items.len(), "WireScanner: feed registered");
        Ok(feed)
    }

    /// Discover a site's feeds and register every one that parses.
    pub async fn discover_and_register(
        &self,
        site_url: &str,
        category: Option<&str>,
    ) -> Result<Vec<Feed>> {
        let found = discover(self.fetcher.as_ref(), site_url.trim()).await?;
        let mut registered = Vec::with_capacity(found.len());
        for candidate in found {
            let feed = self
                .store
                .register_feed(&candidate.url, candidate.title.as_deref(), category)
                .await?;
            info!(
                site_url,
                feed_url = %feed.url,
                items = candidate.item_count,
                "WireScanner: discovered feed registered"
            );
            registered.push(feed);
        }
        Ok(registered)
    }

    async fn scan_feed(&self, feed: &Feed, now: DateTime<Utc>) -> FeedOutcome {
        let mut outcome = FeedOutcome::default();

        match self.ingest(feed, now, &mut outcome).await {
            Ok(()) => {
                if let Err(e) = self.store.record_success(feed.id, Utc::now()).await {
                    warn!(feed_url = %feed.url, error = %e, "feed: failed to record success");
                }
                info!(
                    feed_url = %feed.url,
                    seen = outcome.items_seen,
                    duplicates = outcome.duplicates,
                    inserted = outcome.inserted,
                    "feed: ingested"
                );
            }
            Err(e) => {
                let message = e.to_string();
                warn!(feed_url = %feed.url, error = %message, "feed: scan failed");
                outcome.invalidated = self.record_failure(feed, &message).await;
                outcome.error = Some(message);
            }
        }

        outcome
    }

    /// Returns true if this failure invalidated the feed.
    async fn record_failure(&self, feed: &Feed, message: &str) -> bool {
        match self
            .store
            .record_failure(feed.id, message, self.settings.max_failures)
            .await
        {
            Ok(FeedHealth::Invalidated) => {
                warn!(
                    feed_url = %feed.url,
                    max_failures = self.settings.max_failures,
                    "feed: marked invalid after repeated failures"
                );
                true
            }
            Ok(FeedHealth::Degraded(fail_count)) => {
                debug!(feed_url = %feed.url, fail_count, "feed: failure recorded");
                false
            }
            Err(e) => {
                warn!(feed_url = %feed.url, error = %e, "feed: failed to record failure");
                false
            }
        }
    }

    async fn ingest(
        &self,
        feed: &Feed,
        now: DateTime<Utc>,
        outcome: &mut FeedOutcome,
    ) -> Result<()> {
        let body = self.fetcher.fetch(&feed.url).await?;
        let parsed = parse_feed(&body)?;
        outcome.items_seen = parsed.items.len();

        let mut seen = HashSet::new();
        let mut accepted: Vec<NewArticle> = Vec::new();
        for item in &parsed.items {
            match validate_item(item, feed.id, &self.settings.item_policy, now) {
                Ok(article) => {
                    if seen.insert(article.url.clone()) {
                        accepted.push(article);
                    } else {
                        outcome.duplicates += 1;
                    }
                }
                Err(reason) => {
                    debug!(feed_url = %feed.url, url = ?item.url, %reason, "feed: item rejected");
                    *outcome.rejections.entry(reason).or_default() += 1;
                }
            }
        }

        let accepted_len = accepted.len();
        let candidates: Vec<NewArticle> = {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            accepted
                .into_iter()
                .filter(|a| !cache.contains(&a.url))
                .collect()
        };
        outcome.duplicates += accepted_len - candidates.len();
        if candidates.is_empty() {
            return Ok(());
        }

        let urls: Vec<String> = candidates.iter().map(|a| a.url.clone()).collect();
        let existing = self.store.existing_urls(&urls).await?;
        let (known, fresh): (Vec<NewArticle>, Vec<NewArticle>) = candidates
            .into_iter()
            .partition(|a| existing.contains(&a.url));
        outcome.duplicates += known.len();
        self.remember(known.into_iter().map(|a| a.url));

        if fresh.is_empty() {
            return Ok(());
        }

        let store = &self.store;
        let batch = write_batched(
            &fresh,
            self.settings.insert_batch_size,
            self.settings.insert_concurrency,
            |chunk| store.insert_articles(chunk),
        )
        .await;

        outcome.inserted = batch.written;
        outcome.insert_failures = batch.failed_items;
        if batch.is_clean() {
            self.remember(fresh.into_iter().map(|a| a.url));
        } else {
            warn!(feed_url = %feed.url, "feed: {batch}");
        }

        Ok(())
    }

    fn remember<I: IntoIterator<Item = String>>(&self, urls: I) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.extend(urls);
    }

    /// Number of URLs held in the existence cache.
    pub fn cached_urls(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
