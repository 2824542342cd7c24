// Feed discovery: find feed URLs advertised by a site and keep the ones that parse.

use std::collections::HashSet;
use std::sync::LazyLock;

use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Result, ScanError};
use crate::fetcher::FeedFetcher;
use crate::parser::{parse_feed, ParsedFeed};

static FEED_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link[^>]+type\s*=\s*["']application/(rss\+xml|atom\+xml|feed\+json)["'][^>]*>"#)
        .expect("valid regex")
});
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

/// Well-known feed locations probed when a page advertises nothing.
const FALLBACK_PATHS: &[&str] = &["/feed", "/rss", "/rss.xml", "/feed.xml", "/atom.xml", "/index.xml"];
const PROBE_CONCURRENCY: usize = 4;

/// A feed that was fetched and parsed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredFeed {
    pub url: String,
    pub title: Option<String>,
    pub item_count: usize,
}

/// Feed URLs advertised via `<link type="application/rss+xml|atom+xml|feed+json">`.
/// Relative hrefs are resolved against `base_url`; results are deduplicated.
pub fn discover_feed_urls(html: &str, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut feeds = Vec::new();

    for cap in FEED_LINK_RE.captures_iter(html) {
        let tag = cap.get(0).map(|m| m.as_str()).unwrap_or("");
        let Some(href) = HREF_RE.captures(tag).and_then(|c| c.get(1)) else {
            continue;
        };
        let href = href.as_str().trim();
        let resolved = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Some(ref b) = base {
            match b.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            }
        } else {
            continue;
        };

        if seen.insert(resolved.clone()) {
            feeds.push(resolved);
        }
    }

    feeds
}

/// Advertised feeds first, then the well-known fallback locations on the same origin.
pub fn candidate_feed_urls(html: &str, site_url: &str) -> Vec<String> {
    let mut candidates = discover_feed_urls(html, site_url);
    let mut seen: HashSet<String> = candidates.iter().cloned().collect();

    if let Ok(base) = url::Url::parse(site_url) {
        for path in FALLBACK_PATHS {
            if let Ok(u) = base.join(path) {
                let u = u.to_string();
                if seen.insert(u.clone()) {
                    candidates.push(u);
                }
            }
        }
    }

    candidates
}

/// Fetch and parse a feed, requiring at least one entry.
pub async fn validate_feed(fetcher: &dyn FeedFetcher, url: &str) -> Result<ParsedFeed> {
    if !sentineliq_common::is_valid_http_url(url) {
        return Err(ScanError::InvalidUrl(url.to_string()));
    }
    let body = fetcher.fetch(url).await?;
    let feed = parse_feed(&body)?;
    if feed.items.is_empty() {
        return Err(ScanError::Empty);
    }
    Ok(feed)
}

/// Find working feeds for a site.
///
/// If `site_url` is itself a feed it is returned alone. Otherwise the page is
/// scanned for advertised feeds and the fallback locations are probed.
pub async fn discover(fetcher: &dyn FeedFetcher, site_url: &str) -> Result<Vec<DiscoveredFeed>> {
    if !sentineliq_common::is_valid_http_url(site_url) {
        return Err(ScanError::InvalidUrl(site_url.to_string()));
    }

    // An unreachable front page still leaves the well-known locations to try.
    let body = match fetcher.fetch(site_url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(site_url, error = %e, "discovery: site fetch failed, probing fallback paths");
            bytes::Bytes::new()
        }
    };
    if let Ok(feed) = parse_feed(&body) {
        if !feed.items.is_empty() {
            info!(site_url, items = feed.items.len(), "discovery: URL is a feed");
            return Ok(vec![DiscoveredFeed {
                url: site_url.to_string(),
                title: feed.title,
                item_count: feed.items.len(),
            }]);
        }
    }

    let html = String::from_utf8_lossy(&body);
    let candidates = candidate_feed_urls(&html, site_url);
    debug!(site_url, candidates = candidates.len(), "discovery: probing candidates");

    let probed: Vec<Option<DiscoveredFeed>> = stream::iter(candidates)
        .map(|url| async move {
            match validate_feed(fetcher, &url).await {
                Ok(feed) => Some(DiscoveredFeed {
                    url,
                    title: feed.title,
                    item_count: feed.items.len(),
                }),
                Err(e) => {
                    debug!(url, error = %e, "discovery: candidate rejected");
                    None
                }
            }
        })
        .buffered(PROBE_CONCURRENCY)
        .collect()
        .await;

    let found: Vec<DiscoveredFeed> = probed.into_iter().flatten().collect();
    info!(site_url, feeds = found.len(), "discovery: complete");
    Ok(found)
}
