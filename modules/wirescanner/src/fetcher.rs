// HTTP fetching for feeds and site front pages.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Result, ScanError};

const USER_AGENT: &str = "SentinelIQ-WireScanner/0.1 (+https://github.com/sentineliq/harvest)";
const ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/feed+json, application/xml;q=0.9, text/xml;q=0.8, text/html;q=0.7, */*;q=0.5";
/// Feeds larger than this are rejected unread.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(750);

/// Source of raw feed/page bytes.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ScanError::Other(anyhow::anyhow!("Failed to build feed HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn fetch_once(&self, url: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| ScanError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScanError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = resp.content_length() {
            if len as usize > MAX_BODY_BYTES {
                return Err(ScanError::TooLarge(len as usize));
            }
        }

        let body = resp.bytes().await.map_err(|e| ScanError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if body.len() > MAX_BODY_BYTES {
            return Err(ScanError::TooLarge(body.len()));
        }
        Ok(body)
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        with_retries(url, RETRY_BASE, |_| self.fetch_once(url)).await
    }
}

/// Run `attempt` up to `MAX_ATTEMPTS` times, backing off linearly from `base`
/// between transient failures. Anything else is returned as is.
async fn with_retries<F, Fut>(url: &str, base: Duration, mut attempt: F) -> Result<Bytes>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Bytes>>,
{
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(body) => {
                debug!(url, bytes = body.len(), attempt = n, "feed: fetched");
                return Ok(body);
            }
            Err(e) if e.is_transient() && n < MAX_ATTEMPTS => {
                let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                warn!(url, attempt = n, error = %e, "feed: transient fetch failure, retrying");
                tokio::time::sleep(base * n + jitter).await;
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
