use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Feeds ---

/// A registered RSS/Atom/JSON feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub url: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub is_active: bool,
    pub fail_count: i32,
    pub last_error: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of recording a feed failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedHealth {
    /// Still active; carries the consecutive failure count.
    Degraded(i32),
    /// Failure budget exhausted; the feed was deactivated.
    Invalidated,
}

// --- Articles ---

/// An article discovered in a feed, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub feed_id: Uuid,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// An article claimed for scraping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingArticle {
    pub id: Uuid,
    pub feed_id: Option<Uuid>,
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Attempts including the current claim.
    pub attempts: i32,
}

/// Extracted full-text content of an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleContent {
    pub article_id: Uuid,
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub word_count: i32,
    pub content_hash: String,
}

/// Lifecycle of an article row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Pending,
    Scraped,
    Failed,
    Duplicate,
    Rejected,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Pending => "pending",
            ScrapeStatus::Scraped => "scraped",
            ScrapeStatus::Failed => "failed",
            ScrapeStatus::Duplicate => "duplicate",
            ScrapeStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScrapeStatus::Pending),
            "scraped" => Ok(ScrapeStatus::Scraped),
            "failed" => Ok(ScrapeStatus::Failed),
            "duplicate" => Ok(ScrapeStatus::Duplicate),
            "rejected" => Ok(ScrapeStatus::Rejected),
            other => Err(format!("unknown scrape status: {other}")),
        }
    }
}
