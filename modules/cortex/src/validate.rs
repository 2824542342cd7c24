use std::fmt;

use sentineliq_common::is_valid_http_url;

use crate::extract::ExtractedArticle;

/// Phrases that mark an interstitial, paywall or bot wall rather than an article.
const BLOCK_MARKERS: &[&str] = &[
    "enable javascript",
    "javascript is disabled",
    "subscribe to continue",
    "subscribe to read",
    "access denied",
    "are you a robot",
    "verify you are human",
    "checking your browser",
];

#[derive(Debug, Clone)]
pub struct ContentPolicy {
    pub min_body_chars: usize,
    pub min_words: usize,
    /// Bodies shorter than this are scanned for block markers.
    pub block_scan_chars: usize,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            min_body_chars: 200,
            min_words: 50,
            block_scan_chars: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentRejection {
    InvalidUrl,
    Blocked,
    MissingTitle,
    TooShort,
    TooFewWords,
}

impl ContentRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentRejection::InvalidUrl => "invalid_url",
            ContentRejection::Blocked => "blocked",
            ContentRejection::MissingTitle => "missing_title",
            ContentRejection::TooShort => "too_short",
            ContentRejection::TooFewWords => "too_few_words",
        }
    }
}

impl fmt::Display for ContentRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether an extracted page is an article worth keeping.
pub fn validate_content(
    page_url: &str,
    article: &ExtractedArticle,
    policy: &ContentPolicy,
) -> Result<(), ContentRejection> {
    if !is_valid_http_url(page_url) {
        return Err(ContentRejection::InvalidUrl);
    }
    if let Some(canonical) = &article.canonical_url {
        if !is_valid_http_url(canonical) {
            return Err(ContentRejection::InvalidUrl);
        }
    }

    let body = article.body.trim();
    let body_chars = body.chars().count();
    if body_chars < policy.block_scan_chars {
        let lower = body.to_lowercase();
        if BLOCK_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Err(ContentRejection::Blocked);
        }
    }

    if article
        .title
        .as_deref()
        .map_or(true, |t| t.trim().is_empty())
    {
        return Err(ContentRejection::MissingTitle);
    }
    if body_chars < policy.min_body_chars {
        return Err(ContentRejection::TooShort);
    }
    if article.word_count < policy.min_words {
        return Err(ContentRejection::TooFewWords);
    }

    Ok(())
}
