// Per-item validation applied before anything is written.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use sentineliq_common::{normalize_url, strip_html, truncate_chars, NewArticle};
use uuid::Uuid;

use crate::parser::RawItem;

/// Thresholds for accepting a feed item.
#[derive(Debug, Clone)]
pub struct ItemPolicy {
    pub min_title_chars: usize,
    pub max_title_chars: usize,
    pub max_description_chars: usize,
    /// Items published longer ago than this are skipped. Undated items pass.
    pub max_age: Duration,
    /// Tolerated clock skew for publication dates in the future.
    pub max_future_skew: Duration,
}

impl Default for ItemPolicy {
    fn default() -> Self {
        Self {
            min_title_chars: 10,
            max_title_chars: 500,
            max_description_chars: 1000,
            max_age: Duration::days(7),
            max_future_skew: Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemRejection {
    MissingUrl,
    InvalidUrl,
    MissingTitle,
    TitleTooShort,
    TitleTooLong,
    TooOld,
    FutureDated,
}

impl ItemRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemRejection::MissingUrl => "missing_url",
            ItemRejection::InvalidUrl => "invalid_url",
            ItemRejection::MissingTitle => "missing_title",
            ItemRejection::TitleTooShort => "title_too_short",
            ItemRejection::TitleTooLong => "title_too_long",
            ItemRejection::TooOld => "too_old",
            ItemRejection::FutureDated => "future_dated",
        }
    }
}

impl fmt::Display for ItemRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn a raw feed item into an insertable article, or say why not.
///
/// The URL is normalized, title and description are stripped of markup and
/// the description is truncated.
pub fn validate_item(
    item: &RawItem,
    feed_id: Uuid,
    policy: &ItemPolicy,
    now: DateTime<Utc>,
) -> std::result::Result<NewArticle, ItemRejection> {
    let raw_url = item
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ItemRejection::MissingUrl)?;
    let url = normalize_url(raw_url).map_err(|_| ItemRejection::InvalidUrl)?;

    let title = item
        .title
        .as_deref()
        .map(strip_html)
        .filter(|t| !t.is_empty())
        .ok_or(ItemRejection::MissingTitle)?;
    let title_len = title.chars().count();
    if title_len < policy.min_title_chars {
        return Err(ItemRejection::TitleTooShort);
    }
    if title_len > policy.max_title_chars {
        return Err(ItemRejection::TitleTooLong);
    }

    if let Some(published) = item.published_at {
        // Unrepresentable bounds mean no bound on that side.
        let latest = now.checked_add_signed(policy.max_future_skew);
        if latest.is_some_and(|latest| published > latest) {
            return Err(ItemRejection::FutureDated);
        }
        let earliest = now.checked_sub_signed(policy.max_age);
        if earliest.is_some_and(|earliest| published < earliest) {
            return Err(ItemRejection::TooOld);
        }
    }

    let description = item
        .description
        .as_deref()
        .map(strip_html)
        .filter(|d| !d.is_empty())
        .map(|d| truncate_chars(&d, policy.max_description_chars));

    Ok(NewArticle {
        feed_id,
        url,
        title,
        description,
        published_at: item.published_at,
    })
}
