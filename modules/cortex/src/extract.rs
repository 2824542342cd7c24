// Article extraction from rendered HTML: metadata via regex over the head,
// body via Readability.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sentineliq_common::{is_valid_http_url, strip_html, truncate_chars, word_count};

use crate::readability::readable_markdown;

const MAX_EXCERPT_CHARS: usize = 500;
/// Shortest `<title>` head kept after trimming a site-name suffix.
const MIN_TITLE_HEAD_CHARS: usize = 10;
const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " :: "];

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<title[^>]*>(.*?)</title>").expect("valid regex"));
static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<h1[^>]*>(.*?)</h1>").expect("valid regex"));
static ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<article[^>]*>(.*?)</article>").expect("valid regex"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<body[^>]*>(.*)</body>").expect("valid regex"));
static LINK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<link\b[^>]*>").expect("valid regex"));
static CANONICAL_REL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\brel\s*=\s*["']?canonical["']?"#).expect("valid regex")
});
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static JSON_LD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});
static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<meta\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("valid regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<time[^>]*datetime\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    /// Main content as markdown.
    pub body: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub canonical_url: Option<String>,
    pub word_count: usize,
}

/// Pull the article out of a rendered page.
pub fn extract_article(html: &str, page_url: &str) -> ExtractedArticle {
    let mut body = readable_markdown(html, page_url);
    if body.is_empty() {
        body = fallback_body(html);
    }
    let word_count = word_count(&body);

    ExtractedArticle {
        title: extract_title(html),
        excerpt: extract_excerpt(html),
        author: extract_author(html),
        published_at: extract_published_date(html),
        canonical_url: extract_canonical_url(html, page_url),
        body,
        word_count,
    }
}

/// Plain text of `<article>`, else `<body>`, else the whole document.
pub fn fallback_body(html: &str) -> String {
    let region = ARTICLE_RE
        .captures(html)
        .or_else(|| BODY_RE.captures(html))
        .and_then(|c| c.get(1))
        .map_or(html, |m| m.as_str());
    strip_html(region)
}

/// `og:title`, then `<title>` without its site-name suffix, then the first `<h1>`.
pub fn extract_title(html: &str) -> Option<String> {
    meta_content(html, "property", "og:title")
        .or_else(|| meta_content(html, "name", "twitter:title"))
        .and_then(|t| non_empty(strip_html(&t)))
        .or_else(|| {
            TITLE_RE
                .captures(html)
                .and_then(|c| non_empty(strip_html(&c[1])))
                .map(|t| trim_site_suffix(&t))
        })
        .or_else(|| H1_RE.captures(html).and_then(|c| non_empty(strip_html(&c[1]))))
}

/// "Council approves budget | Daily Herald" → "Council approves budget".
fn trim_site_suffix(title: &str) -> String {
    for sep in TITLE_SEPARATORS {
        if let Some(idx) = title.rfind(sep) {
            let head = title[..idx].trim();
            if head.chars().count() >= MIN_TITLE_HEAD_CHARS {
                return head.to_string();
            }
        }
    }
    title.to_string()
}

pub fn extract_excerpt(html: &str) -> Option<String> {
    meta_content(html, "name", "description")
        .or_else(|| meta_content(html, "property", "og:description"))
        .and_then(|d| non_empty(strip_html(&d)))
        .map(|d| truncate_chars(&d, MAX_EXCERPT_CHARS))
}

/// `meta name=author`, then JSON-LD `author` (string, object or array).
pub fn extract_author(html: &str) -> Option<String> {
    if let Some(author) = meta_content(html, "name", "author")
        .and_then(|a| non_empty(strip_html(&a)))
        .filter(|a| !a.starts_with("http"))
    {
        return Some(author);
    }

    json_ld_objects(html)
        .iter()
        .filter_map(|obj| obj.get("author"))
        .find_map(author_name)
}

fn author_name(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(name) => non_empty(name.trim().to_string()),
        serde_json::Value::Object(map) => map.get("name").and_then(author_name),
        serde_json::Value::Array(items) => items.iter().find_map(author_name),
        _ => None,
    }
}

/// `<link rel="canonical">`, resolved against the page URL. Only http(s) URLs are kept.
pub fn extract_canonical_url(html: &str, page_url: &str) -> Option<String> {
    let tag = LINK_TAG_RE
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| CANONICAL_REL_RE.is_match(tag))?;
    let caps = HREF_RE.captures(tag)?;
    let href = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();

    let resolved = url::Url::parse(page_url)
        .and_then(|base| base.join(href))
        .ok()?
        .to_string();
    is_valid_http_url(&resolved).then_some(resolved)
}

/// Extract a publication date from raw HTML metadata.
///
/// Priority order:
/// 1. JSON-LD `datePublished` / `dateModified`
/// 2. OpenGraph `article:published_time`
/// 3. Generic meta tags (`date`, `publish_date`, `pubdate`, `publish-date`, `DC.date.issued`)
/// 4. HTML5 `<time datetime="...">` element
pub fn extract_published_date(html: &str) -> Option<DateTime<Utc>> {
    let objects = json_ld_objects(html);
    for key in ["datePublished", "dateModified"] {
        if let Some(date) = objects
            .iter()
            .filter_map(|obj| obj.get(key).and_then(|v| v.as_str()))
            .find_map(parse_date)
        {
            return Some(date);
        }
    }

    if let Some(date) =
        meta_content(html, "property", "article:published_time").and_then(|d| parse_date(&d))
    {
        return Some(date);
    }

    for name in ["date", "publish_date", "pubdate", "publish-date", "DC.date.issued"] {
        if let Some(date) = meta_content(html, "name", name).and_then(|d| parse_date(&d)) {
            return Some(date);
        }
    }

    TIME_RE.captures(html).and_then(|c| parse_date(&c[1]))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    // Date only, or "June 15, 2025"
    ["%Y-%m-%d", "%B %d, %Y"]
        .iter()
        .find_map(|fmt| chrono::NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Every JSON-LD object on the page, with top-level arrays and `@graph`
/// members flattened.
fn json_ld_objects(html: &str) -> Vec<serde_json::Value> {
    let mut objects = Vec::new();
    for cap in JSON_LD_RE.captures_iter(html) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&cap[1]) else {
            continue;
        };
        let roots = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };
        for root in roots {
            if let Some(graph) = root.get("@graph").and_then(|g| g.as_array()) {
                objects.extend(graph.iter().cloned());
            }
            objects.push(root);
        }
    }
    objects
}

/// `content` of the first `<meta {attr}="{key}">` tag. Attribute order and
/// quoting style do not matter.
fn meta_content(html: &str, attr: &str, key: &str) -> Option<String> {
    META_TAG_RE.find_iter(html).find_map(|tag| {
        let mut matches_key = false;
        let mut content = None;
        for caps in ATTR_RE.captures_iter(tag.as_str()) {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            let name = &caps[1];
            if name.eq_ignore_ascii_case(attr) && value.trim().eq_ignore_ascii_case(key) {
                matches_key = true;
            } else if name.eq_ignore_ascii_case("content") {
                content = Some(value.trim().to_string());
            }
        }
        if matches_key {
            content
        } else {
            None
        }
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
