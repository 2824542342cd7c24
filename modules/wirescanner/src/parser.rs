// RSS 0.9x/1.0/2.0, Atom and JSON Feed parsing via feed-rs.

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;

use crate::error::{Result, ScanError};

/// A feed reduced to the fields ingestion needs.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<RawItem>,
}

/// One feed entry before validation. Text fields may still contain markup.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| ScanError::Parse(e.to_string()))?;

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content.trim().to_string()).filter(|t| !t.is_empty()),
        items: feed.entries.into_iter().map(raw_item).collect(),
    })
}

fn raw_item(entry: Entry) -> RawItem {
    let url = entry_url(&entry);
    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));

    RawItem {
        url,
        title: entry.title.map(|t| t.content),
        description,
        published_at: entry.published.or(entry.updated),
    }
}

/// Prefer an `alternate` (or untyped) link, then any link, then an http id.
fn entry_url(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>City Desk</title>
    <link>https://citydesk.example.com</link>
    <item>
      <title>Council approves new transit plan</title>
      <link>https://citydesk.example.com/transit-plan</link>
      <description>&lt;p&gt;The plan adds &lt;b&gt;three&lt;/b&gt; routes.&lt;/p&gt;</description>
      <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Item without a link</title>
      <guid isPermaLink="false">urn:citydesk:42</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Harbor Watch</title>
  <id>urn:harbor</id>
  <updated>2025-02-01T12:00:00Z</updated>
  <entry>
    <title>Port expansion hearing scheduled</title>
    <id>https://harbor.example.org/hearing</id>
    <link rel="related" href="https://other.example.org/context"/>
    <link rel="alternate" href="https://harbor.example.org/hearing"/>
    <updated>2025-02-01T12:00:00Z</updated>
    <summary>Residents can comment through March.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("City Desk"));
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.url.as_deref(), Some("https://citydesk.example.com/transit-plan"));
        assert_eq!(first.title.as_deref(), Some("Council approves new transit plan"));
        assert!(first.description.as_deref().unwrap().contains("three"));
        assert_eq!(
            first.published_at.unwrap().format("%Y-%m-%d").to_string(),
            "2025-01-06"
        );

        assert_eq!(feed.items[1].url, None);
    }

    #[test]
    fn atom_prefers_alternate_link_and_falls_back_to_updated() {
        let feed = parse_feed(ATOM.as_bytes()).unwrap();
        let item = &feed.items[0];
        assert_eq!(item.url.as_deref(), Some("https://harbor.example.org/hearing"));
        assert_eq!(item.description.as_deref(), Some("Residents can comment through March."));
        assert!(item.published_at.is_some());
    }

    #[test]
    fn html_is_not_a_feed() {
        let err = parse_feed(b"<html><body>Not a feed</body></html>").unwrap_err();
        assert!(matches!(err, ScanError::Parse(_)));
    }
}
