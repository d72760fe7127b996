//! RSS/Atom document parsing.
//!
//! Wraps feed-rs and flattens its model into [`ParsedEntry`] records with
//! the fields the rest of the engine consumes. Both RSS 2.0 and Atom 1.0
//! shapes are accepted; feed-rs handles the RFC 822 / RFC 3339 date
//! parsing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use sha2::{Digest, Sha256};

/// One normalized feed entry.
///
/// `guid` is always present; derivation order is the upstream id, then the
/// entry link, then a SHA-256 digest over `title|published`.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

/// Feed-level metadata seen in the document.
#[derive(Debug, Clone, Default)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,
}

/// A fully parsed feed document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub meta: FeedMeta,
    pub entries: Vec<ParsedEntry>,
}

/// Parses a feed document into normalized entries.
///
/// # Errors
///
/// Fails when the bytes are not a well-formed RSS or Atom document. A
/// well-formed document with zero items parses successfully into an empty
/// entry list.
pub fn parse_feed(bytes: &[u8], feed_url: &str) -> Result<ParsedFeed> {
    let feed = parser::parse(bytes)?;

    let meta = FeedMeta {
        title: feed.title.map(|t| t.content),
        description: feed.description.map(|t| t.content),
        site_url: feed.links.first().map(|l| l.href.clone()),
    };

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| normalize_entry(entry, feed_url))
        .collect();

    Ok(ParsedFeed { meta, entries })
}

fn normalize_entry(entry: Entry, feed_url: &str) -> ParsedEntry {
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_else(|| feed_url.to_string());

    // Prefer the explicit publication date, fall back to the update date
    let published_at = entry.published.or(entry.updated);

    let image_url = extract_image(&entry);

    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Untitled".to_string());

    let summary = entry.summary.map(|s| s.content);
    let author = entry.authors.first().map(|p| p.name.clone());
    let content = entry.content.and_then(|c| c.body);

    let existing_id = if entry.id.trim().is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let guid = derive_guid(existing_id, Some(&link), &title, published_at);

    ParsedEntry {
        guid,
        title,
        link,
        summary,
        content,
        author,
        published_at,
        image_url,
    }
}

/// Derives a stable entry identifier.
///
/// Order: upstream id → entry link → SHA-256 of `title|published`. The
/// hash keeps derived GUIDs bounded regardless of title length.
fn derive_guid(
    existing: Option<&str>,
    link: Option<&str>,
    title: &str,
    published_at: Option<DateTime<Utc>>,
) -> String {
    if let Some(id) = existing {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if let Some(link) = link {
        let trimmed = link.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}",
        title,
        published_at
            .map(|p| p.timestamp().to_string())
            .unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

/// Picks the best image candidate for an entry.
///
/// Order: `media:content` with an image type, first `media:thumbnail`,
/// an enclosure carrying an image MIME, any entry link with an image MIME.
fn extract_image(entry: &Entry) -> Option<String> {
    for media in &entry.media {
        for content in &media.content {
            let is_image = content
                .content_type
                .as_ref()
                .map(|m| m.ty() == "image")
                .unwrap_or(false);
            if is_image {
                if let Some(url) = &content.url {
                    return Some(url.to_string());
                }
            }
        }
    }

    for media in &entry.media {
        if let Some(thumbnail) = media.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
    }

    // RSS enclosures surface as the content source link in feed-rs
    if let Some(content) = &entry.content {
        if let Some(src) = &content.src {
            let is_image = src
                .media_type
                .as_deref()
                .map(|m| m.starts_with("image/"))
                .unwrap_or_else(|| content.content_type.ty() == "image");
            if is_image {
                return Some(src.href.clone());
            }
        }
    }

    entry
        .links
        .iter()
        .find(|l| {
            l.media_type
                .as_deref()
                .map(|m| m.starts_with("image/"))
                .unwrap_or(false)
        })
        .map(|l| l.href.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example News</title>
    <description>All the news</description>
    <link>https://example.org</link>
    <item>
      <guid>item-1</guid>
      <title>First article</title>
      <link>https://example.org/1</link>
      <description>Summary one</description>
      <author>alice@example.org (Alice)</author>
      <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
      <media:thumbnail url="https://example.org/thumb1.jpg"/>
    </item>
    <item>
      <title>No guid article</title>
      <link>https://example.org/2</link>
      <pubDate>Tue, 07 Jan 2025 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://atom.example.org"/>
  <updated>2025-01-06T10:00:00Z</updated>
  <entry>
    <id>urn:uuid:1</id>
    <title>Atom entry</title>
    <link href="https://atom.example.org/1"/>
    <updated>2025-01-06T10:00:00Z</updated>
    <summary>Atom summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_metadata_and_entries() {
        let parsed = parse_feed(RSS_SAMPLE.as_bytes(), "https://example.org/rss").unwrap();
        assert_eq!(parsed.meta.title.as_deref(), Some("Example News"));
        assert_eq!(parsed.meta.description.as_deref(), Some("All the news"));
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.guid, "item-1");
        assert_eq!(first.title, "First article");
        assert_eq!(first.link, "https://example.org/1");
        assert_eq!(first.summary.as_deref(), Some("Summary one"));
        assert!(first.published_at.is_some());
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://example.org/thumb1.jpg")
        );
    }

    #[test]
    fn test_parse_atom() {
        let parsed = parse_feed(ATOM_SAMPLE.as_bytes(), "https://atom.example.org/feed").unwrap();
        assert_eq!(parsed.meta.title.as_deref(), Some("Atom Example"));
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].guid, "urn:uuid:1");
        assert_eq!(parsed.entries[0].summary.as_deref(), Some("Atom summary"));
    }

    #[test]
    fn test_parse_invalid_document_fails() {
        assert!(parse_feed(b"<not a feed", "https://example.org/rss").is_err());
    }

    #[test]
    fn test_parse_empty_channel_yields_no_entries() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let parsed = parse_feed(empty.as_bytes(), "https://example.org/rss").unwrap();
        assert!(parsed.entries.is_empty());
    }

    #[test]
    fn test_guid_falls_back_to_link() {
        assert_eq!(
            derive_guid(None, Some("https://example.org/x"), "Title", None),
            "https://example.org/x"
        );
        assert_eq!(
            derive_guid(Some("  "), Some("https://example.org/x"), "Title", None),
            "https://example.org/x"
        );
    }

    #[test]
    fn test_guid_hash_fallback_is_stable() {
        let a = derive_guid(None, None, "Title", None);
        let b = derive_guid(None, None, "Title", None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // sha256 hex

        let c = derive_guid(None, None, "Other title", None);
        assert_ne!(a, c);
    }

    #[test]
    fn test_entry_without_link_uses_feed_url() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
  <item><guid>g</guid><title>Linkless</title></item>
</channel></rss>"#;
        let parsed = parse_feed(rss.as_bytes(), "https://example.org/rss").unwrap();
        assert_eq!(parsed.entries[0].link, "https://example.org/rss");
    }
}
