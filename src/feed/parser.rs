use feed_rs::model::{Link, Text};
use feed_rs::parser;
use thiserror::Error;

use crate::util::decode_entities;

/// The document could not be read as RSS, Atom or JSON Feed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed feed document: {0}")]
    Malformed(String),
}

/// Normalized feed header plus items, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    /// Unix millis; `None` when the item carries no date
    pub published_at: Option<i64>,
}

/// Parse a raw RSS/Atom/JSON Feed document.
///
/// Free-text fields (titles, descriptions) have HTML entities decoded after
/// the XML layer, since feeds commonly escape them twice. Missing optional
/// fields come back as `None`; an item without a title gets an empty one and
/// is kept.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] when the bytes are not a feed at all.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed = parser::parse(bytes).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| ParsedItem {
            title: entry.title.map(clean_text).unwrap_or_default(),
            link: item_link(&entry.links),
            description: entry
                .summary
                .map(clean_text)
                .filter(|d| !d.is_empty())
                .or_else(|| {
                    entry
                        .content
                        .and_then(|c| c.body)
                        .map(|b| decode_entities(b.trim()).into_owned())
                        .filter(|d| !d.is_empty())
                }),
            published_at: entry
                .published
                .or(entry.updated)
                .map(|dt| dt.timestamp_millis()),
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(clean_text).unwrap_or_default(),
        link: feed.links.first().map(|l| l.href.clone()),
        description: feed.description.map(clean_text).filter(|d| !d.is_empty()),
        items,
    })
}

/// The entry's canonical link: `rel="alternate"` (or no `rel`, which Atom
/// treats as alternate), else the first link. Atom entries often list
/// `replies`/`edit`/`self` links before the alternate one.
fn item_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}

fn clean_text(text: Text) -> String {
    decode_entities(text.content.trim()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
  <title>Boot.dev &amp;amp; Friends</title>
  <link>https://blog.boot.dev/</link>
  <description>Learn &lt;b&gt;backend&lt;/b&gt;</description>
  <item>
    <title>It&amp;#39;s a &amp;quot;test&amp;quot;</title>
    <link>https://blog.boot.dev/first/</link>
    <description>First &amp;amp; foremost</description>
    <pubDate>Mon, 02 Jan 2006 15:04:05 +0000</pubDate>
  </item>
  <item>
    <title>Undated</title>
    <link>https://blog.boot.dev/second/</link>
    <description>No date here</description>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_rss_header() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title, "Boot.dev & Friends");
        assert_eq!(feed.link.as_deref(), Some("https://blog.boot.dev/"));
        assert_eq!(feed.description.as_deref(), Some("Learn <b>backend</b>"));
        assert_eq!(feed.items.len(), 2);
    }

    #[test]
    fn test_parse_decodes_entities_in_items() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        let first = &feed.items[0];
        assert_eq!(first.title, "It's a \"test\"");
        assert_eq!(first.description.as_deref(), Some("First & foremost"));
        assert_eq!(first.link.as_deref(), Some("https://blog.boot.dev/first/"));
        assert_eq!(first.published_at, Some(1_136_214_245_000));
    }

    #[test]
    fn test_missing_pub_date_keeps_item() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        let undated = &feed.items[1];
        assert_eq!(undated.title, "Undated");
        assert_eq!(undated.published_at, None);
        assert_eq!(undated.link.as_deref(), Some("https://blog.boot.dev/second/"));
    }

    #[test]
    fn test_item_without_title_or_link() {
        let xml = r#"<rss version="2.0"><channel><title>T</title>
            <item><description>Only a body</description></item>
        </channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "");
        assert_eq!(feed.items[0].link, None);
        assert_eq!(feed.items[0].description.as_deref(), Some("Only a body"));
    }

    #[test]
    fn test_parse_atom() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom &amp;amp; Co</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Entry one</title>
    <link href="https://atom.example.com/one"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <published>2024-01-02T03:04:05Z</published>
    <updated>2024-01-03T00:00:00Z</updated>
    <summary>Short</summary>
  </entry>
</feed>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "Atom & Co");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].link.as_deref(), Some("https://atom.example.com/one"));
        assert_eq!(feed.items[0].published_at, Some(1_704_164_645_000));
    }

    #[test]
    fn test_atom_entry_prefers_alternate_link() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Blog</title>
  <id>tag:blog.example.com,2024:blog-1</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Post</title>
    <id>tag:blog.example.com,2024:post-2</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <link rel="replies" type="application/atom+xml" href="https://blog.example.com/feeds/1/comments/default"/>
    <link rel="edit" type="application/atom+xml" href="https://www.blogger.example.com/feeds/1/posts/default/2"/>
    <link rel="alternate" type="text/html" href="https://blog.example.com/2024/01/post.html"/>
  </entry>
  <entry>
    <title>Only self</title>
    <id>tag:blog.example.com,2024:post-3</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <link rel="self" href="https://blog.example.com/feeds/posts/3"/>
  </entry>
</feed>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(
            feed.items[0].link.as_deref(),
            Some("https://blog.example.com/2024/01/post.html")
        );
        // No alternate at all: first link is still better than none
        assert_eq!(
            feed.items[1].link.as_deref(),
            Some("https://blog.example.com/feeds/posts/3")
        );
    }

    #[test]
    fn test_empty_description_falls_back_to_content() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel><title>T</title>
  <item>
    <title>Item</title>
    <link>https://example.com/item</link>
    <description></description>
    <content:encoded><![CDATA[Body]]></content:encoded>
  </item>
</channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.items[0].description.as_deref(), Some("Body"));
    }

    #[test]
    fn test_empty_channel() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        assert!(matches!(
            parse_feed(b"<not valid xml"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_html_page_is_parse_error() {
        let html = b"<html><head><title>Not a feed</title></head><body>hi</body></html>";
        assert!(parse_feed(html).is_err());
    }
}
