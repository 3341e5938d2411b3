// src/collect/blogs.rs
//! Blog collector: iterates configured feed URLs, detects the feed dialect
//! (RSS 2.0, Atom, or RSS 1.0/RDF) from the root element, and normalizes
//! entries. Optionally fetches the full article body with a best-effort
//! container extraction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::collect::types::{BlogPost, CollectedItem, SourceCollector};
use crate::config::{BlogsConfig, FeedConfig};
use crate::http::HttpClient;
use crate::util::{strip_html, truncate_text};

const FULL_ARTICLE_MAX_CHARS: usize = 5_000;

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    // quick-xml's serde deserializer exposes namespaced elements by their
    // local name only, so `<content:encoded>` arrives as `encoded`.
    #[serde(rename = "encoded")]
    content_encoded: Option<String>,
    #[serde(rename = "date")]
    dc_date: Option<String>,
}

// ---- Atom ----

/// Atom elements routinely carry attributes (`type="html"`), so text
/// content is captured explicitly.
#[derive(Debug, Default, Deserialize)]
struct TextValue {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextValue>,
    summary: Option<TextValue>,
    content: Option<TextValue>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
}

// ---- RSS 1.0 (RDF) ----

#[derive(Debug, Deserialize)]
struct RdfFeed {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedDialect {
    Rss2,
    Atom,
    Rdf,
}

pub struct BlogCollector {
    config: BlogsConfig,
    mode: Mode,
}

enum Mode {
    Http(HttpClient),
    /// (feed name, raw XML) pairs for tests.
    Fixture(Vec<(String, String)>),
}

impl BlogCollector {
    pub fn new(config: BlogsConfig, http: HttpClient) -> Self {
        Self {
            config,
            mode: Mode::Http(http),
        }
    }

    pub fn from_fixture(config: BlogsConfig, feeds: Vec<(&str, &str)>) -> Self {
        Self {
            config,
            mode: Mode::Fixture(
                feeds
                    .into_iter()
                    .map(|(n, x)| (n.to_string(), x.to_string()))
                    .collect(),
            ),
        }
    }

    /// Parse one feed document into posts, regardless of dialect.
    fn parse_feed(feed_name: &str, xml: &str) -> Result<Vec<CollectedItem>> {
        let t0 = std::time::Instant::now();
        let dialect = detect_dialect(xml)
            .with_context(|| format!("unrecognized feed format for {feed_name}"))?;

        let posts = match dialect {
            FeedDialect::Rss2 => {
                let rss: Rss = from_str(xml).context("parsing rss 2.0 feed")?;
                rss.channel
                    .items
                    .into_iter()
                    .filter_map(|it| rss_item_to_post(feed_name, it))
                    .collect()
            }
            FeedDialect::Rdf => {
                let rdf: RdfFeed = from_str(xml).context("parsing rss 1.0 feed")?;
                rdf.items
                    .into_iter()
                    .filter_map(|it| rss_item_to_post(feed_name, it))
                    .collect()
            }
            FeedDialect::Atom => {
                let feed: AtomFeed = from_str(xml).context("parsing atom feed")?;
                feed.entries
                    .into_iter()
                    .filter_map(|e| atom_entry_to_post(feed_name, e))
                    .collect::<Vec<_>>()
            }
        };

        histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(posts)
    }
}

fn detect_dialect(xml: &str) -> Option<FeedDialect> {
    static RE_ROOT: OnceCell<Regex> = OnceCell::new();
    let re = RE_ROOT.get_or_init(|| Regex::new(r"<([A-Za-z][\w:.-]*)").unwrap());
    // First element that is not a declaration/comment/doctype.
    for cap in re.captures_iter(xml) {
        let name = &cap[1];
        return match name {
            "rss" => Some(FeedDialect::Rss2),
            "feed" => Some(FeedDialect::Atom),
            "rdf:RDF" | "RDF" => Some(FeedDialect::Rdf),
            _ => None,
        };
    }
    None
}

fn rss_item_to_post(feed_name: &str, item: RssItem) -> Option<CollectedItem> {
    let title = item.title.as_deref().map(str::trim).unwrap_or("");
    let url = item.link.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() || url.is_empty() {
        counter!("collect_entries_skipped_total").increment(1);
        tracing::debug!(feed = feed_name, "skipping feed entry without title/url");
        return None;
    }

    let description = truncate_text(&strip_html(item.description.as_deref().unwrap_or("")), 300);
    let published = item
        .pub_date
        .as_deref()
        .and_then(parse_rfc2822)
        .or_else(|| {
            item.dc_date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|dt| dt.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now);
    let thumbnail = item
        .content_encoded
        .as_deref()
        .and_then(first_image_src);

    Some(CollectedItem::Blog(BlogPost {
        title: title.to_string(),
        description,
        url: url.to_string(),
        source: feed_name.to_string(),
        published,
        thumbnail,
        full_text: None,
    }))
}

fn atom_entry_to_post(feed_name: &str, entry: AtomEntry) -> Option<CollectedItem> {
    let title = entry
        .title
        .map(|t| t.value.trim().to_string())
        .unwrap_or_default();
    let url = entry
        .links
        .iter()
        .find_map(|l| l.href.clone())
        .unwrap_or_default();
    if title.is_empty() || url.is_empty() {
        counter!("collect_entries_skipped_total").increment(1);
        tracing::debug!(feed = feed_name, "skipping feed entry without title/url");
        return None;
    }

    let body = entry
        .summary
        .as_ref()
        .map(|t| t.value.as_str())
        .filter(|s| !s.is_empty())
        .or_else(|| entry.content.as_ref().map(|t| t.value.as_str()))
        .unwrap_or("");
    let description = truncate_text(&strip_html(body), 300);
    let published = entry
        .published
        .as_deref()
        .or(entry.updated.as_deref())
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let thumbnail = entry
        .content
        .as_ref()
        .and_then(|t| first_image_src(&t.value));

    Some(CollectedItem::Blog(BlogPost {
        title,
        description,
        url,
        source: feed_name.to_string(),
        published,
        thumbnail,
        full_text: None,
    }))
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

fn first_image_src(html: &str) -> Option<String> {
    static RE_IMG: OnceCell<Regex> = OnceCell::new();
    let re = RE_IMG.get_or_init(|| Regex::new(r#"(?is)<img[^>]+src="([^"]+)""#).unwrap());
    re.captures(html).map(|c| c[1].to_string())
}

/// Best-effort full-article fetch: any failure returns `None` and the item
/// keeps its feed description.
pub(crate) async fn fetch_full_article(http: &HttpClient, url: &str) -> Option<String> {
    match http.get_text(url, &[], None).await {
        Ok(html) => {
            let text = extract_article_text(&html);
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "could not fetch full article");
            None
        }
    }
}

/// Pull readable text out of a page: drop chrome elements, then try common
/// article containers in priority order, then fall back to the whole page.
/// Output is whitespace-normalized and bounded.
pub(crate) fn extract_article_text(html: &str) -> String {
    static RE_CHROME: OnceCell<Vec<Regex>> = OnceCell::new();
    let chrome = RE_CHROME.get_or_init(|| {
        ["script", "style", "nav", "footer", "header", "aside"]
            .iter()
            .map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>")).unwrap())
            .collect()
    });
    let mut page = html.to_string();
    for re in chrome {
        page = re.replace_all(&page, " ").to_string();
    }

    static RE_CONTAINERS: OnceCell<Vec<Regex>> = OnceCell::new();
    let containers = RE_CONTAINERS.get_or_init(|| {
        vec![
            Regex::new(r"(?is)<article[^>]*>(.*?)</article>").unwrap(),
            Regex::new(r#"(?is)<[a-z]+[^>]*class="[^"]*post-content[^"]*"[^>]*>(.*?)</(?:div|section)>"#).unwrap(),
            Regex::new(r#"(?is)<[a-z]+[^>]*class="[^"]*entry-content[^"]*"[^>]*>(.*?)</(?:div|section)>"#).unwrap(),
            Regex::new(r#"(?is)<[a-z]+[^>]*class="[^"]*article-body[^"]*"[^>]*>(.*?)</(?:div|section)>"#).unwrap(),
            Regex::new(r#"(?is)<[a-z]+[^>]*class="[^"]*content[^"]*"[^>]*>(.*?)</(?:div|section)>"#).unwrap(),
            Regex::new(r"(?is)<main[^>]*>(.*?)</main>").unwrap(),
        ]
    });

    let mut content = String::new();
    for re in containers {
        if let Some(cap) = re.captures(&page) {
            content = cap[1].to_string();
            break;
        }
    }
    if content.is_empty() {
        content = page;
    }

    truncate_text(&strip_html(&content), FULL_ARTICLE_MAX_CHARS)
}

#[async_trait]
impl SourceCollector for BlogCollector {
    fn id(&self) -> &'static str {
        "blogs"
    }

    fn name(&self) -> &'static str {
        "Blogs"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>> {
        let feeds: &[FeedConfig] = &self.config.feeds;
        if feeds.is_empty() {
            return Ok(Vec::new());
        }
        let per_feed = (self.config.max_results / feeds.len()).max(1);

        let mut out = Vec::new();
        match &self.mode {
            Mode::Fixture(fixtures) => {
                for (name, xml) in fixtures {
                    match Self::parse_feed(name, xml) {
                        Ok(mut posts) => {
                            posts.truncate(per_feed);
                            out.append(&mut posts);
                        }
                        Err(e) => {
                            tracing::warn!(feed = %name, error = ?e, "feed parse failed");
                            counter!("collect_source_errors_total").increment(1);
                        }
                    }
                }
            }
            Mode::Http(http) => {
                for feed in feeds {
                    // One bad feed must not abort the rest.
                    let body = match http.get_text(&feed.url, &[], None).await {
                        Ok(b) => b,
                        Err(e) => {
                            tracing::warn!(feed = %feed.name, error = %e, "feed fetch failed");
                            counter!("collect_source_errors_total").increment(1);
                            continue;
                        }
                    };
                    let mut posts = match Self::parse_feed(&feed.name, &body) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(feed = %feed.name, error = ?e, "feed parse failed");
                            counter!("collect_source_errors_total").increment(1);
                            continue;
                        }
                    };
                    posts.truncate(per_feed);

                    if self.config.fetch_full_articles {
                        for post in posts.iter_mut() {
                            if let CollectedItem::Blog(b) = post {
                                b.full_text = fetch_full_article(http, &b.url).await;
                            }
                        }
                    }
                    out.append(&mut posts);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS2: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Lab Blog</title>
    <item>
      <title>Scaling results</title>
      <link>https://lab.example/posts/scaling</link>
      <description>&lt;p&gt;We scaled &lt;b&gt;some things&lt;/b&gt;&lt;/p&gt;</description>
      <pubDate>Tue, 05 Mar 2024 10:00:00 GMT</pubDate>
      <content:encoded>&lt;img src="https://lab.example/hero.png"/&gt;&lt;p&gt;Body&lt;/p&gt;</content:encoded>
    </item>
    <item>
      <title></title>
      <link>https://lab.example/broken</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Research Feed</title>
  <entry>
    <title type="html">Alignment notes</title>
    <link href="https://research.example/alignment"/>
    <summary type="html">&lt;p&gt;Notes on alignment.&lt;/p&gt;</summary>
    <published>2024-03-04T08:30:00Z</published>
  </entry>
</feed>"#;

    const RDF: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://old.example/"><title>Old Feed</title></channel>
  <item rdf:about="https://old.example/post">
    <title>Legacy post</title>
    <link>https://old.example/post</link>
    <description>Still running RSS 1.0</description>
    <dc:date>2024-02-01T00:00:00Z</dc:date>
  </item>
</rdf:RDF>"#;

    #[test]
    fn detects_all_three_dialects() {
        assert_eq!(detect_dialect(RSS2), Some(FeedDialect::Rss2));
        assert_eq!(detect_dialect(ATOM), Some(FeedDialect::Atom));
        assert_eq!(detect_dialect(RDF), Some(FeedDialect::Rdf));
        assert_eq!(detect_dialect("<html></html>"), None);
    }

    #[test]
    fn rss2_parses_and_skips_malformed_entry() {
        let posts = BlogCollector::parse_feed("Lab Blog", RSS2).unwrap();
        assert_eq!(posts.len(), 1);
        let CollectedItem::Blog(post) = &posts[0] else {
            panic!("expected blog");
        };
        assert_eq!(post.title, "Scaling results");
        assert_eq!(post.description, "We scaled some things");
        assert_eq!(post.thumbnail.as_deref(), Some("https://lab.example/hero.png"));
        assert_eq!(post.published.to_rfc3339(), "2024-03-05T10:00:00+00:00");
    }

    #[test]
    fn atom_parses_href_links_and_html_summaries() {
        let posts = BlogCollector::parse_feed("Research Feed", ATOM).unwrap();
        assert_eq!(posts.len(), 1);
        let CollectedItem::Blog(post) = &posts[0] else {
            panic!("expected blog");
        };
        assert_eq!(post.title, "Alignment notes");
        assert_eq!(post.url, "https://research.example/alignment");
        assert_eq!(post.description, "Notes on alignment.");
    }

    #[test]
    fn rdf_parses_with_dc_date() {
        let posts = BlogCollector::parse_feed("Old Feed", RDF).unwrap();
        assert_eq!(posts.len(), 1);
        let CollectedItem::Blog(post) = &posts[0] else {
            panic!("expected blog");
        };
        assert_eq!(post.title, "Legacy post");
        assert_eq!(post.published.to_rfc3339(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn article_extraction_prefers_article_container() {
        let html = r#"<html><head><style>.x{}</style></head><body>
            <nav>menu menu</nav>
            <article><p>The real body.</p></article>
            <footer>bye</footer>
        </body></html>"#;
        assert_eq!(extract_article_text(html), "The real body.");
    }

    #[test]
    fn article_extraction_falls_back_to_page_text() {
        let html = "<html><body><p>Just a page.</p></body></html>";
        assert_eq!(extract_article_text(html), "Just a page.");
    }
}
