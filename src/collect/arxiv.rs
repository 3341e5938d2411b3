// src/collect/arxiv.rs
//! arXiv paper collector: one Atom query OR-ing the configured subject
//! categories, newest submissions first.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::collect::types::{CollectedItem, PaperEntry, SourceCollector};
use crate::config::ArxivConfig;
use crate::http::HttpClient;
use crate::util::collapse_whitespace;

const API_URL: &str = "http://export.arxiv.org/api/query";
const FETCH_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
    #[serde(rename = "category", default)]
    categories: Vec<Category>,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "@term")]
    term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@title")]
    title: Option<String>,
}

pub struct ArxivCollector {
    config: ArxivConfig,
    mode: Mode,
}

enum Mode {
    Http(HttpClient),
    Fixture(String),
}

impl ArxivCollector {
    pub fn new(config: ArxivConfig, http: HttpClient) -> Self {
        Self {
            config,
            mode: Mode::Http(http),
        }
    }

    pub fn from_fixture(config: ArxivConfig, xml: &str) -> Self {
        Self {
            config,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_feed(xml: &str) -> Result<Vec<CollectedItem>> {
        let t0 = std::time::Instant::now();
        let feed: Feed = from_str(xml).context("parsing arxiv atom feed")?;

        let mut out = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            match parse_entry(entry) {
                Some(paper) => out.push(CollectedItem::Paper(paper)),
                None => {
                    counter!("collect_entries_skipped_total").increment(1);
                    tracing::debug!(source = "arXiv", "skipping malformed feed entry");
                }
            }
        }

        histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

/// Entry-level parse. Missing optional fields (authors, categories) are
/// tolerated; an entry with no extractable arXiv ID or title is dropped.
fn parse_entry(entry: Entry) -> Option<PaperEntry> {
    let entry_id = entry.id.unwrap_or_default();
    let arxiv_id = bare_arxiv_id(&entry_id)?;
    let title = entry.title.as_deref().map(collapse_whitespace)?;
    if title.is_empty() {
        return None;
    }

    let authors: Vec<String> = entry
        .authors
        .into_iter()
        .filter_map(|a| a.name)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    let categories: Vec<String> = entry
        .categories
        .into_iter()
        .filter_map(|c| c.term)
        .collect();

    // Prefer the PDF link; fall back to the abstract page.
    let url = entry
        .links
        .iter()
        .find(|l| l.title.as_deref() == Some("pdf"))
        .and_then(|l| l.href.clone())
        .unwrap_or(entry_id);

    let published = entry
        .published
        .as_deref()
        .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(PaperEntry {
        arxiv_id,
        title,
        authors,
        abstract_text: entry
            .summary
            .as_deref()
            .map(collapse_whitespace)
            .unwrap_or_default(),
        url,
        published,
        categories,
    })
}

/// `http://arxiv.org/abs/2401.12345v2` -> `2401.12345`.
fn bare_arxiv_id(entry_id: &str) -> Option<String> {
    let last = entry_id.rsplit('/').next()?;
    let bare = last.split('v').next().unwrap_or(last);
    if bare.is_empty() {
        None
    } else {
        Some(bare.to_string())
    }
}

#[async_trait]
impl SourceCollector for ArxivCollector {
    fn id(&self) -> &'static str {
        "arxiv"
    }

    fn name(&self) -> &'static str {
        "arXiv"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>> {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_feed(xml),
            Mode::Http(http) => {
                let query: String = self
                    .config
                    .categories
                    .iter()
                    .map(|cat| format!("cat:{cat}"))
                    .collect::<Vec<_>>()
                    .join(" OR ");

                let params = [
                    ("search_query", query),
                    ("start", "0".to_string()),
                    ("max_results", self.config.max_results.to_string()),
                    ("sortBy", "submittedDate".to_string()),
                    ("sortOrder", "descending".to_string()),
                ];
                let body = http
                    .get_text(API_URL, &params, Some(FETCH_TIMEOUT))
                    .await
                    .context("fetching arxiv feed")?;
                Self::parse_feed(&body)
            }
        }
    }
}
