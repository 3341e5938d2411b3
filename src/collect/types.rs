// src/collect/types.rs
//! Per-source item shapes and the collector contract.
//!
//! Each upstream keeps its native shape until the orchestrator boundary,
//! where `into_record` converges every variant into one canonical
//! [`ContentItem`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Classification;
use crate::model::{ContentItem, SourceType};
use crate::util::content_id;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperEntry {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub url: String,
    pub published: DateTime<Utc>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: String,
    pub published: DateTime<Utc>,
    pub author: Option<String>,
    pub thumbnail: Option<String>,
    pub full_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoItem {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub channel: String,
    pub published: DateTime<Utc>,
    pub duration: Option<String>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlogPost {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: String,
    pub published: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub full_text: Option<String>,
}

/// Tagged union over the four source variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CollectedItem {
    Paper(PaperEntry),
    News(NewsArticle),
    Video(VideoItem),
    Blog(BlogPost),
}

impl CollectedItem {
    pub fn source_type(&self) -> SourceType {
        match self {
            CollectedItem::Paper(_) => SourceType::Paper,
            CollectedItem::News(_) => SourceType::News,
            CollectedItem::Video(_) => SourceType::Video,
            CollectedItem::Blog(_) => SourceType::Blog,
        }
    }

    /// Stable identifier. arXiv and YouTube carry a natural key; news and
    /// blog items hash their URL. Re-collection reproduces the same ID.
    pub fn id(&self) -> String {
        match self {
            CollectedItem::Paper(p) => format!("arxiv-{}", p.arxiv_id),
            CollectedItem::News(n) => content_id("news", &n.url),
            CollectedItem::Video(v) => format!("youtube-{}", v.video_id),
            CollectedItem::Blog(b) => content_id("blog", &b.url),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            CollectedItem::Paper(p) => &p.url,
            CollectedItem::News(n) => &n.url,
            CollectedItem::Video(v) => &v.url,
            CollectedItem::Blog(b) => &b.url,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            CollectedItem::Paper(p) => &p.title,
            CollectedItem::News(n) => &n.title,
            CollectedItem::Video(v) => &v.title,
            CollectedItem::Blog(b) => &b.title,
        }
    }

    /// Text fed to the classifier: the richest body available per variant.
    pub fn analyzable_text(&self) -> &str {
        fn first_nonempty<'a>(candidates: &[&'a str]) -> &'a str {
            candidates
                .iter()
                .copied()
                .find(|s| !s.is_empty())
                .unwrap_or("")
        }
        match self {
            CollectedItem::Paper(p) => first_nonempty(&[&p.abstract_text, &p.title]),
            CollectedItem::News(n) => first_nonempty(&[
                n.full_text.as_deref().unwrap_or(""),
                &n.description,
                &n.title,
            ]),
            CollectedItem::Video(v) => first_nonempty(&[&v.description, &v.title]),
            CollectedItem::Blog(b) => first_nonempty(&[
                b.full_text.as_deref().unwrap_or(""),
                &b.description,
                &b.title,
            ]),
        }
    }

    /// Converge into the canonical record. User-state fields start false;
    /// the store upsert keeps any previously stored values.
    pub fn into_record(self, classification: Classification, now: DateTime<Utc>) -> ContentItem {
        let raw_data = serde_json::to_value(&self).ok();
        let id = self.id();
        let source_type = self.source_type();
        let (title, url, source, description, authors, published, thumbnail, channel) = match self {
            CollectedItem::Paper(p) => (
                p.title,
                p.url,
                "arXiv".to_string(),
                p.abstract_text,
                p.authors.join(", "),
                p.published,
                None,
                None,
            ),
            CollectedItem::News(n) => (
                n.title,
                n.url,
                n.source,
                n.description,
                n.author.unwrap_or_default(),
                n.published,
                n.thumbnail,
                None,
            ),
            CollectedItem::Video(v) => (
                v.title,
                v.url,
                "YouTube".to_string(),
                v.description,
                String::new(),
                v.published,
                v.thumbnail,
                Some(v.channel),
            ),
            CollectedItem::Blog(b) => (
                b.title,
                b.url,
                b.source,
                b.description,
                String::new(),
                b.published,
                b.thumbnail,
                None,
            ),
        };

        ContentItem {
            id,
            title,
            url,
            source,
            source_type,
            description,
            summary: classification.summary,
            authors,
            published,
            thumbnail,
            categories: classification.categories,
            keywords: classification.keywords,
            importance_score: classification.importance_score,
            channel,
            bookmarked: false,
            is_read: false,
            processed_at: now,
            last_fetched_at: now,
            raw_data,
        }
    }
}

/// One collector per upstream. `collect` may fail; the fan-out in
/// [`crate::collect::run_all`] logs the failure and keeps the sibling
/// sources' results, so one bad upstream never aborts a refresh.
#[async_trait::async_trait]
pub trait SourceCollector: Send + Sync {
    /// Key used in the source-metadata table (`arxiv`, `news`, ...).
    fn id(&self) -> &'static str;
    /// Human-readable origin name for logs.
    fn name(&self) -> &'static str;
    async fn collect(&self) -> Result<Vec<CollectedItem>>;
}
