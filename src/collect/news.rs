// src/collect/news.rs
//! News collector backed by the NewsAPI `everything` search.
//!
//! A missing credential means the source is intentionally disabled: the
//! collector returns an empty list instead of failing the refresh.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::collect::blogs::fetch_full_article;
use crate::collect::types::{CollectedItem, NewsArticle, SourceCollector};
use crate::config::NewsConfig;
use crate::http::HttpClient;
use crate::util::{strip_html, truncate_text};

const API_URL: &str = "https://newsapi.org/v2/everything";
const ENV_API_KEY: &str = "NEWS_API_KEY";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    source: Option<ArticleSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "urlToImage")]
    url_to_image: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

pub struct NewsCollector {
    config: NewsConfig,
    api_key: Option<String>,
    mode: Mode,
}

enum Mode {
    Http(HttpClient),
    Fixture(String),
}

impl NewsCollector {
    pub fn new(config: NewsConfig, http: HttpClient) -> Self {
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .filter(|k| !k.is_empty() && k != "disabled");
        Self {
            config,
            api_key,
            mode: Mode::Http(http),
        }
    }

    pub fn from_fixture(config: NewsConfig, json: &str) -> Self {
        Self {
            config,
            api_key: Some("fixture".to_string()),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    fn parse_articles(body: &str) -> Result<Vec<CollectedItem>> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse =
            serde_json::from_str(body).context("parsing newsapi response")?;

        let mut out = Vec::with_capacity(resp.articles.len());
        for article in resp.articles {
            let (Some(title), Some(url)) = (article.title, article.url) else {
                counter!("collect_entries_skipped_total").increment(1);
                tracing::debug!(source = "News", "skipping article without title/url");
                continue;
            };
            let title = title.trim().to_string();
            if title.is_empty() || url.is_empty() {
                counter!("collect_entries_skipped_total").increment(1);
                continue;
            }

            let description =
                truncate_text(&strip_html(article.description.as_deref().unwrap_or("")), 300);
            let published = article
                .published_at
                .as_deref()
                .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            out.push(CollectedItem::News(NewsArticle {
                title,
                description,
                url,
                source: article
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "Unknown".to_string()),
                published,
                author: article.author.filter(|a| !a.is_empty()),
                thumbnail: article.url_to_image.filter(|u| !u.is_empty()),
                full_text: None,
            }));
        }

        histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }

    async fn fetch(&self, http: &HttpClient, api_key: &str) -> Result<Vec<CollectedItem>> {
        let query: String = self
            .config
            .keywords
            .iter()
            .map(|kw| format!("\"{kw}\""))
            .collect::<Vec<_>>()
            .join(" OR ");
        let from = (Utc::now() - ChronoDuration::days(self.config.window_days))
            .format("%Y-%m-%d")
            .to_string();

        let params = [
            ("q", query),
            ("from", from),
            ("sortBy", "publishedAt".to_string()),
            ("language", "en".to_string()),
            ("pageSize", self.config.max_results.to_string()),
            ("apiKey", api_key.to_string()),
        ];

        let resp = http.get(API_URL, &params, None).await?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Rate limits are recoverable and logged apart from hard failures.
            tracing::warn!("News API rate limit exceeded, skipping until next cycle");
            anyhow::bail!("News API rate limited");
        }
        if !status.is_success() {
            anyhow::bail!("News API returned {status}");
        }

        let body = resp.text().await.context("reading newsapi body")?;
        let mut items = Self::parse_articles(&body)?;

        if self.config.fetch_full_articles {
            for item in items.iter_mut() {
                if let CollectedItem::News(article) = item {
                    article.full_text = fetch_full_article(http, &article.url).await;
                }
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl SourceCollector for NewsCollector {
    fn id(&self) -> &'static str {
        "news"
    }

    fn name(&self) -> &'static str {
        "News"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::info!("News API key not configured, skipping news collection");
            return Ok(Vec::new());
        };

        match &self.mode {
            Mode::Fixture(json) => Self::parse_articles(json),
            Mode::Http(http) => self.fetch(http, api_key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "status": "ok",
        "articles": [
            {
                "source": {"name": "TechWire"},
                "author": "R. Reporter",
                "title": "New model released",
                "description": "<p>A <b>new</b> model.</p>",
                "url": "https://technews.example/story-1",
                "urlToImage": "https://technews.example/img.png",
                "publishedAt": "2024-03-01T12:00:00Z"
            },
            {
                "source": {"name": "NoUrl"},
                "title": "Malformed entry",
                "url": null
            }
        ]
    }"#;

    #[test]
    fn parses_articles_and_skips_malformed() {
        let items = NewsCollector::parse_articles(SAMPLE).unwrap();
        assert_eq!(items.len(), 1);
        let CollectedItem::News(a) = &items[0] else {
            panic!("expected news");
        };
        assert_eq!(a.title, "New model released");
        assert_eq!(a.description, "A new model.");
        assert_eq!(a.source, "TechWire");
        assert_eq!(a.author.as_deref(), Some("R. Reporter"));
    }

    #[serial_test::serial]
    #[tokio::test]
    async fn missing_credential_means_disabled_not_error() {
        std::env::remove_var(ENV_API_KEY);
        let collector = NewsCollector::new(NewsConfig::default(), HttpClient::new());
        let items = collector.collect().await.unwrap();
        assert!(items.is_empty());
    }

    #[serial_test::serial]
    #[tokio::test]
    async fn disabled_sentinel_key_is_ignored() {
        std::env::set_var(ENV_API_KEY, "disabled");
        let collector = NewsCollector::new(NewsConfig::default(), HttpClient::new());
        assert!(collector.api_key.is_none());
        std::env::remove_var(ENV_API_KEY);
    }
}
