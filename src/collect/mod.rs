// src/collect/mod.rs
pub mod arxiv;
pub mod blogs;
pub mod news;
pub mod types;
pub mod youtube;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::collect::types::{CollectedItem, SourceCollector};
use crate::config::SourcesConfig;
use crate::http::HttpClient;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_items_total", "Items parsed from all sources.");
        describe_counter!(
            "collect_source_errors_total",
            "Collector fetch/parse failures (whole-source)."
        );
        describe_counter!(
            "collect_entries_skipped_total",
            "Malformed per-entry records skipped during parsing."
        );
        describe_histogram!("collect_parse_ms", "Source parse time in milliseconds.");
    });
}

/// Results of one source's collection pass. A failed source carries its
/// error text so bookkeeping can tell a hard failure from a clean empty
/// fetch.
pub struct SourceBatch {
    pub source_id: &'static str,
    pub items: Vec<CollectedItem>,
    pub error: Option<String>,
}

/// Invoke every collector concurrently and wait for all of them to settle.
/// A failed source contributes an empty batch; partial results are normal.
pub async fn run_all(collectors: &[Box<dyn SourceCollector>]) -> Vec<SourceBatch> {
    ensure_metrics_described();

    let fetches = collectors.iter().map(|c| async move {
        match c.collect().await {
            Ok(items) => {
                tracing::info!(source = c.name(), count = items.len(), "collected");
                counter!("collect_items_total").increment(items.len() as u64);
                SourceBatch {
                    source_id: c.id(),
                    items,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = c.name(), "collector failed");
                counter!("collect_source_errors_total").increment(1);
                SourceBatch {
                    source_id: c.id(),
                    items: Vec::new(),
                    error: Some(format!("{e:#}")),
                }
            }
        }
    });

    futures::future::join_all(fetches).await
}

/// Build the collectors enabled in configuration, sharing one HTTP client.
pub fn build_collectors(
    config: &SourcesConfig,
    http: &HttpClient,
) -> Vec<Box<dyn SourceCollector>> {
    let mut out: Vec<Box<dyn SourceCollector>> = Vec::new();
    if config.arxiv.enabled {
        out.push(Box::new(arxiv::ArxivCollector::new(
            config.arxiv.clone(),
            http.clone(),
        )));
    }
    if config.news.enabled {
        out.push(Box::new(news::NewsCollector::new(
            config.news.clone(),
            http.clone(),
        )));
    }
    if config.youtube.enabled {
        out.push(Box::new(youtube::YoutubeCollector::new(
            config.youtube.clone(),
            http.clone(),
        )));
    }
    if config.blogs.enabled {
        out.push(Box::new(blogs::BlogCollector::new(
            config.blogs.clone(),
            http.clone(),
        )));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use chrono::Utc;

    struct Good;
    struct Bad;

    #[async_trait::async_trait]
    impl SourceCollector for Good {
        fn id(&self) -> &'static str {
            "blogs"
        }
        fn name(&self) -> &'static str {
            "Good Blog"
        }
        async fn collect(&self) -> Result<Vec<CollectedItem>> {
            Ok(vec![CollectedItem::Blog(types::BlogPost {
                title: "post".into(),
                description: "d".into(),
                url: "https://example.com/p".into(),
                source: "Good Blog".into(),
                published: Utc::now(),
                thumbnail: None,
                full_text: None,
            })])
        }
    }

    #[async_trait::async_trait]
    impl SourceCollector for Bad {
        fn id(&self) -> &'static str {
            "news"
        }
        fn name(&self) -> &'static str {
            "Bad News"
        }
        async fn collect(&self) -> Result<Vec<CollectedItem>> {
            Err(anyhow!("upstream exploded"))
        }
    }

    #[tokio::test]
    async fn failed_source_yields_empty_batch_not_abort() {
        let collectors: Vec<Box<dyn SourceCollector>> = vec![Box::new(Good), Box::new(Bad)];
        let batches = run_all(&collectors).await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].items.len(), 1);
        assert!(batches[0].error.is_none());
        assert!(batches[1].items.is_empty());
        assert!(batches[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("upstream exploded")));
    }
}
