// src/collect/youtube.rs
//! YouTube collector: per configured channel, search recent uploads, keep
//! keyword matches, then fetch statistics for the filtered subset only (the
//! two-phase shape keeps API quota use down).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;

use crate::collect::types::{CollectedItem, SourceCollector, VideoItem};
use crate::config::YoutubeConfig;
use crate::http::HttpClient;
use crate::util::truncate_text;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const ENV_API_KEY: &str = "YOUTUBE_API_KEY";
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: Option<SearchId>,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
struct SearchId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    items: Vec<DetailsItem>,
}

#[derive(Debug, Deserialize)]
struct DetailsItem {
    id: Option<String>,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
}

pub struct YoutubeCollector {
    config: YoutubeConfig,
    api_key: Option<String>,
    mode: Mode,
}

enum Mode {
    Http(HttpClient),
    /// (search response, details response) for a single logical channel.
    Fixture(String, String),
}

impl YoutubeCollector {
    pub fn new(config: YoutubeConfig, http: HttpClient) -> Self {
        let api_key = std::env::var(ENV_API_KEY).ok().filter(|k| !k.is_empty());
        Self {
            config,
            api_key,
            mode: Mode::Http(http),
        }
    }

    pub fn from_fixture(config: YoutubeConfig, search_json: &str, details_json: &str) -> Self {
        Self {
            config,
            api_key: Some("fixture".to_string()),
            mode: Mode::Fixture(search_json.to_string(), details_json.to_string()),
        }
    }

    /// Keyword filter matching either title or description, case-insensitive.
    fn matches_keywords(&self, snippet: &Snippet) -> bool {
        let title = snippet.title.to_lowercase();
        let description = snippet.description.to_lowercase();
        self.config.keywords.iter().any(|kw| {
            let kw = kw.to_lowercase();
            title.contains(&kw) || description.contains(&kw)
        })
    }

    fn build_videos(
        &self,
        search: SearchResponse,
        details: DetailsResponse,
        per_channel: usize,
    ) -> Vec<CollectedItem> {
        let details_map: HashMap<String, DetailsItem> = details
            .items
            .into_iter()
            .filter_map(|d| d.id.clone().map(|id| (id, d)))
            .collect();

        let mut out = Vec::new();
        for item in search.items {
            if out.len() >= per_channel {
                break;
            }
            let (Some(id), Some(snippet)) = (item.id, item.snippet) else {
                counter!("collect_entries_skipped_total").increment(1);
                continue;
            };
            let Some(video_id) = id.video_id else {
                counter!("collect_entries_skipped_total").increment(1);
                continue;
            };
            if snippet.title.is_empty() || !self.matches_keywords(&snippet) {
                continue;
            }

            let thumbnail = snippet.thumbnails.as_ref().and_then(|t| {
                t.high
                    .as_ref()
                    .or(t.medium.as_ref())
                    .or(t.default.as_ref())
                    .and_then(|th| th.url.clone())
            });
            let published = snippet
                .published_at
                .as_deref()
                .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            let mut video = VideoItem {
                url: format!("https://www.youtube.com/watch?v={video_id}"),
                video_id,
                title: snippet.title.trim().to_string(),
                description: truncate_text(&snippet.description, 500),
                thumbnail,
                channel: snippet.channel_title,
                published,
                duration: None,
                view_count: None,
                like_count: None,
            };

            if let Some(d) = details_map.get(&video.video_id) {
                video.duration = d
                    .content_details
                    .as_ref()
                    .and_then(|c| c.duration.clone());
                if let Some(stats) = &d.statistics {
                    video.view_count = stats.view_count.as_deref().and_then(|v| v.parse().ok());
                    video.like_count = stats.like_count.as_deref().and_then(|v| v.parse().ok());
                }
            }

            out.push(CollectedItem::Video(video));
        }
        out
    }

    async fn collect_channel(
        &self,
        http: &HttpClient,
        api_key: &str,
        channel_id: &str,
        per_channel: usize,
    ) -> Result<Vec<CollectedItem>> {
        // Phase 1: recent uploads, over-fetched so keyword filtering still
        // fills the per-channel budget.
        let search_params = [
            ("part", "snippet".to_string()),
            ("channelId", channel_id.to_string()),
            ("maxResults", (per_channel * 2).to_string()),
            ("order", "date".to_string()),
            ("type", "video".to_string()),
            ("key", api_key.to_string()),
        ];
        let search: SearchResponse = http
            .get(SEARCH_URL, &search_params, Some(FETCH_TIMEOUT))
            .await?
            .error_for_status()
            .context("youtube search")?
            .json()
            .await
            .context("parsing youtube search response")?;

        let matching_ids: Vec<String> = search
            .items
            .iter()
            .filter(|it| {
                it.snippet
                    .as_ref()
                    .is_some_and(|s| self.matches_keywords(s))
            })
            .filter_map(|it| it.id.as_ref().and_then(|id| id.video_id.clone()))
            .take(per_channel)
            .collect();

        if matching_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Phase 2: statistics and duration, only for the filtered subset.
        let details_params = [
            ("part", "snippet,contentDetails,statistics".to_string()),
            ("id", matching_ids.join(",")),
            ("key", api_key.to_string()),
        ];
        let details: DetailsResponse = http
            .get(VIDEOS_URL, &details_params, Some(FETCH_TIMEOUT))
            .await?
            .error_for_status()
            .context("youtube details")?
            .json()
            .await
            .context("parsing youtube details response")?;

        Ok(self.build_videos(search, details, per_channel))
    }
}

#[async_trait]
impl SourceCollector for YoutubeCollector {
    fn id(&self) -> &'static str {
        "youtube"
    }

    fn name(&self) -> &'static str {
        "YouTube"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::info!("YouTube API key not configured, skipping video collection");
            return Ok(Vec::new());
        };
        if self.config.channels.is_empty() {
            return Ok(Vec::new());
        }
        let per_channel = (self.config.max_results / self.config.channels.len()).max(1);

        match &self.mode {
            Mode::Fixture(search_json, details_json) => {
                let search: SearchResponse =
                    serde_json::from_str(search_json).context("parsing search fixture")?;
                let details: DetailsResponse =
                    serde_json::from_str(details_json).context("parsing details fixture")?;
                Ok(self.build_videos(search, details, per_channel))
            }
            Mode::Http(http) => {
                let mut out = Vec::new();
                for channel_id in &self.config.channels {
                    match self
                        .collect_channel(http, api_key, channel_id, per_channel)
                        .await
                    {
                        Ok(mut videos) => out.append(&mut videos),
                        Err(e) => {
                            // One channel failing must not drop the others.
                            tracing::warn!(channel = %channel_id, error = %e, "channel collection failed");
                            counter!("collect_source_errors_total").increment(1);
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = r#"{
        "items": [
            {
                "id": {"videoId": "abc123"},
                "snippet": {
                    "title": "Deep learning explained",
                    "description": "A tour of neural networks.",
                    "channelTitle": "AI Channel",
                    "publishedAt": "2024-03-02T15:00:00Z",
                    "thumbnails": {"high": {"url": "https://img.example/abc123.jpg"}}
                }
            },
            {
                "id": {"videoId": "cooking1"},
                "snippet": {
                    "title": "Best pasta recipe",
                    "description": "Dinner in twenty minutes.",
                    "channelTitle": "AI Channel",
                    "publishedAt": "2024-03-01T15:00:00Z"
                }
            }
        ]
    }"#;

    const DETAILS: &str = r#"{
        "items": [
            {
                "id": "abc123",
                "contentDetails": {"duration": "PT12M30S"},
                "statistics": {"viewCount": "54321", "likeCount": "1234"}
            }
        ]
    }"#;

    fn test_config() -> YoutubeConfig {
        YoutubeConfig {
            enabled: true,
            channels: vec!["chan".to_string()],
            keywords: vec!["deep learning".to_string(), "neural network".to_string()],
            max_results: 10,
        }
    }

    #[tokio::test]
    async fn filters_by_keyword_and_merges_statistics() {
        let collector = YoutubeCollector::from_fixture(test_config(), SEARCH, DETAILS);
        let items = collector.collect().await.unwrap();
        assert_eq!(items.len(), 1);
        let CollectedItem::Video(v) = &items[0] else {
            panic!("expected video");
        };
        assert_eq!(v.video_id, "abc123");
        assert_eq!(v.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(v.duration.as_deref(), Some("PT12M30S"));
        assert_eq!(v.view_count, Some(54_321));
        assert_eq!(v.like_count, Some(1_234));
        assert_eq!(items[0].id(), "youtube-abc123");
    }
}
