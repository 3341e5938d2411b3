// src/config/mod.rs
//! Typed configuration for sources, classifier, scheduler, and store.
//!
//! Loaded from a TOML file; every section has defaults so a missing or
//! partial file still yields a runnable configuration. API credentials are
//! *never* read from the file — collectors take them from the environment
//! (`NEWS_API_KEY`, `YOUTUBE_API_KEY`, `ANTHROPIC_API_KEY`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const ENV_CONFIG_PATH: &str = "AIFEED_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/aifeed.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub classifier: ClassifierConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub arxiv: ArxivConfig,
    pub news: NewsConfig,
    pub youtube: YoutubeConfig,
    pub blogs: BlogsConfig,
}

impl SourcesConfig {
    pub fn enabled_count(&self) -> usize {
        [
            self.arxiv.enabled,
            self.news.enabled,
            self.youtube.enabled,
            self.blogs.enabled,
        ]
        .iter()
        .filter(|e| **e)
        .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    pub enabled: bool,
    pub categories: Vec<String>,
    pub max_results: usize,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: ["cs.AI", "cs.CL", "cs.CV", "cs.LG", "cs.NE"]
                .map(String::from)
                .to_vec(),
            max_results: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub enabled: bool,
    pub keywords: Vec<String>,
    pub max_results: usize,
    /// Search window in days, ending now.
    pub window_days: i64,
    /// Fetch the full article body for each hit (best-effort).
    pub fetch_full_articles: bool,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: [
                "artificial intelligence",
                "machine learning",
                "deep learning",
                "neural networks",
                "large language model",
                "computer vision",
                "natural language processing",
            ]
            .map(String::from)
            .to_vec(),
            max_results: 30,
            window_days: 2,
            fetch_full_articles: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub enabled: bool,
    /// Channel IDs to poll for recent uploads.
    pub channels: Vec<String>,
    /// Keep only videos whose title or description matches one of these.
    pub keywords: Vec<String>,
    pub max_results: usize,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: vec![
                "UCBFYP1bFUiGkLr6WMz7Kq7g".to_string(), // Two Minute Papers
                "UCtYLUTtgS3k1Fg4y5tAhLbw".to_string(), // StatQuest
            ],
            keywords: [
                "artificial intelligence",
                "machine learning",
                "deep learning",
                "neural network",
                "transformer",
                "computer vision",
            ]
            .map(String::from)
            .to_vec(),
            max_results: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogsConfig {
    pub enabled: bool,
    pub feeds: Vec<FeedConfig>,
    pub max_results: usize,
    /// Fetch and extract the full article body for each post (best-effort).
    pub fetch_full_articles: bool,
}

impl Default for BlogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feeds: vec![
                FeedConfig {
                    name: "OpenAI Blog".to_string(),
                    url: "https://openai.com/blog/rss.xml".to_string(),
                },
                FeedConfig {
                    name: "Google AI Blog".to_string(),
                    url: "https://ai.googleblog.com/feeds/posts/default".to_string(),
                },
                FeedConfig {
                    name: "DeepMind Blog".to_string(),
                    url: "https://deepmind.google/discover/blog/rss.xml".to_string(),
                },
            ],
            max_results: 25,
            fetch_full_articles: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub model: String,
    /// Items per concurrent classification batch.
    pub batch_size: usize,
    /// Staggered start offset between items within a batch.
    pub stagger_ms: u64,
    /// Pause between batches.
    pub pause_ms: u64,
    /// Cooldown after a rate-limit response.
    pub cooldown_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "claude-3-5-sonnet-20241022".to_string(),
            batch_size: 5,
            stagger_ms: 1_000,
            pause_ms: 2_000,
            cooldown_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 2 * 60 * 60, // every 2 hours
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/aifeed.db"),
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Resolution order: $AIFEED_CONFIG_PATH (must exist if set), then
    /// `config/aifeed.toml` if present, then built-in defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to a non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Ok(Self::default())
    }
}
