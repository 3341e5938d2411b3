// src/model.rs
//! Canonical content model shared by the store, orchestrator, and the
//! UI-facing operation surface.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content a collector produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Paper,
    News,
    Video,
    Blog,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Paper => "paper",
            SourceType::News => "news",
            SourceType::Video => "video",
            SourceType::Blog => "blog",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paper" => Some(SourceType::Paper),
            "news" => Some(SourceType::News),
            "video" => Some(SourceType::Video),
            "blog" => Some(SourceType::Blog),
            _ => None,
        }
    }
}

/// One canonical, fully-enriched content row.
///
/// `id` is derived deterministically from the source's natural key, and
/// `url` carries a storage-level UNIQUE constraint, so re-collection
/// upserts instead of duplicating. `bookmarked`/`is_read` are user state:
/// the upsert never overwrites them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub source_type: SourceType,
    pub description: String,
    pub summary: String,
    pub authors: String,
    pub published: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub importance_score: i64,
    pub channel: Option<String>,
    pub bookmarked: bool,
    pub is_read: bool,
    pub processed_at: DateTime<Utc>,
    pub last_fetched_at: DateTime<Utc>,
    /// Raw source payload snapshot, kept for debugging/reprocessing.
    pub raw_data: Option<serde_json::Value>,
}

/// Per-source sync bookkeeping row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source_id: String,
    pub last_fetch_time: DateTime<Utc>,
    pub last_item_id: Option<String>,
    pub status: String,
    pub error_count: i64,
    pub last_error: Option<String>,
}

/// Optional filters for store queries. Everything is combinable; results
/// are always ordered by publish time descending.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub content_type: Option<SourceType>,
    pub source: Option<String>,
    pub bookmarked: Option<bool>,
    pub is_read: Option<bool>,
    /// Substring match over title/description/summary.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregate counts derived from the content table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub total_items: i64,
    pub by_type: HashMap<String, i64>,
    pub by_source: HashMap<String, i64>,
    pub bookmarked_count: i64,
    pub read_count: i64,
    /// Most recent `processed_at`, if any rows exist.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Per-stage counts for one refresh cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshStats {
    pub collected: usize,
    pub processed: usize,
    pub saved: u64,
    pub duration_secs: u64,
    /// Collected count per source id (`arxiv`, `news`, `youtube`, `blogs`).
    pub sources: HashMap<String, usize>,
}

/// Outcome of one orchestration run. Returned to the caller and logged,
/// never persisted. `refresh()` always resolves to one of these; failure
/// is signalled via `success`, not via an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
    pub success: bool,
    pub message: String,
    pub stats: Option<RefreshStats>,
}

impl RefreshReport {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            stats: None,
        }
    }
}
