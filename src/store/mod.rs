// src/store/mod.rs
//! SQLite persistence for content items and per-source sync metadata.
//!
//! The content table keys on a deterministic `id` and carries a UNIQUE
//! constraint on `url`, so repeated collection cycles converge on one row
//! per item. Upserts refresh content and enrichment columns but never
//! touch `bookmarked`/`is_read`, which belong to the user.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, SqlitePool};

use crate::model::{
    ContentItem, DatabaseStats, ItemFilter, SourceMetadata, SourceType,
};

const DEFAULT_QUERY_LIMIT: i64 = 100;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    source_type TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    authors TEXT NOT NULL DEFAULT '',
    published TEXT NOT NULL,
    thumbnail TEXT,
    categories TEXT NOT NULL DEFAULT '[]',
    keywords TEXT NOT NULL DEFAULT '[]',
    importance_score INTEGER NOT NULL DEFAULT 5,
    channel TEXT,
    bookmarked INTEGER NOT NULL DEFAULT 0,
    is_read INTEGER NOT NULL DEFAULT 0,
    processed_at TEXT NOT NULL,
    last_fetched_at TEXT NOT NULL,
    raw_data TEXT
);

CREATE INDEX IF NOT EXISTS idx_items_source_type ON items(source_type);
CREATE INDEX IF NOT EXISTS idx_items_source ON items(source);
CREATE INDEX IF NOT EXISTS idx_items_published ON items(published);
CREATE INDEX IF NOT EXISTS idx_items_bookmarked ON items(bookmarked);
CREATE INDEX IF NOT EXISTS idx_items_is_read ON items(is_read);
CREATE INDEX IF NOT EXISTS idx_items_importance ON items(importance_score);

CREATE TABLE IF NOT EXISTS source_metadata (
    source_id TEXT PRIMARY KEY,
    last_fetch_time TEXT NOT NULL,
    last_item_id TEXT,
    status TEXT NOT NULL DEFAULT 'ok',
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);
"#;

#[derive(Clone)]
pub struct ContentStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl ContentStore {
    /// Open (creating if needed) the database at `path` and apply the
    /// schema. The parent directory is created on demand.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating data dir {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening database {}", path.display()))?;

        let store = Self { pool, path };
        store.init().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn init(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("applying schema")?;
        }
        tracing::debug!(path = %self.path.display(), "database schema ready");
        Ok(())
    }

    /// Insert or update a batch of items in one transaction. A row that
    /// fails is logged and skipped; the rest of the batch still lands.
    /// Returns the number of rows written.
    pub async fn upsert_items(&self, items: &[ContentItem]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("starting upsert")?;
        let mut saved = 0u64;
        for item in items {
            match upsert_one(&mut tx, item).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    tracing::warn!(id = %item.id, url = %item.url, error = %e, "skipping item row");
                    counter!("store_upsert_errors_total").increment(1);
                }
            }
        }
        tx.commit().await.context("committing upsert")?;

        counter!("store_upsert_rows_total").increment(saved);
        Ok(saved)
    }

    /// Query items with combinable filters, newest first.
    pub async fn query_items(&self, filter: &ItemFilter) -> Result<Vec<ContentItem>> {
        let mut qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM items WHERE 1=1");

        if let Some(ct) = filter.content_type {
            qb.push(" AND source_type = ").push_bind(ct.as_str());
        }
        if let Some(source) = &filter.source {
            qb.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(bookmarked) = filter.bookmarked {
            qb.push(" AND bookmarked = ").push_bind(bookmarked as i64);
        }
        if let Some(is_read) = filter.is_read {
            qb.push(" AND is_read = ").push_bind(is_read as i64);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            qb.push(" AND (title LIKE ")
                .push_bind(pattern.clone())
                .push(" OR description LIKE ")
                .push_bind(pattern.clone())
                .push(" OR summary LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        qb.push(" ORDER BY published DESC");
        qb.push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT));
        qb.push(" OFFSET ").push_bind(filter.offset.unwrap_or(0));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("querying items")?;
        rows.iter().map(item_from_row).collect()
    }

    /// Substring search ranked by importance, then recency.
    pub async fn search_items(&self, text: &str, limit: i64) -> Result<Vec<ContentItem>> {
        let pattern = format!("%{}%", text.trim());
        let rows = sqlx::query(
            "SELECT * FROM items \
             WHERE title LIKE ?1 OR description LIKE ?1 OR summary LIKE ?1 OR authors LIKE ?1 \
             ORDER BY importance_score DESC, published DESC LIMIT ?2",
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("searching items")?;
        rows.iter().map(item_from_row).collect()
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<ContentItem>> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching item")?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// Returns false when no row with that id exists.
    pub async fn set_bookmark(&self, id: &str, bookmarked: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE items SET bookmarked = ?1 WHERE id = ?2")
            .bind(bookmarked as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("updating bookmark")?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns false when no row with that id exists.
    pub async fn set_read(&self, id: &str, is_read: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE items SET is_read = ?1 WHERE id = ?2")
            .bind(is_read as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("updating read flag")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn stats(&self) -> Result<DatabaseStats> {
        let mut stats = DatabaseStats::default();

        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, \
             SUM(bookmarked) AS bookmarked_count, \
             SUM(is_read) AS read_count, \
             MAX(processed_at) AS last_updated \
             FROM items",
        )
        .fetch_one(&self.pool)
        .await
        .context("reading totals")?;
        stats.total_items = totals.try_get("total")?;
        stats.bookmarked_count = totals
            .try_get::<Option<i64>, _>("bookmarked_count")?
            .unwrap_or(0);
        stats.read_count = totals
            .try_get::<Option<i64>, _>("read_count")?
            .unwrap_or(0);
        stats.last_updated = totals
            .try_get::<Option<String>, _>("last_updated")?
            .as_deref()
            .map(parse_ts)
            .transpose()?;

        let by_type =
            sqlx::query("SELECT source_type, COUNT(*) AS n FROM items GROUP BY source_type")
                .fetch_all(&self.pool)
                .await
                .context("reading type counts")?;
        for row in by_type {
            stats
                .by_type
                .insert(row.try_get("source_type")?, row.try_get("n")?);
        }

        let by_source = sqlx::query("SELECT source, COUNT(*) AS n FROM items GROUP BY source")
            .fetch_all(&self.pool)
            .await
            .context("reading source counts")?;
        for row in by_source {
            stats
                .by_source
                .insert(row.try_get("source")?, row.try_get("n")?);
        }

        Ok(stats)
    }

    pub async fn update_source_metadata(&self, meta: &SourceMetadata) -> Result<()> {
        sqlx::query(
            "INSERT INTO source_metadata \
             (source_id, last_fetch_time, last_item_id, status, error_count, last_error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(source_id) DO UPDATE SET \
             last_fetch_time = excluded.last_fetch_time, \
             last_item_id = excluded.last_item_id, \
             status = excluded.status, \
             error_count = excluded.error_count, \
             last_error = excluded.last_error",
        )
        .bind(&meta.source_id)
        .bind(meta.last_fetch_time.to_rfc3339())
        .bind(&meta.last_item_id)
        .bind(&meta.status)
        .bind(meta.error_count)
        .bind(&meta.last_error)
        .execute(&self.pool)
        .await
        .context("updating source metadata")?;
        Ok(())
    }

    pub async fn get_source_metadata(&self, source_id: &str) -> Result<Option<SourceMetadata>> {
        let row = sqlx::query("SELECT * FROM source_metadata WHERE source_id = ?1")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching source metadata")?;
        row.map(|row| {
            Ok(SourceMetadata {
                source_id: row.try_get("source_id")?,
                last_fetch_time: parse_ts(row.try_get::<String, _>("last_fetch_time")?.as_str())?,
                last_item_id: row.try_get("last_item_id")?,
                status: row.try_get("status")?,
                error_count: row.try_get("error_count")?,
                last_error: row.try_get("last_error")?,
            })
        })
        .transpose()
    }
}

/// Write one item. On a URL collision the existing row (and its id) wins;
/// content and enrichment columns are refreshed, user flags are kept.
async fn upsert_one(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    item: &ContentItem,
) -> Result<()> {
    let categories = serde_json::to_string(&item.categories)?;
    let keywords = serde_json::to_string(&item.keywords)?;
    let raw_data = item
        .raw_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        "INSERT INTO items \
         (id, title, url, source, source_type, description, summary, authors, \
          published, thumbnail, categories, keywords, importance_score, channel, \
          bookmarked, is_read, processed_at, last_fetched_at, raw_data) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                 ?15, ?16, ?17, ?18, ?19) \
         ON CONFLICT(url) DO UPDATE SET \
         title = excluded.title, \
         source = excluded.source, \
         source_type = excluded.source_type, \
         description = excluded.description, \
         summary = excluded.summary, \
         authors = excluded.authors, \
         published = excluded.published, \
         thumbnail = excluded.thumbnail, \
         categories = excluded.categories, \
         keywords = excluded.keywords, \
         importance_score = excluded.importance_score, \
         channel = excluded.channel, \
         processed_at = excluded.processed_at, \
         last_fetched_at = excluded.last_fetched_at, \
         raw_data = excluded.raw_data",
    )
    .bind(&item.id)
    .bind(&item.title)
    .bind(&item.url)
    .bind(&item.source)
    .bind(item.source_type.as_str())
    .bind(&item.description)
    .bind(&item.summary)
    .bind(&item.authors)
    .bind(item.published.to_rfc3339())
    .bind(&item.thumbnail)
    .bind(categories)
    .bind(keywords)
    .bind(item.importance_score)
    .bind(&item.channel)
    .bind(item.bookmarked as i64)
    .bind(item.is_read as i64)
    .bind(item.processed_at.to_rfc3339())
    .bind(item.last_fetched_at.to_rfc3339())
    .bind(raw_data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn item_from_row(row: &SqliteRow) -> Result<ContentItem> {
    let source_type_raw: String = row.try_get("source_type")?;
    let source_type = SourceType::parse(&source_type_raw)
        .with_context(|| format!("unknown source_type {source_type_raw:?}"))?;

    let categories: Vec<String> =
        serde_json::from_str(row.try_get::<String, _>("categories")?.as_str())
            .context("decoding categories")?;
    let keywords: Vec<String> =
        serde_json::from_str(row.try_get::<String, _>("keywords")?.as_str())
            .context("decoding keywords")?;
    let raw_data = row
        .try_get::<Option<String>, _>("raw_data")?
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("decoding raw_data")?;

    Ok(ContentItem {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        source: row.try_get("source")?,
        source_type,
        description: row.try_get("description")?,
        summary: row.try_get("summary")?,
        authors: row.try_get("authors")?,
        published: parse_ts(row.try_get::<String, _>("published")?.as_str())?,
        thumbnail: row.try_get("thumbnail")?,
        categories,
        keywords,
        importance_score: row.try_get("importance_score")?,
        channel: row.try_get("channel")?,
        bookmarked: row.try_get::<i64, _>("bookmarked")? != 0,
        is_read: row.try_get::<i64, _>("is_read")? != 0,
        processed_at: parse_ts(row.try_get::<String, _>("processed_at")?.as_str())?,
        last_fetched_at: parse_ts(row.try_get::<String, _>("last_fetched_at")?.as_str())?,
        raw_data,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp {s:?}"))?
        .with_timezone(&Utc))
}
