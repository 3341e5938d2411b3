// tests/store.rs
use chrono::{Duration, Utc};
use tempfile::TempDir;

use aifeed::model::SourceMetadata;
use aifeed::{ContentItem, ContentStore, ItemFilter, SourceType};

async fn open_store() -> (TempDir, ContentStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = ContentStore::open(dir.path().join("test.db"))
        .await
        .expect("open store");
    (dir, store)
}

fn make_item(id: &str, url: &str, title: &str, source_type: SourceType) -> ContentItem {
    let now = Utc::now();
    ContentItem {
        id: id.to_string(),
        title: title.to_string(),
        url: url.to_string(),
        source: "Test Source".to_string(),
        source_type,
        description: format!("{title} description"),
        summary: format!("{title} summary"),
        authors: "A. Author".to_string(),
        published: now,
        thumbnail: None,
        categories: vec!["Research".to_string()],
        keywords: vec!["testing".to_string()],
        importance_score: 5,
        channel: None,
        bookmarked: false,
        is_read: false,
        processed_at: now,
        last_fetched_at: now,
        raw_data: Some(serde_json::json!({"kind": "test"})),
    }
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let (_dir, store) = open_store().await;
    let items = vec![
        make_item("a", "https://example.com/a", "Alpha", SourceType::Paper),
        make_item("b", "https://example.com/b", "Beta", SourceType::News),
    ];

    assert_eq!(store.upsert_items(&items).await.unwrap(), 2);
    assert_eq!(store.upsert_items(&items).await.unwrap(), 2);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_items, 2);
}

#[tokio::test]
async fn url_conflict_updates_existing_row_and_keeps_its_id() {
    let (_dir, store) = open_store().await;
    let first = make_item("id-one", "https://example.com/same", "Original", SourceType::Blog);
    store.upsert_items(&[first]).await.unwrap();

    // Same URL arriving under a different derived id must converge on the
    // stored row, not duplicate it.
    let mut second = make_item("id-two", "https://example.com/same", "Updated", SourceType::Blog);
    second.importance_score = 9;
    store.upsert_items(&[second]).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_items, 1);

    let item = store.get_item("id-one").await.unwrap().expect("row kept");
    assert_eq!(item.title, "Updated");
    assert_eq!(item.importance_score, 9);
    assert!(store.get_item("id-two").await.unwrap().is_none());
}

#[tokio::test]
async fn user_flags_survive_reupsert() {
    let (_dir, store) = open_store().await;
    let item = make_item("a", "https://example.com/a", "Alpha", SourceType::Video);
    store.upsert_items(&[item.clone()]).await.unwrap();

    assert!(store.set_bookmark("a", true).await.unwrap());
    assert!(store.set_read("a", true).await.unwrap());

    // Fresh collection cycles always carry bookmarked=false/is_read=false.
    store.upsert_items(&[item]).await.unwrap();

    let stored = store.get_item("a").await.unwrap().unwrap();
    assert!(stored.bookmarked);
    assert!(stored.is_read);
}

#[tokio::test]
async fn flag_updates_on_missing_id_return_false() {
    let (_dir, store) = open_store().await;
    assert!(!store.set_bookmark("ghost", true).await.unwrap());
    assert!(!store.set_read("ghost", true).await.unwrap());
}

#[tokio::test]
async fn query_filters_combine() {
    let (_dir, store) = open_store().await;
    let mut paper = make_item("p", "https://example.com/p", "Attention paper", SourceType::Paper);
    paper.source = "arXiv".to_string();
    let news = make_item("n", "https://example.com/n", "Funding news", SourceType::News);
    let blog = make_item("b", "https://example.com/b", "Attention blog", SourceType::Blog);
    store.upsert_items(&[paper, news, blog]).await.unwrap();
    store.set_bookmark("n", true).await.unwrap();

    let papers = store
        .query_items(&ItemFilter {
            content_type: Some(SourceType::Paper),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(papers.len(), 1);
    assert_eq!(papers[0].id, "p");

    let bookmarked = store
        .query_items(&ItemFilter {
            bookmarked: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bookmarked.len(), 1);
    assert_eq!(bookmarked[0].id, "n");

    let attention = store
        .query_items(&ItemFilter {
            search: Some("attention".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(attention.len(), 2);

    let limited = store
        .query_items(&ItemFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn query_orders_newest_first() {
    let (_dir, store) = open_store().await;
    let mut old = make_item("old", "https://example.com/old", "Old", SourceType::News);
    old.published = Utc::now() - Duration::days(3);
    let new = make_item("new", "https://example.com/new", "New", SourceType::News);
    store.upsert_items(&[old, new]).await.unwrap();

    let items = store.query_items(&ItemFilter::default()).await.unwrap();
    assert_eq!(items[0].id, "new");
    assert_eq!(items[1].id, "old");
}

#[tokio::test]
async fn search_ranks_importance_over_recency() {
    let (_dir, store) = open_store().await;
    let mut fresh = make_item("fresh", "https://example.com/f", "GPU review", SourceType::News);
    fresh.importance_score = 3;
    let mut important = make_item("imp", "https://example.com/i", "GPU breakthrough", SourceType::Paper);
    important.importance_score = 9;
    important.published = Utc::now() - Duration::days(5);
    store.upsert_items(&[fresh, important]).await.unwrap();

    let hits = store.search_items("GPU", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "imp");

    let capped = store.search_items("GPU", 1).await.unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn stats_aggregate_by_type_and_source() {
    let (_dir, store) = open_store().await;
    let mut a = make_item("a", "https://example.com/a", "A", SourceType::Paper);
    a.source = "arXiv".to_string();
    let mut b = make_item("b", "https://example.com/b", "B", SourceType::Paper);
    b.source = "arXiv".to_string();
    let c = make_item("c", "https://example.com/c", "C", SourceType::Blog);
    store.upsert_items(&[a, b, c]).await.unwrap();
    store.set_read("c", true).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_items, 3);
    assert_eq!(stats.by_type.get("paper"), Some(&2));
    assert_eq!(stats.by_type.get("blog"), Some(&1));
    assert_eq!(stats.by_source.get("arXiv"), Some(&2));
    assert_eq!(stats.read_count, 1);
    assert!(stats.last_updated.is_some());
}

#[tokio::test]
async fn empty_store_stats_are_defaults() {
    let (_dir, store) = open_store().await;
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_items, 0);
    assert!(stats.by_type.is_empty());
    assert!(stats.last_updated.is_none());
}

#[tokio::test]
async fn source_metadata_round_trips() {
    let (_dir, store) = open_store().await;
    assert!(store.get_source_metadata("arxiv").await.unwrap().is_none());

    let meta = SourceMetadata {
        source_id: "arxiv".to_string(),
        last_fetch_time: Utc::now(),
        last_item_id: Some("arxiv-2401.00001".to_string()),
        status: "ok".to_string(),
        error_count: 0,
        last_error: None,
    };
    store.update_source_metadata(&meta).await.unwrap();

    let stored = store.get_source_metadata("arxiv").await.unwrap().unwrap();
    assert_eq!(stored.last_item_id.as_deref(), Some("arxiv-2401.00001"));
    assert_eq!(stored.status, "ok");

    let updated = SourceMetadata {
        status: "error".to_string(),
        error_count: 2,
        last_error: Some("rate limited".to_string()),
        ..meta
    };
    store.update_source_metadata(&updated).await.unwrap();
    let stored = store.get_source_metadata("arxiv").await.unwrap().unwrap();
    assert_eq!(stored.error_count, 2);
    assert_eq!(stored.last_error.as_deref(), Some("rate limited"));
}
