// tests/scheduler.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use aifeed::classify::{Classifier, DisabledClient};
use aifeed::collect::types::{BlogPost, CollectedItem, SourceCollector};
use aifeed::config::{ClassifierConfig, SchedulerConfig};
use aifeed::{ContentStore, RefreshManager, RefreshScheduler};

/// Counts collection passes so tests can observe scheduled ticks.
struct CountingCollector {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceCollector for CountingCollector {
    fn id(&self) -> &'static str {
        "blogs"
    }
    fn name(&self) -> &'static str {
        "Counting Blog"
    }
    async fn collect(&self) -> Result<Vec<CollectedItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![CollectedItem::Blog(BlogPost {
            title: "post".to_string(),
            description: "body".to_string(),
            url: "https://blog.example.com/post".to_string(),
            source: "Counting Blog".to_string(),
            published: Utc::now(),
            thumbnail: None,
            full_text: None,
        })])
    }
}

async fn build_manager(calls: Arc<AtomicUsize>) -> (TempDir, Arc<RefreshManager>) {
    let dir = TempDir::new().expect("tempdir");
    let store = ContentStore::open(dir.path().join("test.db"))
        .await
        .expect("open store");
    let collectors: Vec<Box<dyn SourceCollector>> = vec![Box::new(CountingCollector { calls })];
    let classifier = Classifier::new(
        Arc::new(DisabledClient),
        &ClassifierConfig {
            stagger_ms: 0,
            pause_ms: 0,
            ..Default::default()
        },
    );
    (
        dir,
        Arc::new(RefreshManager::new(collectors, classifier, Arc::new(store))),
    )
}

#[tokio::test]
async fn start_is_idempotent_and_stop_halts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_dir, manager) = build_manager(calls).await;
    let scheduler = RefreshScheduler::new(
        manager,
        SchedulerConfig {
            enabled: true,
            interval_secs: 3_600,
        },
    );

    assert!(!scheduler.status().running);
    scheduler.start();
    assert!(scheduler.status().running);
    scheduler.start();
    assert!(scheduler.status().running);

    scheduler.stop();
    assert!(!scheduler.status().running);
    scheduler.stop();
    assert!(!scheduler.status().running);
}

#[tokio::test]
async fn disabled_scheduler_does_not_start() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_dir, manager) = build_manager(calls).await;
    let scheduler = RefreshScheduler::new(
        manager,
        SchedulerConfig {
            enabled: false,
            interval_secs: 1,
        },
    );

    scheduler.start();
    let status = scheduler.status();
    assert!(!status.enabled);
    assert!(!status.running);
}

#[tokio::test]
async fn scheduled_tick_runs_a_refresh() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_dir, manager) = build_manager(calls.clone()).await;
    let scheduler = RefreshScheduler::new(
        manager,
        SchedulerConfig {
            enabled: true,
            interval_secs: 1,
        },
    );

    scheduler.start();
    // No immediate run; the first cycle fires after one interval.
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(1_700)).await;
    scheduler.stop();
    assert!(calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn update_config_restarts_with_new_interval() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_dir, manager) = build_manager(calls).await;
    let scheduler = RefreshScheduler::new(
        manager,
        SchedulerConfig {
            enabled: true,
            interval_secs: 3_600,
        },
    );

    scheduler.start();
    scheduler.update_config(SchedulerConfig {
        enabled: true,
        interval_secs: 600,
    });
    let status = scheduler.status();
    assert!(status.running);
    assert_eq!(status.interval_secs, 600);

    // Disabling through an update stops the running task.
    scheduler.update_config(SchedulerConfig {
        enabled: false,
        interval_secs: 600,
    });
    assert!(!scheduler.status().running);
}

#[tokio::test]
async fn manual_trigger_runs_and_persists() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_dir, manager) = build_manager(calls.clone()).await;
    let scheduler = RefreshScheduler::new(
        manager,
        SchedulerConfig {
            enabled: true,
            interval_secs: 3_600,
        },
    );

    let report = scheduler.trigger_refresh().await;
    assert!(report.success, "{}", report.message);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!scheduler.status().is_refreshing);
}
