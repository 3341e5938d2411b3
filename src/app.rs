// src/app.rs
//! Wiring layer: builds the store, collectors, classifier, manager, and
//! scheduler from one [`AppConfig`], and exposes the operations a frontend
//! calls.
//!
//! Read operations are forgiving: a store error is logged and surfaces as
//! an empty result or a default, never as a hard failure. Write paths
//! (`refresh`) keep their detailed reports.

use std::sync::Arc;

use anyhow::Result;

use crate::classify::{self, Classifier};
use crate::collect;
use crate::config::AppConfig;
use crate::http::HttpClient;
use crate::model::{ContentItem, DatabaseStats, ItemFilter, RefreshReport};
use crate::refresh::RefreshManager;
use crate::schedule::{RefreshScheduler, SchedulerStatus};
use crate::store::ContentStore;

pub struct App {
    store: Arc<ContentStore>,
    manager: Arc<RefreshManager>,
    scheduler: RefreshScheduler,
}

impl App {
    /// Build every component from configuration. Fails only when the
    /// database cannot be opened; missing API credentials downgrade the
    /// affected source or the classifier instead.
    pub async fn init(config: AppConfig) -> Result<Self> {
        let store = Arc::new(ContentStore::open(&config.store.path).await?);

        let http = HttpClient::new();
        let collectors = collect::build_collectors(&config.sources, &http);
        let classifier = Classifier::new(
            classify::build_client(&config.classifier),
            &config.classifier,
        );

        let manager = Arc::new(RefreshManager::new(collectors, classifier, store.clone()));
        let scheduler = RefreshScheduler::new(manager.clone(), config.scheduler.clone());

        tracing::info!(
            db = %store.path().display(),
            sources = config.sources.enabled_count(),
            "application initialized"
        );
        Ok(Self {
            store,
            manager,
            scheduler,
        })
    }

    pub async fn refresh(&self) -> RefreshReport {
        self.manager.refresh().await
    }

    pub fn is_refreshing(&self) -> bool {
        self.manager.is_refreshing()
    }

    pub fn start_scheduler(&self) {
        self.scheduler.start();
    }

    pub fn stop_scheduler(&self) {
        self.scheduler.stop();
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub async fn get_items(&self, filter: &ItemFilter) -> Vec<ContentItem> {
        match self.store.query_items(filter).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "item query failed");
                Vec::new()
            }
        }
    }

    pub async fn search(&self, text: &str, limit: i64) -> Vec<ContentItem> {
        match self.store.search_items(text, limit).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "search failed");
                Vec::new()
            }
        }
    }

    pub async fn get_item(&self, id: &str) -> Option<ContentItem> {
        match self.store.get_item(id).await {
            Ok(item) => item,
            Err(e) => {
                tracing::error!(error = %e, id, "item lookup failed");
                None
            }
        }
    }

    pub async fn set_bookmark(&self, id: &str, bookmarked: bool) -> bool {
        match self.store.set_bookmark(id, bookmarked).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!(error = %e, id, "bookmark update failed");
                false
            }
        }
    }

    pub async fn set_read(&self, id: &str, is_read: bool) -> bool {
        match self.store.set_read(id, is_read).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!(error = %e, id, "read-flag update failed");
                false
            }
        }
    }

    pub async fn stats(&self) -> DatabaseStats {
        match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "stats query failed");
                DatabaseStats::default()
            }
        }
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }
}
