// src/refresh/mod.rs
//! One refresh cycle: collect from every source, classify, persist.
//!
//! Cycles are serialized by an overlap guard: a second `refresh()` while
//! one is running returns immediately instead of queueing. Source failures
//! are absorbed upstream, so a cycle only reports failure when nothing was
//! collected at all or the store write fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::classify::Classifier;
use crate::collect::types::SourceCollector;
use crate::collect::{self, SourceBatch};
use crate::model::{ContentItem, RefreshReport, RefreshStats, SourceMetadata};
use crate::store::ContentStore;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_runs_total", "Completed refresh cycles.");
        describe_counter!(
            "refresh_overlap_skipped_total",
            "Refresh requests rejected because a cycle was already running."
        );
        describe_histogram!("refresh_duration_ms", "Refresh cycle wall time.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshState {
    Idle,
    Refreshing,
}

/// Resets the state to `Idle` on drop, so an early return or a panic in
/// the pipeline can never leave the guard stuck.
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            *state = RefreshState::Idle;
        }
    }
}

pub struct RefreshManager {
    collectors: Vec<Box<dyn SourceCollector>>,
    classifier: Classifier,
    store: Arc<ContentStore>,
    state: Mutex<RefreshState>,
}

impl RefreshManager {
    pub fn new(
        collectors: Vec<Box<dyn SourceCollector>>,
        classifier: Classifier,
        store: Arc<ContentStore>,
    ) -> Self {
        Self {
            collectors,
            classifier,
            store,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.state
            .lock()
            .map(|s| *s == RefreshState::Refreshing)
            .unwrap_or(false)
    }

    /// Claim the refresh slot. `None` means a cycle is already running.
    /// The lock itself is only held for the state flip, never across an
    /// await point.
    fn try_begin(&self) -> Option<RefreshGuard<'_>> {
        let mut state = self.state.lock().ok()?;
        if *state == RefreshState::Refreshing {
            return None;
        }
        *state = RefreshState::Refreshing;
        Some(RefreshGuard { state: &self.state })
    }

    /// Run one full cycle. Never returns an error: every outcome is a
    /// report the caller can log or show.
    pub async fn refresh(&self) -> RefreshReport {
        ensure_metrics_described();

        let _guard = match self.try_begin() {
            Some(guard) => guard,
            None => {
                tracing::info!("refresh requested while one is running, skipping");
                counter!("refresh_overlap_skipped_total").increment(1);
                return RefreshReport::failed("Refresh already in progress");
            }
        };

        tracing::info!(sources = self.collectors.len(), "starting data refresh");
        let started = Instant::now();

        let batches = collect::run_all(&self.collectors).await;
        let mut sources: HashMap<String, usize> = HashMap::new();
        for batch in &batches {
            sources.insert(batch.source_id.to_string(), batch.items.len());
            self.record_source_pass(batch).await;
        }

        let items: Vec<_> = batches.into_iter().flat_map(|b| b.items).collect();
        let collected = items.len();
        if collected == 0 {
            tracing::warn!("no items collected from any source");
            return RefreshReport::failed("No new data collected from any sources");
        }

        let classified = self.classifier.batch_classify(items).await;
        let processed = classified.len();

        let now = Utc::now();
        let records: Vec<ContentItem> = classified
            .into_iter()
            .map(|(item, classification)| item.into_record(classification, now))
            .collect();

        let saved = match self.store.upsert_items(&records).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!(error = %e, "refresh aborted during store write");
                return RefreshReport::failed(format!("Refresh failed: {e}"));
            }
        };

        let duration_secs = started.elapsed().as_secs();
        counter!("refresh_runs_total").increment(1);
        histogram!("refresh_duration_ms").record(started.elapsed().as_millis() as f64);
        tracing::info!(collected, processed, saved, duration_secs, "refresh finished");

        RefreshReport {
            success: true,
            message: format!("Successfully refreshed {saved} items in {duration_secs}s"),
            stats: Some(RefreshStats {
                collected,
                processed,
                saved,
                duration_secs,
                sources,
            }),
        }
    }

    /// Best-effort bookkeeping; a metadata write failure never fails the
    /// cycle. A clean pass resets the error counters; a failed source
    /// keeps its last known item id and accumulates errors.
    async fn record_source_pass(&self, batch: &SourceBatch) {
        let meta = match &batch.error {
            None => SourceMetadata {
                source_id: batch.source_id.to_string(),
                last_fetch_time: Utc::now(),
                last_item_id: batch.items.first().map(|i| i.id()),
                status: "ok".to_string(),
                error_count: 0,
                last_error: None,
            },
            Some(error) => {
                let previous = self
                    .store
                    .get_source_metadata(batch.source_id)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(source = batch.source_id, error = %e, "metadata read failed");
                        None
                    });
                SourceMetadata {
                    source_id: batch.source_id.to_string(),
                    last_fetch_time: Utc::now(),
                    last_item_id: previous.as_ref().and_then(|p| p.last_item_id.clone()),
                    status: "error".to_string(),
                    error_count: previous.map(|p| p.error_count).unwrap_or(0) + 1,
                    last_error: Some(error.clone()),
                }
            }
        };
        if let Err(e) = self.store.update_source_metadata(&meta).await {
            tracing::warn!(source = batch.source_id, error = %e, "metadata update failed");
        }
    }
}
