// src/schedule/mod.rs
//! Interval-driven background refresh.
//!
//! The scheduler owns a single tokio task that triggers a refresh cycle
//! every `interval_secs`. It shares the manager's overlap guard, so a
//! scheduled tick landing during a manual refresh is skipped, not queued.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::model::RefreshReport;
use crate::refresh::RefreshManager;

/// Snapshot of the scheduler for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_secs: u64,
    pub is_refreshing: bool,
}

struct SchedulerInner {
    config: SchedulerConfig,
    task: Option<JoinHandle<()>>,
}

pub struct RefreshScheduler {
    manager: Arc<RefreshManager>,
    inner: Mutex<SchedulerInner>,
}

impl RefreshScheduler {
    pub fn new(manager: Arc<RefreshManager>, config: SchedulerConfig) -> Self {
        Self {
            manager,
            inner: Mutex::new(SchedulerInner { config, task: None }),
        }
    }

    /// Start the periodic task. A second call while running is a no-op.
    /// The first scheduled refresh fires one full interval after start;
    /// callers wanting data immediately use [`Self::trigger_refresh`].
    pub fn start(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if !inner.config.enabled {
            tracing::info!("scheduler disabled by configuration");
            return;
        }
        if inner.task.is_some() {
            tracing::warn!("scheduler already running, ignoring start");
            return;
        }

        let interval_secs = inner.config.interval_secs.max(1);
        inner.task = Some(spawn_loop(self.manager.clone(), interval_secs));
        tracing::info!(interval_secs, "scheduler started");
    }

    /// Stop the periodic task if one is running.
    pub fn stop(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if let Some(task) = inner.task.take() {
            task.abort();
            tracing::info!("scheduler stopped");
        }
    }

    /// Replace the interval/enabled settings. A running task is restarted
    /// with the new interval; a disabling update stops it.
    pub fn update_config(&self, config: SchedulerConfig) {
        let restart = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            let was_running = inner.task.is_some();
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            inner.config = config;
            was_running && inner.config.enabled
        };
        tracing::info!(restart, "scheduler configuration updated");
        if restart {
            self.start();
        }
    }

    /// Run one cycle now, subject to the manager's overlap guard.
    pub async fn trigger_refresh(&self) -> RefreshReport {
        self.manager.refresh().await
    }

    pub fn status(&self) -> SchedulerStatus {
        let (enabled, running, interval_secs) = match self.inner.lock() {
            Ok(inner) => (
                inner.config.enabled,
                inner.task.is_some(),
                inner.config.interval_secs,
            ),
            Err(_) => (false, false, 0),
        };
        SchedulerStatus {
            enabled,
            running,
            interval_secs,
            is_refreshing: self.manager.is_refreshing(),
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_loop(manager: Arc<RefreshManager>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick resolves immediately; consume it so the loop
        // waits a full interval before the first scheduled cycle.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = manager.refresh().await;
            if report.success {
                tracing::info!(message = %report.message, "scheduled refresh");
            } else {
                tracing::warn!(message = %report.message, "scheduled refresh skipped");
            }
        }
    })
}
