// src/lib.rs
// Public library surface for integration tests (and the bundled binary).

pub mod app;
pub mod classify;
pub mod collect;
pub mod config;
pub mod http;
pub mod model;
pub mod refresh;
pub mod schedule;
pub mod store;
pub mod util;

// ---- Re-exports for stable public API ----
pub use crate::app::App;
pub use crate::classify::{Classification, Classifier};
pub use crate::config::AppConfig;
pub use crate::model::{
    ContentItem, DatabaseStats, ItemFilter, RefreshReport, RefreshStats, SourceType,
};
pub use crate::refresh::RefreshManager;
pub use crate::schedule::RefreshScheduler;
pub use crate::store::ContentStore;
