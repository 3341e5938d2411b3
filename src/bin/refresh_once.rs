//! One-shot refresh runner.
//! Loads configuration and credentials, runs a single collect/classify/
//! persist cycle against the configured database, prints the report, and
//! exits. Useful for cron-style operation and manual smoke runs.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aifeed::{App, AppConfig};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aifeed=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when credentials come from the
    // environment directly.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load_default()?;
    let app = App::init(config).await?;

    let report = app.refresh().await;
    if let Some(stats) = &report.stats {
        tracing::info!(
            collected = stats.collected,
            processed = stats.processed,
            saved = stats.saved,
            duration_secs = stats.duration_secs,
            "refresh stats"
        );
    }
    println!("{}", report.message);

    let db_stats = app.stats().await;
    println!(
        "database now holds {} items ({} bookmarked, {} read)",
        db_stats.total_items, db_stats.bookmarked_count, db_stats.read_count
    );

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}
