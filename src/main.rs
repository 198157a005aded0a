use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fpl_sync::config::SyncConfig;
use fpl_sync::fpl_api::FplClient;
use fpl_sync::progress::LogProgress;
use fpl_sync::refresh::{self, RefreshSummary};
use fpl_sync::store::Store;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = SyncConfig::load(&args);
    tracing::info!("Refreshing {}", config.db_path.display());

    let source = FplClient::new(&config)?;
    let mut store = Store::open(&config.db_path)?;
    let progress = LogProgress::default();
    let summary = refresh::refresh_all(&mut store, &source, &config, &progress)
        .context("refresh failed")?;

    print_summary(&config, &summary);
    Ok(())
}

fn print_summary(config: &SyncConfig, summary: &RefreshSummary) {
    println!("FPL refresh complete");
    println!("DB: {}", config.db_path.display());
    println!("Run: {}", summary.run_id);
    for stage in &summary.stages {
        println!(" - {}: {:?}", stage.kind, stage.outcome);
    }
    println!("Rows written: {}", summary.rows_written());
    if !summary.history_failures.is_empty() {
        println!("History fetch failures: {}", summary.history_failures.len());
        for failure in summary.history_failures.iter().take(8) {
            println!("   - player {}: {}", failure.element, failure.message);
        }
    }
}
