use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fpl_sync::config::SyncConfig;
use fpl_sync::fpl_api::FplClient;
use fpl_sync::progress::LogProgress;
use fpl_sync::refresh;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = SyncConfig::load(&args);
    tracing::info!("Rebuilding {} from scratch", config.db_path.display());

    let source = FplClient::new(&config)?;
    let progress = LogProgress::default();
    let (_store, summary) = refresh::rebuild(&config.db_path, &source, &config, &progress)
        .context("rebuild failed")?;

    println!("FPL rebuild complete");
    println!("DB: {}", config.db_path.display());
    for stage in &summary.stages {
        println!(" - {}: {:?}", stage.kind, stage.outcome);
    }
    println!("Rows written: {}", summary.rows_written());
    Ok(())
}
