use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, StageFailure, SyncError};
use crate::fpl_api::DataSource;
use crate::history::{FetchFailure, fetch_all_histories};
use crate::progress::Progress;
use crate::store::Store;
use crate::upsert::{BatchOutcome, EntityKind, UpsertEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Refresh,
    Rebuild,
}

impl RunMode {
    fn as_str(self) -> &'static str {
        match self {
            RunMode::Refresh => "refresh",
            RunMode::Rebuild => "rebuild",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub kind: EntityKind,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub run_id: i64,
    pub stages: Vec<StageReport>,
    /// Players skipped in a steady-state refresh because their fetch failed.
    pub history_failures: Vec<FetchFailure>,
}

impl RefreshSummary {
    pub fn outcome(&self, kind: EntityKind) -> Option<&BatchOutcome> {
        self.stages
            .iter()
            .find(|stage| stage.kind == kind)
            .map(|stage| &stage.outcome)
    }

    pub fn rows_written(&self) -> usize {
        self.stages.iter().map(|s| s.outcome.rows_written()).sum()
    }
}

/// Create missing tables, reconcile every entity kind in dependency order,
/// then (re)create the views.
pub fn refresh_all(
    store: &mut Store,
    source: &dyn DataSource,
    config: &SyncConfig,
    progress: &dyn Progress,
) -> Result<RefreshSummary> {
    run(store, source, config, progress, RunMode::Refresh)
}

/// Delete the database file and build it again from scratch.
pub fn rebuild(
    path: &Path,
    source: &dyn DataSource,
    config: &SyncConfig,
    progress: &dyn Progress,
) -> Result<(Store, RefreshSummary)> {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Removed {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(SyncError::Io {
                path: path.display().to_string(),
                source: err,
            });
        }
    }
    let mut store = Store::open(path)?;
    let summary = run(&mut store, source, config, progress, RunMode::Rebuild)?;
    Ok((store, summary))
}

fn run(
    store: &mut Store,
    source: &dyn DataSource,
    config: &SyncConfig,
    progress: &dyn Progress,
    mode: RunMode,
) -> Result<RefreshSummary> {
    store.create_tables()?;
    let run_id = store.begin_run(mode.as_str())?;

    let mut stages = Vec::new();
    let mut failures = Vec::new();
    let mut history_failures = Vec::new();

    for kind in EntityKind::REFRESH_ORDER {
        info!("Fetching {kind} table...");
        let result = match kind {
            EntityKind::PlayerHistory => {
                refresh_history(store, source, config, progress, &mut history_failures)
            }
            _ => refresh_kind(store, source, kind),
        };
        match result {
            Ok(outcome) => {
                info!("{kind}: {}", describe(&outcome));
                stages.push(StageReport { kind, outcome });
            }
            Err(err) if err.is_fatal_for_run() => {
                warn!("{kind} refresh aborted the run: {err}");
                failures.push(StageFailure {
                    kind,
                    message: err.to_string(),
                });
                record_run(store, run_id, &stages, &failures);
                return Err(err);
            }
            Err(err) => {
                warn!("{kind} refresh failed: {err}");
                failures.push(StageFailure {
                    kind,
                    message: err.to_string(),
                });
            }
        }
    }

    store.create_views()?;
    record_run(store, run_id, &stages, &failures);

    if !failures.is_empty() {
        return Err(SyncError::StagesFailed(failures));
    }
    Ok(RefreshSummary {
        run_id,
        stages,
        history_failures,
    })
}

fn refresh_kind(
    store: &mut Store,
    source: &dyn DataSource,
    kind: EntityKind,
) -> Result<BatchOutcome> {
    let Some(resource) = kind.resource() else {
        return Ok(BatchOutcome::skipped("no remote resource"));
    };
    let records = source
        .fetch(resource)
        .map_err(|err| SyncError::fetch(resource, err))?;
    UpsertEngine::new(store).reconcile_kind(kind, records)
}

fn refresh_history(
    store: &mut Store,
    source: &dyn DataSource,
    config: &SyncConfig,
    progress: &dyn Progress,
    failures_out: &mut Vec<FetchFailure>,
) -> Result<BatchOutcome> {
    let kind = EntityKind::PlayerHistory;
    let elements = store.player_ids()?;
    if elements.is_empty() {
        info!("No players stored, skipping history");
        return Ok(BatchOutcome::skipped("no players"));
    }
    let cold_start = store.row_count(kind.table())? == 0;

    let fetch = fetch_all_histories(source, &elements, config.workers, progress)?;
    if !fetch.is_complete() {
        // A partial backfill would never be repaired by later windowed refreshes.
        if cold_start && let Some(err) = fetch.first_failure() {
            return Err(err);
        }
        warn!(
            "{} player histories failed to fetch; they will be retried next refresh",
            fetch.failures.len()
        );
        failures_out.extend(fetch.failures.iter().cloned());
    }

    UpsertEngine::new(store).reconcile_kind(kind, fetch.into_rows())
}

fn record_run(store: &Store, run_id: i64, stages: &[StageReport], failures: &[StageFailure]) {
    let stages_json = serde_json::to_string(stages).unwrap_or_else(|_| "[]".to_string());
    let errors = failures.iter().map(|f| f.to_string()).collect::<Vec<_>>();
    let errors_json = serde_json::to_string(&errors).unwrap_or_else(|_| "[]".to_string());
    if let Err(err) = store.finish_run(run_id, &stages_json, &errors_json) {
        warn!("failed to record sync run {run_id}: {err}");
    }
}

fn describe(outcome: &BatchOutcome) -> String {
    match outcome {
        BatchOutcome::Inserted { rows } => format!("inserted {rows} rows"),
        BatchOutcome::Updated { updated, inserted } => {
            format!("updated {updated} rows, inserted {inserted} new")
        }
        BatchOutcome::Skipped { reason } => format!("skipped ({reason})"),
    }
}
