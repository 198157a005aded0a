//! Bounded-pool fetch of per-player gameweek history.

use rayon::prelude::*;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::fpl_api::DataSource;
use crate::progress::Progress;
use crate::record::Record;

#[derive(Debug, Clone)]
pub struct PlayerHistory {
    pub element: i64,
    pub rows: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub element: i64,
    pub message: String,
}

/// Results sorted by element id, whatever order the workers finished in.
#[derive(Debug, Clone, Default)]
pub struct HistoryFetch {
    pub histories: Vec<PlayerHistory>,
    pub failures: Vec<FetchFailure>,
}

impl HistoryFetch {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// First failure as a run-level error.
    pub fn first_failure(&self) -> Option<SyncError> {
        self.failures.first().map(|f| SyncError::PlayerHistory {
            element: f.element,
            reason: format!(
                "fetch failed: {} ({} player(s) failed in total)",
                f.message,
                self.failures.len()
            ),
        })
    }

    /// All rows, still grouped player by player.
    pub fn into_rows(self) -> Vec<Record> {
        self.histories
            .into_iter()
            .flat_map(|h| h.rows)
            .collect::<Vec<_>>()
    }
}

/// Fetch every player's history on a pool of `workers` threads. A failing
/// player never stops the others; failures are collected for the caller.
pub fn fetch_all_histories(
    source: &dyn DataSource,
    elements: &[i64],
    workers: usize,
    progress: &dyn Progress,
) -> Result<HistoryFetch> {
    progress.begin(elements.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| SyncError::fetch("player history", err.into()))?;

    let results: Vec<(i64, anyhow::Result<Vec<Record>>)> = pool.install(|| {
        elements
            .par_iter()
            .map(|&element| {
                let result = source.player_history(element);
                progress.item_done(element, result.is_ok());
                (element, result)
            })
            .collect()
    });
    progress.finish();

    let mut fetch = HistoryFetch::default();
    for (element, result) in results {
        match result {
            Ok(rows) => fetch.histories.push(PlayerHistory { element, rows }),
            Err(err) => {
                warn!("history fetch failed for player {element}: {err:#}");
                fetch.failures.push(FetchFailure {
                    element,
                    message: format!("{err:#}"),
                });
            }
        }
    }
    fetch.histories.sort_by_key(|h| h.element);
    fetch.failures.sort_by_key(|f| f.element);
    Ok(fetch)
}
