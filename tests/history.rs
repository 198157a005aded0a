mod common;

use common::{FakeSource, memory_store};
use fpl_sync::SyncError;
use fpl_sync::config::SyncConfig;
use fpl_sync::history::fetch_all_histories;
use fpl_sync::progress::{LogProgress, NullProgress};
use fpl_sync::record::field_i64;
use fpl_sync::refresh::refresh_all;
use fpl_sync::upsert::{BatchOutcome, EntityKind};

fn config() -> SyncConfig {
    SyncConfig {
        workers: 3,
        ..SyncConfig::default()
    }
}

#[test]
fn one_failing_player_does_not_stop_the_pool() {
    let source = FakeSource::from_fixtures().failing(2);
    let progress = LogProgress::new(1);
    let fetch = fetch_all_histories(&source, &[4, 3, 2, 1], 3, &progress).expect("pool builds");

    assert_eq!(source.history_calls(), 4);
    assert_eq!(progress.done(), 4);
    assert_eq!(progress.failed(), 1);
    assert!(!fetch.is_complete());
    assert_eq!(
        fetch.histories.iter().map(|h| h.element).collect::<Vec<_>>(),
        vec![1, 3, 4]
    );
    assert_eq!(fetch.failures.len(), 1);
    assert_eq!(fetch.failures[0].element, 2);
    assert!(matches!(
        fetch.first_failure(),
        Some(SyncError::PlayerHistory { element: 2, .. })
    ));
}

#[test]
fn rows_stay_grouped_per_player() {
    let source = FakeSource::from_fixtures();
    let fetch = fetch_all_histories(&source, &[3, 1, 4, 2], 8, &NullProgress).unwrap();
    assert!(fetch.is_complete());
    let elements = fetch
        .into_rows()
        .iter()
        .filter_map(|r| field_i64(r, "element"))
        .collect::<Vec<_>>();
    assert_eq!(elements, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
}

#[test]
fn cold_start_fetch_failure_fails_the_run_without_writing_history() {
    let mut store = memory_store();
    let source = FakeSource::from_fixtures().failing(2);
    let err = refresh_all(&mut store, &source, &config(), &NullProgress).unwrap_err();
    assert!(matches!(err, SyncError::PlayerHistory { element: 2, .. }));

    assert_eq!(store.row_count("player_gw_detailed").unwrap(), 0);
    // Earlier stages stay committed.
    assert_eq!(store.row_count("players_static").unwrap(), 4);
    let (_, finished, errors) = store.last_run().unwrap().expect("run recorded");
    assert!(finished.is_some());
    assert!(errors.contains("player gameweek history"));
}

#[test]
fn steady_state_fetch_failure_is_isolated() {
    let mut store = memory_store();
    refresh_all(&mut store, &FakeSource::from_fixtures(), &config(), &NullProgress)
        .expect("initial refresh");

    let source = FakeSource::from_fixtures().failing(2);
    let summary = refresh_all(&mut store, &source, &config(), &NullProgress)
        .expect("isolated failures keep the run alive");
    assert_eq!(summary.history_failures.len(), 1);
    assert_eq!(summary.history_failures[0].element, 2);
    assert_eq!(
        summary.outcome(EntityKind::PlayerHistory),
        Some(&BatchOutcome::Updated { updated: 3, inserted: 0 })
    );
    assert_eq!(store.row_count("player_gw_detailed").unwrap(), 12);
}
