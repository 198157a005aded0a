//! Reconciliation of fetched records into the store, one entity kind at a time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rusqlite::{CachedStatement, Connection, Transaction, ffi};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreContext, SyncError};
use crate::fpl_api::{Resource, flatten_top_element};
use crate::record::{Record, field_flag, field_i64, to_sql_value};
use crate::statements::{UpsertStatements, build_upsert_statements};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Teams,
    Positions,
    MetricNames,
    Events,
    Fixtures,
    Players,
    PlayerHistory,
}

impl EntityKind {
    /// Later kinds reference rows committed by earlier ones.
    pub const REFRESH_ORDER: [EntityKind; 7] = [
        EntityKind::Teams,
        EntityKind::Positions,
        EntityKind::MetricNames,
        EntityKind::Events,
        EntityKind::Fixtures,
        EntityKind::Players,
        EntityKind::PlayerHistory,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Teams => "teams_static",
            EntityKind::Positions => "positions_static",
            EntityKind::MetricNames => "metric_names_static",
            EntityKind::Events => "events_static",
            EntityKind::Fixtures => "fixtures",
            EntityKind::Players => "players_static",
            EntityKind::PlayerHistory => "player_gw_detailed",
        }
    }

    pub fn primary_key(self) -> &'static [&'static str] {
        match self {
            EntityKind::MetricNames => &["name"],
            EntityKind::PlayerHistory => &["element", "round", "fixture"],
            _ => &["id"],
        }
    }

    pub fn policy(self) -> Policy {
        match self {
            EntityKind::Events => Policy::SingleCurrent,
            EntityKind::PlayerHistory => Policy::Windowed,
            _ => Policy::AppendIfAbsent,
        }
    }

    /// Remote resource backing this kind; history is fetched per player instead.
    pub fn resource(self) -> Option<Resource> {
        match self {
            EntityKind::Teams => Some(Resource::Teams),
            EntityKind::Positions => Some(Resource::Positions),
            EntityKind::MetricNames => Some(Resource::MetricNames),
            EntityKind::Events => Some(Resource::Events),
            EntityKind::Fixtures => Some(Resource::Fixtures),
            EntityKind::Players => Some(Resource::Players),
            EntityKind::PlayerHistory => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Teams => "teams",
            EntityKind::Positions => "positions",
            EntityKind::MetricNames => "metric names",
            EntityKind::Events => "events",
            EntityKind::Fixtures => "fixtures",
            EntityKind::Players => "players",
            EntityKind::PlayerHistory => "player gameweek history",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Insert the batch; on a key conflict roll back and update instead.
    AppendIfAbsent,
    /// Events: keep the current (and just-previous) gameweek, flatten, then append.
    SingleCurrent,
    /// Player history: full backfill on an empty table, else current gameweek only.
    Windowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Inserted {
        rows: usize,
    },
    /// Conflict fallback. `inserted` counts keys the update path found missing.
    Updated {
        updated: usize,
        inserted: usize,
    },
    Skipped {
        reason: String,
    },
}

impl BatchOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        BatchOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn rows_written(&self) -> usize {
        match self {
            BatchOutcome::Inserted { rows } => *rows,
            BatchOutcome::Updated { updated, inserted } => updated + inserted,
            BatchOutcome::Skipped { .. } => 0,
        }
    }
}

pub struct UpsertEngine<'a> {
    store: &'a mut Store,
}

impl<'a> UpsertEngine<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Reconcile one entity kind with its own table, key and policy.
    pub fn reconcile_kind(
        &mut self,
        kind: EntityKind,
        records: Vec<Record>,
    ) -> Result<BatchOutcome> {
        self.reconcile(records, kind.table(), kind.primary_key(), kind.policy())
    }

    pub fn reconcile(
        &mut self,
        records: Vec<Record>,
        table: &str,
        keys: &[&str],
        policy: Policy,
    ) -> Result<BatchOutcome> {
        match policy {
            Policy::AppendIfAbsent => self.upsert(table, keys, &records),
            Policy::SingleCurrent => self.reconcile_events(table, keys, records),
            Policy::Windowed => {
                let current = self.store.current_gameweek()?;
                self.reconcile_windowed(table, keys, records, current)
            }
        }
    }

    /// Append-if-absent with an explicit update fallback. Repeated keys in
    /// the batch collapse to their last copy.
    pub fn upsert(
        &mut self,
        table: &str,
        keys: &[&str],
        records: &[Record],
    ) -> Result<BatchOutcome> {
        if records.is_empty() {
            info!("No {table} records returned, skipping");
            return Ok(BatchOutcome::skipped(format!("no {table} records")));
        }
        let stmts = build_upsert_statements(self.store, table, keys)?;
        let records = dedupe_by_key(records.to_vec(), keys);
        let conn = self.store.connection_mut();

        let tx = conn.transaction().store_context("begin insert transaction")?;
        match insert_all(&tx, &stmts.insert, &records) {
            Ok(rows) => {
                tx.commit().store_context("commit insert transaction")?;
                debug!(table, rows, "inserted batch");
                return Ok(BatchOutcome::Inserted { rows });
            }
            Err(err) if is_key_conflict(&err) => {
                info!("{table} already inserted, performing update");
                tx.rollback().store_context("roll back conflicting insert")?;
            }
            Err(err) => {
                return Err(SyncError::Store {
                    context: format!("insert into {table}"),
                    source: err,
                });
            }
        }

        let tx = conn.transaction().store_context("begin update transaction")?;
        let (updated, inserted) =
            update_all(&tx, &stmts, &records).store_context(&format!("update {table}"))?;
        tx.commit().store_context("commit update transaction")?;
        if inserted > 0 {
            debug!(table, inserted, "update fallback inserted new keys");
        }
        Ok(BatchOutcome::Updated { updated, inserted })
    }

    fn reconcile_events(
        &mut self,
        table: &str,
        keys: &[&str],
        records: Vec<Record>,
    ) -> Result<BatchOutcome> {
        if !records.iter().any(|e| field_flag(e, "is_current")) {
            info!("No current events");
            return Ok(BatchOutcome::skipped("no current event"));
        }

        let cold_start = self.store.row_count(table)? == 0;
        let events = records
            .into_iter()
            .filter(|e| cold_start || field_flag(e, "is_current") || field_flag(e, "is_previous"))
            .map(flatten_top_element)
            .collect::<Vec<_>>();
        self.upsert(table, keys, &events)
    }

    /// `current_gameweek` bounds steady-state writes; an empty table takes everything.
    /// Any write failure names its player and is fatal for the run.
    pub fn reconcile_windowed(
        &mut self,
        table: &str,
        keys: &[&str],
        records: Vec<Record>,
        current_gameweek: Option<i64>,
    ) -> Result<BatchOutcome> {
        if records.is_empty() {
            info!("No {table} records returned, skipping");
            return Ok(BatchOutcome::skipped(format!("no {table} records")));
        }

        if self.store.row_count(table)? == 0 {
            let outcome = self.write_by_player(table, keys, records)?;
            info!("Backfilled {table}: {} rows", outcome.rows_written());
            return Ok(outcome);
        }

        let Some(current) = current_gameweek else {
            info!("No current gameweek, skipping {table} refresh");
            return Ok(BatchOutcome::skipped("no current gameweek"));
        };
        let total = records.len();
        let window = records
            .into_iter()
            .filter(|r| field_i64(r, "round") == Some(current))
            .collect::<Vec<_>>();
        debug!(
            table,
            current,
            kept = window.len(),
            dropped = total - window.len(),
            "windowed batch"
        );
        if window.is_empty() {
            info!("No {table} rows for gameweek {current}");
            return Ok(BatchOutcome::skipped(format!("no rows for gameweek {current}")));
        }
        self.write_by_player(table, keys, window)
    }

    /// One transaction, one savepoint per player. A key conflict reroutes only
    /// that player's rows to the update path; any other failure names the
    /// player and rolls back the whole batch.
    fn write_by_player(
        &mut self,
        table: &str,
        keys: &[&str],
        records: Vec<Record>,
    ) -> Result<BatchOutcome> {
        let stmts = build_upsert_statements(self.store, table, keys)?;
        let groups = group_by_element(dedupe_by_key(records, keys));
        let mut tx = self
            .store
            .connection_mut()
            .transaction()
            .store_context("begin history transaction")?;

        let mut updated = 0usize;
        let mut inserted = 0usize;
        let mut conflicted = false;
        for (element, batch) in &groups {
            match write_player(&mut tx, &stmts, batch) {
                Ok(PlayerWrite::Inserted(rows)) => inserted += rows,
                Ok(PlayerWrite::Updated { updated: u, inserted: i }) => {
                    conflicted = true;
                    updated += u;
                    inserted += i;
                }
                Err(err) => {
                    warn!("Error writing player {element}: {err}");
                    return Err(SyncError::PlayerHistory {
                        element: *element,
                        reason: format!("write failed: {err}"),
                    });
                }
            }
        }
        tx.commit().store_context("commit history transaction")?;
        debug!(table, players = groups.len(), updated, inserted, "history batch written");

        if conflicted {
            Ok(BatchOutcome::Updated { updated, inserted })
        } else {
            Ok(BatchOutcome::Inserted { rows: inserted })
        }
    }
}

enum PlayerWrite {
    Inserted(usize),
    Updated { updated: usize, inserted: usize },
}

fn write_player(
    tx: &mut Transaction<'_>,
    stmts: &UpsertStatements,
    batch: &[Record],
) -> rusqlite::Result<PlayerWrite> {
    let mut sp = tx.savepoint()?;
    match insert_all(&sp, &stmts.insert, batch) {
        Ok(rows) => {
            sp.commit()?;
            Ok(PlayerWrite::Inserted(rows))
        }
        Err(err) if is_key_conflict(&err) => {
            sp.rollback()?;
            let (updated, inserted) = update_all(&sp, stmts, batch)?;
            sp.commit()?;
            Ok(PlayerWrite::Updated { updated, inserted })
        }
        Err(err) => Err(err),
    }
}

/// Collapse records sharing a key onto the last copy, in first-seen order.
fn dedupe_by_key(records: Vec<Record>, keys: &[&str]) -> Vec<Record> {
    let total = records.len();
    let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
    let mut out: Vec<Record> = Vec::with_capacity(total);
    for record in records {
        let key = keys
            .iter()
            .map(|k| record.get(*k).unwrap_or(&Value::Null).to_string())
            .collect::<Vec<_>>();
        match seen.get(&key) {
            Some(&idx) => out[idx] = record,
            None => {
                seen.insert(key, out.len());
                out.push(record);
            }
        }
    }
    if out.len() < total {
        debug!(dropped = total - out.len(), "collapsed repeated keys");
    }
    out
}

/// Group rows by `element`, keeping each player's rows in arrival order.
fn group_by_element(records: Vec<Record>) -> BTreeMap<i64, Vec<Record>> {
    let mut groups: BTreeMap<i64, Vec<Record>> = BTreeMap::new();
    for record in records {
        let element = field_i64(&record, "element").unwrap_or_default();
        groups.entry(element).or_default().push(record);
    }
    groups
}

fn insert_all(conn: &Connection, sql: &str, records: &[Record]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(sql)?;
    for record in records {
        bind_record(&mut stmt, record)?;
        stmt.raw_execute()?;
    }
    Ok(records.len())
}

fn update_all(
    conn: &Connection,
    stmts: &UpsertStatements,
    records: &[Record],
) -> rusqlite::Result<(usize, usize)> {
    let mut update = conn.prepare_cached(&stmts.update)?;
    let mut updated = 0usize;
    let mut missing = Vec::new();
    for record in records {
        bind_record(&mut update, record)?;
        if update.raw_execute()? == 0 {
            missing.push(record);
        } else {
            updated += 1;
        }
    }
    drop(update);

    if missing.is_empty() {
        return Ok((updated, 0));
    }
    let mut insert = conn.prepare_cached(&stmts.insert)?;
    for record in &missing {
        bind_record(&mut insert, record)?;
        insert.raw_execute()?;
    }
    Ok((updated, missing.len()))
}

/// Bind every named parameter from the record; absent fields bind NULL.
fn bind_record(stmt: &mut CachedStatement<'_>, record: &Record) -> rusqlite::Result<()> {
    for idx in 1..=stmt.parameter_count() {
        let value = to_sql_value(
            stmt.parameter_name(idx)
                .and_then(|name| record.get(name.trim_start_matches(':'))),
        );
        stmt.raw_bind_parameter(idx, value)?;
    }
    Ok(())
}

fn is_key_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}
