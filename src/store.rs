use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, StoreContext, SyncError};

const CREATE_TABLES_SQL: &str = include_str!("sql/create_tables.sql");
const CREATE_VIEWS_SQL: &str = include_str!("sql/create_views.sql");

/// Single-writer handle over the SQLite database. Owned by the refresh entry
/// point and lent to every component that needs it.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| SyncError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)
            .store_context(&format!("open sqlite db {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().store_context("open in-memory sqlite db")?;
        Self::with_connection(conn)
    }

    /// REFERENCES clauses are declarative only: fixtures run ahead of the
    /// stored gameweeks and history rows may name fixtures never stored.
    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", false)
            .store_context("disable foreign keys")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn create_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_TABLES_SQL)
            .store_context("create tables")
    }

    pub fn create_views(&self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_VIEWS_SQL)
            .store_context("create views")
    }

    /// Ordered column names as the live schema reports them.
    pub fn columns_of(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .store_context("prepare table_info")?;
        let rows = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))
            .store_context("query table_info")?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.store_context("decode table_info row")?);
        }
        if columns.is_empty() {
            return Err(SyncError::schema(table, "table does not exist"));
        }
        Ok(columns)
    }

    pub fn row_count(&self, table: &str) -> Result<i64> {
        // Validates the name against the schema before it is spliced into SQL.
        self.columns_of(table)?;
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get(0)
            })
            .store_context(&format!("count rows in {table}"))
    }

    /// The gameweek flagged current in `events_static`, if any.
    pub fn current_gameweek(&self) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT MAX(id) FROM events_static WHERE is_current = 1",
                [],
                |row| row.get::<_, Option<i64>>(0),
            )
            .store_context("query current gameweek")
    }

    pub fn player_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM players_static ORDER BY id")
            .store_context("prepare player ids")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .store_context("query player ids")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.store_context("decode player id")?);
        }
        Ok(ids)
    }

    pub fn begin_run(&self, mode: &str) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_runs(mode, started_at, finished_at, stages_json, errors_json)
                 VALUES (?1, ?2, NULL, '[]', '[]')",
                params![mode, Utc::now().to_rfc3339()],
            )
            .store_context("insert sync run")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_run(&self, run_id: i64, stages_json: &str, errors_json: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_runs
                 SET finished_at = ?1, stages_json = ?2, errors_json = ?3
                 WHERE run_id = ?4",
                params![Utc::now().to_rfc3339(), stages_json, errors_json, run_id],
            )
            .store_context("update sync run")?;
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<(String, Option<String>, String)>> {
        self.conn
            .query_row(
                "SELECT mode, finished_at, errors_json FROM sync_runs ORDER BY run_id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .store_context("query last sync run")
    }
}
