use std::fmt;

use thiserror::Error;

use crate::upsert::EntityKind;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Table or column layout does not match what the engine needs.
    #[error("schema error on {table}: {reason}")]
    Schema { table: String, reason: String },

    #[error("store failure ({context}): {source}")]
    Store {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("fetch {resource} failed: {source}")]
    Fetch {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("player {element} history: {reason}")]
    PlayerHistory { element: i64, reason: String },

    #[error("{} stage(s) failed: {}", .0.len(), join_failures(.0))]
    StagesFailed(Vec<StageFailure>),
}

impl SyncError {
    pub fn schema(table: &str, reason: impl Into<String>) -> Self {
        Self::Schema {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fetch(resource: impl fmt::Display, source: anyhow::Error) -> Self {
        Self::Fetch {
            resource: resource.to_string(),
            source,
        }
    }

    /// Errors that must stop the whole run instead of just the current stage.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::PlayerHistory { .. })
    }
}

/// Attach a context label to a rusqlite error, the way `anyhow::Context` reads.
pub trait StoreContext<T> {
    fn store_context(self, context: &str) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, rusqlite::Error> {
    fn store_context(self, context: &str) -> Result<T> {
        self.map_err(|source| SyncError::Store {
            context: context.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StageFailure {
    pub kind: EntityKind,
    pub message: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

fn join_failures(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
