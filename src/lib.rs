pub mod config;
pub mod error;
pub mod fpl_api;
pub mod history;
pub mod http_client;
pub mod progress;
pub mod record;
pub mod refresh;
pub mod statements;
pub mod store;
pub mod upsert;

pub use error::{Result, SyncError};
